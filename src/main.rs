use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use courtside::auth::set_token_ttl_hours;
use courtside::error::set_verbose_errors;
use courtside::feed::HttpFeedSource;
use courtside::openapi::ApiDoc;
use courtside::rate_limit::{InMemoryRateLimiter, RateLimiterFacade};
use courtside::repo::Repo;
use courtside::{config, AppConfig, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("invalid configuration: {e:#}");
            std::process::exit(1);
        }
    };
    set_verbose_errors(cfg.app_env.verbose_errors());
    set_token_ttl_hours(cfg.jwt_ttl_hours);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!(env = ?cfg.app_env, "Bootstrapping courtside server");
    info!("Frontend URL: {}", cfg.frontend_url.as_deref().unwrap_or("http://localhost:3000"));

    let repo = match build_repo(&cfg).await {
        Ok(repo) => repo,
        Err(e) => {
            eprintln!("storage unavailable: {e:#}");
            std::process::exit(1);
        }
    };

    let mut state = AppState::new(repo)
        .with_rate_limiter(RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg.rate_limit.clone()));
    match &cfg.nba_feed_url {
        Some(url) => state = state.with_feed(Arc::new(HttpFeedSource::new(url.clone()))),
        None => info!("NBA_FEED_URL not set; /api/nba/update will fail"),
    }
    match &cfg.cron_secret {
        Some(secret) => state = state.with_cron_secret(secret.clone()),
        None => info!("CRON_SECRET not set; /api/nba/update is closed"),
    }

    let openapi = ApiDoc::openapi();
    info!("OpenAPI document generated");

    let frontend = cfg.frontend_url.clone();
    let enable_hsts = cfg.enable_hsts;
    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                // local Next.js / Vite dev servers
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_origin("http://localhost:5173")
                .allow_any_header()
                .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .supports_credentials()
                .max_age(3600);
            if let Some(front) = &frontend {
                c = c.allowed_origin(front);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::default().with_hsts(enable_hsts))
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);

    server.run().await
}

async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    #[cfg(feature = "postgres-store")]
    {
        if let Some(url) = &cfg.database_url {
            let repo = courtside::repo::pg::PgRepo::connect(url, cfg.db_max_connections).await?;
            info!("Using Postgres repository backend");
            return Ok(Arc::new(repo));
        }
    }
    #[cfg(not(feature = "postgres-store"))]
    let _ = cfg;
    fallback_repo()
}

#[cfg(feature = "inmem-store")]
fn fallback_repo() -> anyhow::Result<Arc<dyn Repo>> {
    info!("Using in-memory repository backend");
    Ok(Arc::new(courtside::repo::inmem::InMemRepo::new()))
}

#[cfg(not(feature = "inmem-store"))]
fn fallback_repo() -> anyhow::Result<Arc<dyn Repo>> {
    anyhow::bail!("DATABASE_URL must be set when the in-memory store is disabled")
}
