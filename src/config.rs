use std::env;

use anyhow::{bail, Context};

use crate::rate_limit::RateLimitConfig;

const MIN_SECRET_LEN: usize = 32;
const MAX_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Preview,
    Production,
}

impl AppEnv {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "preview" => Ok(AppEnv::Preview),
            "production" | "prod" => Ok(AppEnv::Production),
            other => bail!("APP_ENV must be development, preview or production (got {other})"),
        }
    }

    pub fn verbose_errors(self) -> bool {
        self != AppEnv::Production
    }
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_env: AppEnv,
    pub jwt_ttl_hours: i64,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub bind_addr: String,
    pub port: u16,
    pub frontend_url: Option<String>,
    pub enable_hsts: bool,
    pub cron_secret: Option<String>,
    pub nba_feed_url: Option<String>,
    pub rate_limit: RateLimitConfig,
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match non_empty(name) {
        Some(raw) => raw.parse().map_err(|e| anyhow::anyhow!("{name} is invalid: {e}")),
        None => Ok(default),
    }
}

fn flag(name: &str) -> bool {
    non_empty(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes");
        }
        let jwt_ttl_hours: i64 = parsed("JWT_TTL_HOURS", 168)?;
        if !(1..=MAX_TTL_HOURS).contains(&jwt_ttl_hours) {
            bail!("JWT_TTL_HOURS must be between 1 and {MAX_TTL_HOURS}");
        }

        let app_env = match non_empty("APP_ENV") {
            Some(raw) => AppEnv::parse(&raw)?,
            None => AppEnv::Development,
        };

        Ok(Self {
            app_env,
            jwt_ttl_hours,
            database_url: non_empty("DATABASE_URL"),
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 5)?,
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".into()),
            port: parsed("PORT", 8080)?,
            frontend_url: non_empty("FRONTEND_URL"),
            enable_hsts: flag("ENABLE_HSTS"),
            cron_secret: non_empty("CRON_SECRET"),
            nba_feed_url: non_empty("NBA_FEED_URL"),
            rate_limit: RateLimitConfig::from_env(),
        })
    }
}
