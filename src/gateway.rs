use async_trait::async_trait;
use rand::Rng;

use crate::models::Id;

pub const DEFAULT_METHOD: &str = "ONLINE";

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_id: Id,
    pub amount: f64,
    pub payment_method: String,
    pub payment_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutcome {
    Approved { payment_number: String },
    Declined { reason: String },
}

#[derive(thiserror::Error, Debug)]
#[error("payment gateway unavailable: {0}")]
pub struct GatewayError(pub String);

/// Payment provider seam. Handlers only see the outcome.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, req: &ChargeRequest) -> Result<GatewayOutcome, GatewayError>;
}

/// Accepts every charge. Keeps a caller-supplied payment number, otherwise
/// issues one.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway;

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, req: &ChargeRequest) -> Result<GatewayOutcome, GatewayError> {
        let payment_number = req.payment_number.clone().unwrap_or_else(payment_number);
        tracing::debug!(order_id = req.order_id, amount = req.amount, %payment_number, "simulated charge");
        Ok(GatewayOutcome::Approved { payment_number })
    }
}

fn payment_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("PAY{}{suffix:04}", chrono::Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn simulated_gateway_keeps_supplied_number() {
        let req = ChargeRequest {
            order_id: 1,
            amount: 10.0,
            payment_method: DEFAULT_METHOD.into(),
            payment_number: Some("TX-1".into()),
        };
        let outcome = SimulatedGateway.charge(&req).await.unwrap();
        assert_eq!(outcome, GatewayOutcome::Approved { payment_number: "TX-1".into() });
    }

    #[test]
    fn generated_numbers_have_prefix() {
        let n = payment_number();
        assert!(n.starts_with("PAY"));
        assert!(n.len() > 7);
    }
}
