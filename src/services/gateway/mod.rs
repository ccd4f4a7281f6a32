use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub mod simulated;
pub mod stripe;

pub use simulated::SimulatedGateway;
pub use stripe::StripeGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment declined: {0}")]
    Declined(String),

    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("gateway unavailable: {0}")]
    Unavailable(String),
}

/// Secret used to authenticate against the processor. Never printed.
#[derive(Clone)]
pub struct GatewayCredential(String);

impl GatewayCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for GatewayCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GatewayCredential(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub user_id: Uuid,
    pub amount: i64, // minor currency units
    pub method_token: String,
    pub idempotency_key: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeOutcome {
    pub success: bool,
    pub transaction_ref: String,
}

/// Charge/refund capability over an external payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        request: &ChargeRequest,
        credential: &GatewayCredential,
    ) -> Result<ChargeOutcome, GatewayError>;

    async fn refund(
        &self,
        transaction_ref: &str,
        credential: &GatewayCredential,
        amount: i64,
    ) -> Result<bool, GatewayError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Stripe,
    Simulated,
}

impl FromStr for GatewayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stripe" => Ok(GatewayKind::Stripe),
            "simulated" | "fake" => Ok(GatewayKind::Simulated),
            other => Err(format!("unknown payment gateway '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = GatewayCredential::new("sk_test_secret");
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("sk_test_secret"));
        assert_eq!(credential.expose(), "sk_test_secret");
    }

    #[test]
    fn test_gateway_kind_parsing() {
        assert_eq!("stripe".parse::<GatewayKind>().unwrap(), GatewayKind::Stripe);
        assert_eq!(" Simulated ".parse::<GatewayKind>().unwrap(), GatewayKind::Simulated);
        assert!("paypal".parse::<GatewayKind>().is_err());
    }
}
