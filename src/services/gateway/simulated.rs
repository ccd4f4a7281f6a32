use super::{ChargeOutcome, ChargeRequest, GatewayCredential, GatewayError, PaymentGateway};
use async_trait::async_trait;
use log::{info, warn};
use rand::Rng;
use std::time::Duration;
use uuid::Uuid;

/// Stand-in processor for staging and tests: succeeds with a fixed
/// probability after an artificial delay.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    charge_success_rate: f64,
    refund_success_rate: f64,
    charge_latency: Duration,
    refund_latency: Duration,
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self {
            charge_success_rate: 0.90,
            refund_success_rate: 0.95,
            charge_latency: Duration::from_secs(1),
            refund_latency: Duration::from_millis(500),
        }
    }
}

impl SimulatedGateway {
    pub fn new(charge_success_rate: f64, refund_success_rate: f64) -> Self {
        Self {
            charge_success_rate: charge_success_rate.clamp(0.0, 1.0),
            refund_success_rate: refund_success_rate.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    /// Always succeeds, no delay.
    pub fn approving() -> Self {
        Self::new(1.0, 1.0).with_latency(Duration::ZERO, Duration::ZERO)
    }

    /// Always fails, no delay.
    pub fn declining() -> Self {
        Self::new(0.0, 0.0).with_latency(Duration::ZERO, Duration::ZERO)
    }

    pub fn with_latency(mut self, charge: Duration, refund: Duration) -> Self {
        self.charge_latency = charge;
        self.refund_latency = refund;
        self
    }

    fn roll(rate: f64) -> bool {
        rand::rng().random_bool(rate)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(
        &self,
        request: &ChargeRequest,
        _credential: &GatewayCredential,
    ) -> Result<ChargeOutcome, GatewayError> {
        tokio::time::sleep(self.charge_latency).await;

        if !Self::roll(self.charge_success_rate) {
            warn!(
                "Simulated charge of {} declined for user {}",
                request.amount, request.user_id
            );
            return Err(GatewayError::Declined("payment failure".to_string()));
        }

        let transaction_ref = format!("sim_{}", Uuid::new_v4().simple());
        info!(
            "Simulated charge of {} approved for user {} ({})",
            request.amount, request.user_id, transaction_ref
        );

        Ok(ChargeOutcome {
            success: true,
            transaction_ref,
        })
    }

    async fn refund(
        &self,
        transaction_ref: &str,
        _credential: &GatewayCredential,
        amount: i64,
    ) -> Result<bool, GatewayError> {
        tokio::time::sleep(self.refund_latency).await;

        if !Self::roll(self.refund_success_rate) {
            warn!("Simulated refund of {} on {} failed", amount, transaction_ref);
            return Err(GatewayError::Declined("refund failure".to_string()));
        }

        info!("Simulated refund of {} on {} approved", amount, transaction_ref);
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
