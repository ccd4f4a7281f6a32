use super::{ChargeOutcome, ChargeRequest, GatewayCredential, GatewayError, PaymentGateway};
use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
}

/// Stripe PaymentIntents/Refunds over plain HTTPS.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    api_base: String,
    currency: String,
}

impl StripeGateway {
    pub fn new(api_base: &str, currency: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            currency: currency.to_lowercase(),
        })
    }

    async fn error_from_response(response: Response) -> GatewayError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .map(|e| {
                let message = e.error.message.unwrap_or_else(|| "unknown error".to_string());
                match e.error.code {
                    Some(code) => format!("{} ({})", message, code),
                    None => message,
                }
            })
            .unwrap_or(body);

        if status == StatusCode::PAYMENT_REQUIRED {
            GatewayError::Declined(message)
        } else if status.is_server_error() {
            GatewayError::Unavailable(message)
        } else {
            GatewayError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn charge(
        &self,
        request: &ChargeRequest,
        credential: &GatewayCredential,
    ) -> Result<ChargeOutcome, GatewayError> {
        info!(
            "Creating payment intent of {} {} for user {}",
            request.amount, self.currency, request.user_id
        );

        let amount = request.amount.to_string();
        let user_id = request.user_id.to_string();
        let params = [
            ("amount", amount.as_str()),
            ("currency", self.currency.as_str()),
            ("payment_method", request.method_token.as_str()),
            ("payment_method_types[]", "card"),
            ("confirm", "true"),
            ("metadata[user_id]", user_id.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(credential.expose())
            .header("Idempotency-Key", request.idempotency_key.to_string())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            error!("Stripe charge failed for user {}: {}", request.user_id, err);
            return Err(err);
        }

        let intent: PaymentIntentResponse = response.json().await?;
        let success = intent.status == "succeeded";
        if !success {
            warn!(
                "Payment intent {} finished in status '{}'",
                intent.id, intent.status
            );
        }

        Ok(ChargeOutcome {
            success,
            transaction_ref: intent.id,
        })
    }

    async fn refund(
        &self,
        transaction_ref: &str,
        credential: &GatewayCredential,
        amount: i64,
    ) -> Result<bool, GatewayError> {
        info!("Refunding {} {} on {}", amount, self.currency, transaction_ref);

        let amount = amount.to_string();
        let params = [
            ("payment_intent", transaction_ref),
            ("amount", amount.as_str()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/refunds", self.api_base))
            .bearer_auth(credential.expose())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::error_from_response(response).await;
            error!("Stripe refund failed on {}: {}", transaction_ref, err);
            return Err(err);
        }

        let refund: RefundResponse = response.json().await?;
        info!("Refund {} is {}", refund.id, refund.status);

        Ok(matches!(refund.status.as_str(), "succeeded" | "pending"))
    }

    fn name(&self) -> &'static str {
        "stripe"
    }
}
