use crate::services::email::{LogNotifier, Notifier, SmtpNotifier, SmtpSettings};
use crate::services::gateway::{
    GatewayCredential, GatewayError, GatewayKind, PaymentGateway, SimulatedGateway, StripeGateway,
};
use log::{info, warn};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to build payment gateway: {0}")]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub kind: GatewayKind,
    pub credential: GatewayCredential,
    pub stripe_api_base: String,
    pub currency: String,
    pub timeout: Duration,
    pub simulated_charge_success_rate: f64,
    pub simulated_refund_success_rate: f64,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub gateway: GatewaySettings,
    pub smtp: Option<SmtpSettings>,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

fn rate(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    let value = parsed(name, default)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "must be between 0 and 1".to_string(),
        });
    }
    Ok(value)
}

impl AppConfig {
    /// Reads the process environment. Call `dotenv().ok()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                value: "<redacted>".to_string(),
                reason: format!("must be at least {} characters long", MIN_JWT_SECRET_LEN),
            });
        }

        let kind: GatewayKind = parsed("PAYMENT_GATEWAY", GatewayKind::Simulated)?;
        let credential = match kind {
            GatewayKind::Stripe => GatewayCredential::new(required("STRIPE_SECRET_KEY")?),
            GatewayKind::Simulated => {
                GatewayCredential::new(optional("STRIPE_SECRET_KEY").unwrap_or_default())
            }
        };

        let gateway = GatewaySettings {
            kind,
            credential,
            stripe_api_base: optional("STRIPE_API_BASE")
                .unwrap_or_else(|| crate::services::gateway::stripe::DEFAULT_API_BASE.to_string()),
            currency: optional("PAYMENT_CURRENCY").unwrap_or_else(|| "kzt".to_string()),
            timeout: Duration::from_secs(parsed("GATEWAY_TIMEOUT_SECS", 15u64)?),
            simulated_charge_success_rate: rate("SIMULATED_CHARGE_SUCCESS_RATE", 0.90)?,
            simulated_refund_success_rate: rate("SIMULATED_REFUND_SUCCESS_RATE", 0.95)?,
        };

        let smtp = match (
            optional("SMTP_SERVER"),
            optional("SMTP_USERNAME"),
            optional("SMTP_PASSWORD"),
        ) {
            (Some(server), Some(username), Some(password)) => Some(SmtpSettings {
                from: optional("EMAIL_FROM").unwrap_or_else(|| username.clone()),
                server,
                username,
                password,
            }),
            _ => {
                warn!("SMTP_SERVER/SMTP_USERNAME/SMTP_PASSWORD not fully set, emails will only be logged");
                None
            }
        };

        Ok(Self {
            database_url,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 20u32)?,
            jwt_secret,
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: parsed("SERVER_PORT", 8080u16)?,
            cors_allowed_origins: optional("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000,http://localhost:5173".to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            gateway,
            smtp,
        })
    }
}

impl GatewaySettings {
    pub fn build_gateway(&self) -> Result<Arc<dyn PaymentGateway>, ConfigError> {
        match self.kind {
            GatewayKind::Stripe => {
                info!("💳 Using Stripe payment gateway at {}", self.stripe_api_base);
                Ok(Arc::new(StripeGateway::new(
                    &self.stripe_api_base,
                    &self.currency,
                    self.timeout,
                )?))
            }
            GatewayKind::Simulated => {
                warn!(
                    "🛠️ Using simulated payment gateway (charge rate {}, refund rate {})",
                    self.simulated_charge_success_rate, self.simulated_refund_success_rate
                );
                Ok(Arc::new(SimulatedGateway::new(
                    self.simulated_charge_success_rate,
                    self.simulated_refund_success_rate,
                )))
            }
        }
    }
}

impl AppConfig {
    pub fn build_notifier(&self) -> Arc<dyn Notifier> {
        match &self.smtp {
            Some(settings) => {
                info!("📧 Using SMTP relay {}", settings.server);
                Arc::new(SmtpNotifier::new(settings.clone()))
            }
            None => Arc::new(LogNotifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_defaults_when_unset() {
        assert!(matches!(
            rate("BUSLINE_TEST_UNSET_RATE", 0.9),
            Ok(v) if (v - 0.9).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn test_parsed_falls_back_to_default() {
        assert_eq!(parsed("BUSLINE_TEST_UNSET_PORT", 8080u16).unwrap(), 8080);
    }

    #[test]
    fn test_simulated_gateway_is_built_without_network() {
        let settings = GatewaySettings {
            kind: GatewayKind::Simulated,
            credential: GatewayCredential::new(""),
            stripe_api_base: "https://api.stripe.com".to_string(),
            currency: "kzt".to_string(),
            timeout: Duration::from_secs(15),
            simulated_charge_success_rate: 1.0,
            simulated_refund_success_rate: 1.0,
        };

        assert_eq!(settings.build_gateway().unwrap().name(), "simulated");
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(ConfigError::Missing("DATABASE_URL").to_string(), "DATABASE_URL must be set");
        let err = ConfigError::Invalid {
            name: "SERVER_PORT",
            value: "http".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert!(err.to_string().starts_with("SERVER_PORT has an invalid value 'http'"));
    }
}
