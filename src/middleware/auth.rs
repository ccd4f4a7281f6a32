use actix_web::{dev::Payload, error::ErrorUnauthorized, http, web, Error, FromRequest, HttpRequest};
use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use uuid::Uuid;

pub const USER_ROLE: &str = "user";
pub const ADMIN_ROLE: &str = "admin";

fn default_role() -> String {
    USER_ROLE.to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user ID
    #[serde(default = "default_role")]
    pub role: String,
    pub exp: i64, // Expiration
    pub iat: i64, // Issued at
}

/// Signing secret shared by every worker, registered as `web::Data<AuthSettings>`.
#[derive(Clone)]
pub struct AuthSettings {
    jwt_secret: String,
}

impl AuthSettings {
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
        }
    }

    pub fn issue_token(&self, user_id: Uuid, ttl: Duration) -> Result<String> {
        self.issue_token_with_role(user_id, USER_ROLE, ttl)
    }

    pub fn issue_token_with_role(&self, user_id: Uuid, role: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| anyhow!("Invalid timestamp calculation"))?;

        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Uuid> {
        Ok(self.verify_user(token)?.id)
    }

    pub fn verify_user(&self, token: &str) -> Result<AuthenticatedUser> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        validation.leeway = 60;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )?;

        let user_id = Uuid::parse_str(&token_data.claims.sub)?;
        debug!("✅ Token verified for user: {} (role: {})", user_id, token_data.claims.role);

        Ok(AuthenticatedUser {
            id: user_id,
            role: token_data.claims.role,
        })
    }
}

#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub role: String,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    fn from_http(req: &HttpRequest) -> Result<Self, Error> {
        let auth_header = match req.headers().get(http::header::AUTHORIZATION) {
            Some(header) => header,
            None => {
                warn!("❌ Request without authorization header: {}", req.path());
                return Err(ErrorUnauthorized("Authorization header required"));
            }
        };

        let auth_str = auth_header.to_str().map_err(|_| {
            warn!("Invalid authorization header format");
            ErrorUnauthorized("Invalid authorization header format")
        })?;

        let token = match auth_str.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => token.trim(),
            Some(_) => {
                warn!("Empty token provided");
                return Err(ErrorUnauthorized("Token cannot be empty"));
            }
            None => {
                warn!("Authorization header without Bearer scheme");
                return Err(ErrorUnauthorized("Bearer token required"));
            }
        };

        let settings = req.app_data::<web::Data<AuthSettings>>().ok_or_else(|| {
            error!("Auth settings not found in app data");
            ErrorUnauthorized("Internal server error")
        })?;

        match settings.verify_user(token) {
            Ok(user) => Ok(user),
            Err(e) => {
                warn!("Token verification failed: {}", e);
                Err(ErrorUnauthorized("Invalid or expired token"))
            }
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::from_http(req))
    }
}
