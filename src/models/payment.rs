use super::ticket::UnknownStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRecordStatus {
    Pending,
    Successful,
    Failed,
    Refunded,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Pending => "pending",
            PaymentRecordStatus::Successful => "successful",
            PaymentRecordStatus::Failed => "failed",
            PaymentRecordStatus::Refunded => "refunded",
        }
    }
}

impl TryFrom<String> for PaymentRecordStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(PaymentRecordStatus::Pending),
            "successful" => Ok(PaymentRecordStatus::Successful),
            "failed" => Ok(PaymentRecordStatus::Failed),
            "refunded" => Ok(PaymentRecordStatus::Refunded),
            _ => Err(UnknownStatus { kind: "payment status", value }),
        }
    }
}

impl fmt::Display for PaymentRecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured charge. A batch purchase shares a single payment across all
/// of its tickets; per-ticket refunds accumulate in `refunded_amount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub refunded_amount: i64,
    #[sqlx(try_from = "String")]
    pub status: PaymentRecordStatus,
    pub transaction_id: String,
    pub idempotency_key: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn successful(user_id: Uuid, amount: i64, transaction_id: &str, idempotency_key: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            amount,
            refunded_amount: 0,
            status: PaymentRecordStatus::Successful,
            transaction_id: transaction_id.to_string(),
            idempotency_key,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_fully_refunded(&self) -> bool {
        self.refunded_amount >= self.amount
    }

    /// Status the payment should carry once `refunded_amount` has been applied.
    pub fn status_after_refunds(&self) -> PaymentRecordStatus {
        if self.is_fully_refunded() {
            PaymentRecordStatus::Refunded
        } else {
            self.status
        }
    }
}
