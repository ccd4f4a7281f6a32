use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Awaiting,
    Approved,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Awaiting => "awaiting",
            TicketStatus::Approved => "approved",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

impl TryFrom<String> for TicketStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "awaiting" => Ok(TicketStatus::Awaiting),
            "approved" => Ok(TicketStatus::Approved),
            "cancelled" => Ok(TicketStatus::Cancelled),
            _ => Err(UnknownStatus { kind: "ticket status", value }),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(UnknownStatus { kind: "ticket payment status", value }),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub route_id: Uuid,
    pub price: i64, // frozen at purchase time
    #[sqlx(try_from = "String")]
    pub status: TicketStatus,
    #[sqlx(try_from = "String")]
    pub payment_status: PaymentStatus,
    pub order_number: String,
    pub qr_code: String,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Which side of "now" a ticket listing covers, by route departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketWindow {
    Upcoming,
    Past,
}

impl Ticket {
    /// Builds a ticket that has just been paid for. The QR payload is filled
    /// in afterwards since it encodes the ticket itself.
    pub fn paid(
        user_id: Uuid,
        route_id: Uuid,
        price: i64,
        order_number: &str,
        payment_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            route_id,
            price,
            status: TicketStatus::Approved,
            payment_status: PaymentStatus::Paid,
            order_number: order_number.to_string(),
            qr_code: String::new(),
            payment_id: Some(payment_id),
            created_at: Utc::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == TicketStatus::Cancelled
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}
