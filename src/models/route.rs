use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Route {
    pub id: Uuid,
    pub departure: String,
    pub destination: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub available_seats: i32,
    pub bus_id: Uuid,
    pub price: i64, // minor currency units
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Route {
    pub fn has_seats_for(&self, quantity: i32) -> bool {
        self.available_seats >= quantity
    }

    /// Cancellation is allowed only while departure is strictly more than
    /// `window` away.
    pub fn cancellable_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.start_date - now > window
    }

    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now
    }
}
