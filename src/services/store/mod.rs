// Transactional persistence for routes, tickets and payments.
//
// The seat counter on a route is only ever changed through `BookingTx::adjust_seats`,
// inside the same transaction that creates or cancels the tickets it accounts for.

use crate::models::{
    Bus, PageRequest, Payment, PaymentStatus, Route, SortOrder, Ticket, TicketSort, TicketStatus,
    TicketWindow,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::{FaultPoint, InMemoryBookingStore};
pub use postgres::PgBookingStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("seat adjustment of {delta} on route {route_id} would leave the valid range")]
    SeatBoundsViolated { route_id: Uuid, delta: i32 },

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("injected fault at {0:?}")]
    Injected(FaultPoint),
}

#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    type Tx: BookingTx;

    /// Opens a transaction. Dropping the handle without `commit` rolls it back.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn get_route(&self, id: Uuid) -> Result<Option<Route>, StoreError>;
    async fn get_bus(&self, id: Uuid) -> Result<Option<Bus>, StoreError>;
    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError>;
    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn tickets_for_user(
        &self,
        user_id: Uuid,
        window: TicketWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, StoreError>;

    async fn cancelled_tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError>;

    /// Every ticket, ordered by `sort` with the ticket id as tie-breaker.
    /// Returns one page plus the total row count.
    async fn list_tickets(
        &self,
        sort: TicketSort,
        order: SortOrder,
        page: PageRequest,
    ) -> Result<(Vec<Ticket>, i64), StoreError>;

    /// Cancelled tickets of every user, newest first.
    async fn list_cancelled_tickets(&self, page: PageRequest) -> Result<(Vec<Ticket>, i64), StoreError>;
}

#[async_trait]
pub trait BookingTx: Send + Sized {
    /// Reads a route and holds it against concurrent seat changes until the
    /// transaction ends.
    async fn lock_route(&mut self, id: Uuid) -> Result<Option<Route>, StoreError>;

    async fn lock_ticket(&mut self, id: Uuid) -> Result<Option<Ticket>, StoreError>;

    async fn get_bus(&mut self, id: Uuid) -> Result<Option<Bus>, StoreError>;

    async fn get_payment(&mut self, id: Uuid) -> Result<Option<Payment>, StoreError>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<(), StoreError>;

    async fn update_ticket_status(
        &mut self,
        id: Uuid,
        status: TicketStatus,
        payment_status: PaymentStatus,
    ) -> Result<Ticket, StoreError>;

    /// Adds `amount` to the payment's refunded total and flips its status to
    /// refunded once the whole amount has been given back.
    async fn record_refund(&mut self, payment_id: Uuid, amount: i64) -> Result<Payment, StoreError>;

    /// Applies `delta` to the route's available seats as one conditional update.
    /// Fails with `SeatBoundsViolated` when the result would leave
    /// `[0, bus.total_seats]`; nothing is changed in that case.
    async fn adjust_seats(&mut self, route_id: Uuid, delta: i32) -> Result<Route, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
