use crate::services::encoder::EncodeError;
use crate::services::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Failures of the purchase and cancellation workflows. Every variant leaves
/// the datastore as it was before the call.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("quantity must be a positive integer, got {0}")]
    InvalidQuantity(i32),

    #[error("route {0} not found")]
    RouteNotFound(Uuid),

    #[error("not enough seats: requested {requested}, available {available}")]
    InsufficientSeats { requested: i32, available: i32 },

    #[error("payment failed: {0}")]
    PaymentFailed(String),

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("failed to encode ticket: {0}")]
    TicketEncoding(#[from] EncodeError),

    #[error("failed to render cancellation notice: {0}")]
    NoticeRendering(#[from] handlebars::RenderError),

    #[error("ticket {0} not found")]
    TicketNotFound(Uuid),

    #[error("ticket does not belong to the caller")]
    Unauthorized,

    #[error("ticket {0} is already cancelled")]
    AlreadyCancelled(Uuid),

    #[error("cancellation is not allowed less than {hours} hours before departure")]
    CancellationWindowClosed { hours: i64 },

    #[error("refund failed: {0}")]
    RefundFailed(String),
}
