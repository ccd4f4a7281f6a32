pub mod email;
pub mod encoder;
pub mod gateway;
pub mod store;
pub mod ticket;

pub use email::{LogNotifier, Notifier, SmtpNotifier};
pub use gateway::{GatewayCredential, PaymentGateway, SimulatedGateway, StripeGateway};
pub use store::{BookingStore, InMemoryBookingStore, PgBookingStore};
pub use ticket::TicketService;
