pub mod bus;
pub mod listing;
pub mod payment;
pub mod route;
pub mod ticket;

pub use bus::Bus;
pub use listing::{PageRequest, SortOrder, TicketPage, TicketSort};
pub use payment::{Payment, PaymentRecordStatus};
pub use route::Route;
pub use ticket::{PaymentStatus, Ticket, TicketStatus, TicketWindow};
