pub mod ticket;

use crate::services::store::BookingStore;
use actix_web::web;

pub fn configure_routes<S: BookingStore>(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(crate::health_check)).service(
        web::scope("/api")
            .route("", web::get().to(crate::api_info))
            .configure(ticket::configure::<S>),
    );
}
