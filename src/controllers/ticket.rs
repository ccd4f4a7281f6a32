use crate::errors::BookingError;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{PageRequest, SortOrder, TicketSort, TicketWindow};
use crate::services::email::templates::cancellation_notification;
use crate::services::email::{dispatch, Notifier};
use crate::services::store::BookingStore;
use crate::services::ticket::TicketService;
use actix_web::{web, HttpResponse, Responder};
use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseTicketsRequest {
    pub quantity: i32,
    pub payment_method_id: String,
    pub user_email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelTicketRequest {
    pub user_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TicketListQuery {
    #[serde(rename = "type")]
    pub window: TicketWindow,
}

#[derive(Debug, Deserialize)]
pub struct AdminTicketQuery {
    pub sort_by: Option<TicketSort>,
    pub order: Option<SortOrder>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

fn admin_required(user: &AuthenticatedUser) -> Option<HttpResponse> {
    if user.is_admin() {
        return None;
    }

    warn!("Non-admin user {} attempted admin access", user.id);
    Some(HttpResponse::Forbidden().json(ErrorResponse {
        error: "forbidden".to_string(),
        message: "Admin access required".to_string(),
    }))
}

pub fn error_response(err: &BookingError) -> HttpResponse {
    let (mut builder, error) = match err {
        BookingError::InvalidQuantity(_) => (HttpResponse::BadRequest(), "invalid_quantity"),
        BookingError::RouteNotFound(_) => (HttpResponse::NotFound(), "route_not_found"),
        BookingError::TicketNotFound(_) => (HttpResponse::NotFound(), "ticket_not_found"),
        BookingError::Unauthorized => (HttpResponse::Forbidden(), "unauthorized"),
        BookingError::InsufficientSeats { .. } => (HttpResponse::Conflict(), "insufficient_seats"),
        BookingError::AlreadyCancelled(_) => (HttpResponse::Conflict(), "already_cancelled"),
        BookingError::CancellationWindowClosed { .. } => {
            (HttpResponse::Conflict(), "cancellation_window_closed")
        }
        BookingError::PaymentFailed(_) => (HttpResponse::BadGateway(), "payment_failed"),
        BookingError::RefundFailed(_) => (HttpResponse::BadGateway(), "refund_failed"),
        BookingError::PersistenceFailure(_)
        | BookingError::TicketEncoding(_)
        | BookingError::NoticeRendering(_) => {
            (HttpResponse::InternalServerError(), "internal_error")
        }
    };

    // Storage details stay in the logs.
    let message = match err {
        BookingError::PersistenceFailure(_)
        | BookingError::TicketEncoding(_)
        | BookingError::NoticeRendering(_) => {
            error!("Booking failed: {}", err);
            "Something went wrong while saving your booking".to_string()
        }
        _ => err.to_string(),
    };

    builder.json(ErrorResponse {
        error: error.to_string(),
        message,
    })
}

pub async fn purchase_tickets<S: BookingStore>(
    service: web::Data<TicketService<S>>,
    notifier: web::Data<Arc<dyn Notifier>>,
    route_id: web::Path<Uuid>,
    body: web::Json<PurchaseTicketsRequest>,
    user: AuthenticatedUser,
) -> impl Responder {
    let request = body.into_inner();

    let receipt = match service
        .purchase(user.id, *route_id, &request.payment_method_id, request.quantity)
        .await
    {
        Ok(receipt) => receipt,
        Err(e) => {
            warn!("Purchase on route {} by user {} failed: {}", route_id, user.id, e);
            return error_response(&e);
        }
    };

    match request.user_email.as_deref() {
        Some(email) => match service.templates().purchase_notification(
            email,
            &receipt.tickets,
            &receipt.bus,
            &receipt.route,
        ) {
            Ok(notification) => {
                dispatch(notifier.get_ref().clone(), notification);
            }
            Err(e) => error!("Failed to build ticket email for user {}: {}", user.id, e),
        },
        None => info!("No email given for purchase by user {}, skipping ticket email", user.id),
    }

    HttpResponse::Ok().json(receipt)
}

pub async fn cancel_ticket<S: BookingStore>(
    service: web::Data<TicketService<S>>,
    notifier: web::Data<Arc<dyn Notifier>>,
    ticket_id: web::Path<Uuid>,
    body: Option<web::Json<CancelTicketRequest>>,
    user: AuthenticatedUser,
) -> impl Responder {
    let request = body.map(|b| b.into_inner()).unwrap_or_default();
    let credential = service.credential().clone();

    match service.cancel(user.id, *ticket_id, &credential).await {
        Ok(receipt) => {
            if let Some(email) = request.user_email.as_deref() {
                dispatch(
                    notifier.get_ref().clone(),
                    cancellation_notification(email, &receipt.message),
                );
            }
            HttpResponse::Ok().json(receipt)
        }
        Err(e) => {
            warn!("Cancellation of ticket {} by user {} failed: {}", ticket_id, user.id, e);
            error_response(&e)
        }
    }
}

pub async fn get_user_tickets<S: BookingStore>(
    service: web::Data<TicketService<S>>,
    query: web::Query<TicketListQuery>,
    user: AuthenticatedUser,
) -> impl Responder {
    match service.user_tickets(user.id, query.window, Utc::now()).await {
        Ok(tickets) => HttpResponse::Ok().json(tickets),
        Err(e) => error_response(&e),
    }
}

pub async fn get_cancelled_tickets<S: BookingStore>(
    service: web::Data<TicketService<S>>,
    user: AuthenticatedUser,
) -> impl Responder {
    match service.cancelled_tickets(user.id).await {
        Ok(tickets) => HttpResponse::Ok().json(tickets),
        Err(e) => error_response(&e),
    }
}

pub async fn get_ticket<S: BookingStore>(
    service: web::Data<TicketService<S>>,
    ticket_id: web::Path<Uuid>,
    user: AuthenticatedUser,
) -> impl Responder {
    match service.ticket_details(user.id, *ticket_id).await {
        Ok((ticket, route)) => HttpResponse::Ok().json(json!({
            "ticket": ticket,
            "route": route,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn get_all_tickets<S: BookingStore>(
    service: web::Data<TicketService<S>>,
    query: web::Query<AdminTicketQuery>,
    user: AuthenticatedUser,
) -> impl Responder {
    if let Some(denied) = admin_required(&user) {
        return denied;
    }

    let page = PageRequest::new(query.page, query.page_size);
    match service
        .all_tickets(query.sort_by.unwrap_or_default(), query.order.unwrap_or_default(), page)
        .await
    {
        Ok(tickets) => HttpResponse::Ok().json(tickets),
        Err(e) => error_response(&e),
    }
}

pub async fn get_all_cancelled_tickets<S: BookingStore>(
    service: web::Data<TicketService<S>>,
    query: web::Query<PageQuery>,
    user: AuthenticatedUser,
) -> impl Responder {
    if let Some(denied) = admin_required(&user) {
        return denied;
    }

    match service
        .all_cancelled_tickets(PageRequest::new(query.page, query.page_size))
        .await
    {
        Ok(tickets) => HttpResponse::Ok().json(tickets),
        Err(e) => error_response(&e),
    }
}

// GET and POST on "/{id}" share one resource: the id is a ticket for GET and a
// route for POST.
pub fn configure<S: BookingStore>(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/tickets")
            .route("", web::get().to(get_all_tickets::<S>))
            .route("/admin/cancelled", web::get().to(get_all_cancelled_tickets::<S>))
            .route("/my", web::get().to(get_user_tickets::<S>))
            .route("/cancelled", web::get().to(get_cancelled_tickets::<S>))
            .service(
                web::resource("/{id}")
                    .route(web::get().to(get_ticket::<S>))
                    .route(web::post().to(purchase_tickets::<S>)),
            )
            .route("/{id}/cancel", web::post().to(cancel_ticket::<S>)),
    );
}
