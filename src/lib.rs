pub mod config;
pub mod controllers;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod services;

use actix_web::{HttpResponse, Responder};
use serde_json::json;

pub use controllers::configure_routes;
pub use errors::BookingError;

// Health check endpoint for load balancers and monitoring
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "busline-api",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn api_info() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "Busline Ticketing API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Bus ticket purchase and cancellation",
        "endpoints": {
            "health": "/health",
            "api_docs": "/api",
            "purchase": "POST /api/tickets/{route_id}",
            "cancel": "POST /api/tickets/{ticket_id}/cancel",
            "ticket": "GET /api/tickets/{ticket_id}",
            "my_tickets": "GET /api/tickets/my?type=upcoming|past",
            "cancelled_tickets": "GET /api/tickets/cancelled",
            "all_tickets": "GET /api/tickets?sort_by=&order=&page=&page_size= (admin)",
            "all_cancelled_tickets": "GET /api/tickets/admin/cancelled?page=&page_size= (admin)"
        }
    }))
}

// 404 handler for undefined routes
pub async fn not_found() -> impl Responder {
    HttpResponse::NotFound().json(json!({
        "error": "Endpoint not found",
        "message": "The requested resource does not exist",
        "available_endpoints": "/api for API documentation"
    }))
}
