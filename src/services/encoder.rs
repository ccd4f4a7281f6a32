use crate::models::Ticket;
use base64::engine::general_purpose;
use base64::Engine;
use chrono::{DateTime, Utc};
use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use rand::Rng;
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;
use uuid::Uuid;

const QR_MIN_SIZE: u32 = 183;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize ticket payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("failed to build QR code: {0}")]
    Qr(#[from] qrcode::types::QrError),

    #[error("failed to rasterize QR code: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid base64 image: {0}")]
    Base64(#[from] base64::DecodeError),
}

#[derive(Serialize)]
struct TicketPayload<'a> {
    id: Uuid,
    user_id: Uuid,
    route_id: Uuid,
    price: i64,
    order_number: &'a str,
    created_at: DateTime<Utc>,
}

/// Batch label shared by the tickets of one purchase. Cosmetic only: two
/// purchases in the same second can draw the same suffix.
pub fn generate_order_number() -> String {
    let suffix: u32 = rand::rng().random_range(0..10_000);
    format!("ORD-{}-{:04}", Utc::now().timestamp(), suffix)
}

/// The text embedded in a ticket's QR code.
pub fn ticket_payload(ticket: &Ticket) -> Result<String, EncodeError> {
    let payload = TicketPayload {
        id: ticket.id,
        user_id: ticket.user_id,
        route_id: ticket.route_id,
        price: ticket.price,
        order_number: &ticket.order_number,
        created_at: ticket.created_at,
    };

    Ok(serde_json::to_string(&payload)?)
}

/// Renders the ticket's identifying fields as a PNG QR code, base64 encoded.
pub fn encode_ticket(ticket: &Ticket) -> Result<String, EncodeError> {
    let payload = ticket_payload(ticket)?;
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)?;

    let raster = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_MIN_SIZE, QR_MIN_SIZE)
        .build();

    let mut png = Vec::new();
    raster.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    Ok(general_purpose::STANDARD.encode(png))
}

pub fn decode_payload_image(encoded: &str) -> Result<Vec<u8>, EncodeError> {
    Ok(general_purpose::STANDARD.decode(encoded)?)
}
