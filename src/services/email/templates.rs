use super::{Notification, NotificationAttachment};
use crate::models::{Bus, Route, Ticket};
use crate::services::encoder::{decode_payload_image, EncodeError};
use handlebars::{Handlebars, RenderError, TemplateError};
use serde_json::json;

pub const PURCHASE_SUBJECT: &str = "Your Bus Ticket(s)";
pub const CANCELLATION_SUBJECT: &str = "Your Bus Ticket Was Cancelled";

const APP_NAME: &str = "Busline";

const PURCHASE_TEMPLATE_NAME: &str = "purchase";
const CANCELLATION_TEMPLATE_NAME: &str = "cancellation";

/// Email bodies, registered once and rendered with HTML escaping.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self, TemplateError> {
        let mut handlebars = Handlebars::new();

        handlebars.register_template_string(PURCHASE_TEMPLATE_NAME, PURCHASE_TEMPLATE)?;
        handlebars.register_template_string(CANCELLATION_TEMPLATE_NAME, CANCELLATION_TEMPLATE)?;

        Ok(Self { handlebars })
    }

    /// HTML body listing every ticket of a purchase. QR images are referenced
    /// by content id; see `purchase_attachments`.
    pub fn purchase_email(&self, tickets: &[Ticket], bus: &Bus, route: &Route) -> Result<String, RenderError> {
        let entries: Vec<_> = tickets
            .iter()
            .enumerate()
            .map(|(index, ticket)| {
                json!({
                    "id": ticket.id,
                    "order_number": ticket.order_number,
                    "qr_content_id": (!ticket.qr_code.is_empty()).then(|| qr_content_id(index)),
                })
            })
            .collect();
        let total: i64 = tickets.iter().map(|t| t.price).sum();

        let data = json!({
            "app_name": APP_NAME,
            "tickets": entries,
            "departure": route.departure,
            "destination": route.destination,
            "bus_number": bus.number,
            "departs_at": route.start_date.format("%d %b %Y at %H:%M").to_string(),
            "arrives_at": route.end_date.format("%d %b %Y at %H:%M").to_string(),
            "ticket_count": tickets.len(),
            "total_price": total,
        });

        self.handlebars.render(PURCHASE_TEMPLATE_NAME, &data)
    }

    pub fn purchase_notification(
        &self,
        to: &str,
        tickets: &[Ticket],
        bus: &Bus,
        route: &Route,
    ) -> anyhow::Result<Notification> {
        Ok(Notification {
            to: to.to_string(),
            subject: PURCHASE_SUBJECT.to_string(),
            html_body: self.purchase_email(tickets, bus, route)?,
            attachments: purchase_attachments(tickets)?,
        })
    }

    pub fn cancellation_notice(&self, ticket: &Ticket, route: &Route) -> Result<String, RenderError> {
        let data = json!({
            "app_name": APP_NAME,
            "order_number": ticket.order_number,
            "departure": route.departure,
            "destination": route.destination,
        });

        self.handlebars.render(CANCELLATION_TEMPLATE_NAME, &data)
    }
}

fn qr_content_id(index: usize) -> String {
    format!("qr{}.png", index + 1)
}

pub fn purchase_attachments(tickets: &[Ticket]) -> Result<Vec<NotificationAttachment>, EncodeError> {
    tickets
        .iter()
        .enumerate()
        .filter(|(_, ticket)| !ticket.qr_code.is_empty())
        .map(|(index, ticket)| {
            Ok(NotificationAttachment {
                filename: qr_content_id(index),
                content_type: "image/png".to_string(),
                content: decode_payload_image(&ticket.qr_code)?,
            })
        })
        .collect()
}

pub fn cancellation_notification(to: &str, message: &str) -> Notification {
    Notification {
        to: to.to_string(),
        subject: CANCELLATION_SUBJECT.to_string(),
        html_body: message.to_string(),
        attachments: vec![],
    }
}

const PURCHASE_TEMPLATE: &str = r#"<html>
<body style="font-family: Arial, sans-serif;">
    <h2>{{app_name}} Tickets</h2>
    <hr>
    {{#each tickets}}
    <h3>Ticket ID: {{id}}</h3>
    <p>
        <strong>Order:</strong> {{order_number}}<br>
        <strong>Route:</strong> {{../departure}} → {{../destination}}<br>
        <strong>Bus Number:</strong> {{../bus_number}}<br>
        <strong>Departure:</strong> {{../departs_at}}<br>
        <strong>Arrival:</strong> {{../arrives_at}}
    </p>
    {{#if qr_content_id}}
    <img src="cid:{{qr_content_id}}" alt="QR Code" style="margin-top:10px;"/><br>
    {{/if}}
    <hr>
    {{/each}}
    <h3>Total Tickets: {{ticket_count}}</h3>
    <h3>Total Price: {{total_price}}₸</h3>
</body>
</html>
"#;

const CANCELLATION_TEMPLATE: &str = r#"<html>
<body style="font-family: Arial, sans-serif;">
    <h2 style="color:#dc3545;">Your ticket has been cancelled</h2>
    <p>Order number: <strong>{{order_number}}</strong></p>
    <p>Route: <strong>{{departure}} → {{destination}}</strong></p>
    <p>Status: <strong>Cancelled</strong></p>
    <p>Thank you for travelling with {{app_name}}</p>
</body>
</html>
"#;
