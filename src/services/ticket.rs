use crate::errors::BookingError;
use crate::models::{
    Bus, PageRequest, Payment, PaymentStatus, Route, SortOrder, Ticket, TicketPage, TicketSort,
    TicketStatus, TicketWindow,
};
use crate::services::email::TemplateRenderer;
use crate::services::encoder::{encode_ticket, generate_order_number};
use crate::services::gateway::{ChargeOutcome, ChargeRequest, GatewayCredential, PaymentGateway};
use crate::services::store::{BookingStore, BookingTx, StoreError};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_CANCELLATION_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Serialize)]
pub struct PurchaseReceipt {
    pub tickets: Vec<Ticket>,
    pub bus: Bus,
    pub route: Route,
    #[serde(skip)]
    pub payment: Payment,
}

#[derive(Debug, Serialize)]
pub struct CancellationReceipt {
    pub ticket: Ticket,
    #[serde(skip)]
    pub route: Route,
    pub message: String,
}

pub struct TicketService<S: BookingStore> {
    store: S,
    gateway: Arc<dyn PaymentGateway>,
    credential: GatewayCredential,
    templates: TemplateRenderer,
    gateway_timeout: Duration,
    cancellation_window: chrono::Duration,
}

impl<S: BookingStore> TicketService<S> {
    pub fn new(
        store: S,
        gateway: Arc<dyn PaymentGateway>,
        credential: GatewayCredential,
        templates: TemplateRenderer,
    ) -> Self {
        Self {
            store,
            gateway,
            credential,
            templates,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
            cancellation_window: chrono::Duration::hours(DEFAULT_CANCELLATION_WINDOW_HOURS),
        }
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn with_cancellation_window(mut self, window: chrono::Duration) -> Self {
        self.cancellation_window = window;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn credential(&self) -> &GatewayCredential {
        &self.credential
    }

    pub fn templates(&self) -> &TemplateRenderer {
        &self.templates
    }

    /// Buys `quantity` seats on a route in one transaction: seat check,
    /// a single gateway charge for the whole batch, one payment row, one
    /// ticket per seat and the seat decrement. Any failure rolls everything back.
    pub async fn purchase(
        &self,
        user_id: Uuid,
        route_id: Uuid,
        payment_method_token: &str,
        quantity: i32,
    ) -> Result<PurchaseReceipt, BookingError> {
        if quantity <= 0 {
            return Err(BookingError::InvalidQuantity(quantity));
        }

        info!(
            "🎫 Starting purchase of {} ticket(s) on route {} for user {}",
            quantity, route_id, user_id
        );

        let mut tx = self.store.begin().await?;

        let route = tx
            .lock_route(route_id)
            .await?
            .ok_or(BookingError::RouteNotFound(route_id))?;

        if !route.has_seats_for(quantity) {
            info!(
                "Route {} has {} seat(s) left, {} requested",
                route_id, route.available_seats, quantity
            );
            return Err(BookingError::InsufficientSeats {
                requested: quantity,
                available: route.available_seats,
            });
        }

        let total_amount = route
            .price
            .checked_mul(i64::from(quantity))
            .ok_or(BookingError::InvalidQuantity(quantity))?;

        let charge = ChargeRequest {
            user_id,
            amount: total_amount,
            method_token: payment_method_token.to_string(),
            idempotency_key: Uuid::new_v4(),
        };
        let outcome = self.charge(&charge).await?;

        let recorded = match self
            .record_purchase(&mut tx, &route, &charge, &outcome, quantity)
            .await
        {
            Ok(receipt) => tx.commit().await.map(|_| receipt).map_err(BookingError::from),
            Err(e) => Err(e),
        };

        match recorded {
            Ok(receipt) => {
                info!(
                    "✅ Purchase completed: {} ticket(s), order {}, payment {} ({})",
                    receipt.tickets.len(),
                    receipt.tickets.first().map(|t| t.order_number.as_str()).unwrap_or("-"),
                    receipt.payment.id,
                    outcome.transaction_ref
                );
                Ok(receipt)
            }
            Err(e) => {
                Self::report_unrecorded_charge(&charge, &outcome, &e.to_string());
                Err(e)
            }
        }
    }

    /// Everything that happens after the charge. The caller commits.
    async fn record_purchase(
        &self,
        tx: &mut S::Tx,
        route: &Route,
        charge: &ChargeRequest,
        outcome: &ChargeOutcome,
        quantity: i32,
    ) -> Result<PurchaseReceipt, BookingError> {
        let payment = Payment::successful(
            charge.user_id,
            charge.amount,
            &outcome.transaction_ref,
            charge.idempotency_key,
        );
        tx.insert_payment(&payment).await?;

        let order_number = generate_order_number();
        let mut tickets = Vec::with_capacity(quantity as usize);

        for _ in 0..quantity {
            let mut ticket = Ticket::paid(
                charge.user_id,
                route.id,
                route.price,
                &order_number,
                payment.id,
            );
            ticket.qr_code = encode_ticket(&ticket)?;

            tx.insert_ticket(&ticket).await?;
            tickets.push(ticket);
        }

        let route = tx.adjust_seats(route.id, -quantity).await?;
        let bus = tx
            .get_bus(route.bus_id)
            .await?
            .ok_or(StoreError::NotFound { entity: "bus", id: route.bus_id })?;

        Ok(PurchaseReceipt {
            tickets,
            bus,
            route,
            payment,
        })
    }

    // Money moved at the gateway but the local transaction is gone. There is
    // no outbox; the log line is what reconciliation has to work from.
    fn report_unrecorded_charge(charge: &ChargeRequest, outcome: &ChargeOutcome, cause: &str) {
        error!(
            "❌ RECONCILIATION: charge {} of {} for user {} (idempotency key {}) succeeded but the purchase was rolled back: {}",
            outcome.transaction_ref, charge.amount, charge.user_id, charge.idempotency_key, cause
        );
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, BookingError> {
        let call = self.gateway.charge(request, &self.credential);

        match tokio::time::timeout(self.gateway_timeout, call).await {
            Err(_) => {
                error!(
                    "{} gateway did not answer within {:?} for user {}",
                    self.gateway.name(),
                    self.gateway_timeout,
                    request.user_id
                );
                Err(BookingError::PaymentFailed(format!(
                    "gateway timed out after {:?}",
                    self.gateway_timeout
                )))
            }
            Ok(Err(e)) => {
                error!("Payment failed for user {}: {}", request.user_id, e);
                Err(BookingError::PaymentFailed(e.to_string()))
            }
            Ok(Ok(outcome)) if !outcome.success => {
                warn!(
                    "Payment {} was not successful for user {}",
                    outcome.transaction_ref, request.user_id
                );
                Err(BookingError::PaymentFailed("payment was not successful".to_string()))
            }
            Ok(Ok(outcome)) => Ok(outcome),
        }
    }

    async fn refund(
        &self,
        transaction_ref: &str,
        credential: &GatewayCredential,
        amount: i64,
    ) -> Result<(), BookingError> {
        let call = self.gateway.refund(transaction_ref, credential, amount);

        match tokio::time::timeout(self.gateway_timeout, call).await {
            Err(_) => Err(BookingError::RefundFailed(format!(
                "gateway timed out after {:?}",
                self.gateway_timeout
            ))),
            Ok(Err(e)) => Err(BookingError::RefundFailed(e.to_string())),
            Ok(Ok(false)) => Err(BookingError::RefundFailed("refund was not successful".to_string())),
            Ok(Ok(true)) => Ok(()),
        }
    }

    /// Cancels one ticket, refunding its own price if it was paid for, and
    /// returns the seat to the route.
    pub async fn cancel(
        &self,
        user_id: Uuid,
        ticket_id: Uuid,
        credential: &GatewayCredential,
    ) -> Result<CancellationReceipt, BookingError> {
        info!("Cancellation of ticket {} requested by user {}", ticket_id, user_id);

        let mut tx = self.store.begin().await?;

        let ticket = tx
            .lock_ticket(ticket_id)
            .await?
            .ok_or(BookingError::TicketNotFound(ticket_id))?;

        if ticket.user_id != user_id {
            warn!("User {} tried to cancel ticket {} owned by someone else", user_id, ticket_id);
            return Err(BookingError::Unauthorized);
        }

        if ticket.is_cancelled() {
            return Err(BookingError::AlreadyCancelled(ticket_id));
        }

        let route = tx
            .lock_route(ticket.route_id)
            .await?
            .ok_or(StoreError::NotFound { entity: "route", id: ticket.route_id })?;

        if !route.cancellable_at(Utc::now(), self.cancellation_window) {
            return Err(BookingError::CancellationWindowClosed {
                hours: self.cancellation_window.num_hours(),
            });
        }

        if !ticket.is_paid() {
            let receipt = self.record_cancellation(&mut tx, &ticket, ticket.payment_status).await?;
            tx.commit().await?;
            return Ok(receipt);
        }

        let payment_id = ticket.payment_id.ok_or_else(|| {
            StoreError::InvalidRow(format!("paid ticket {} has no payment", ticket.id))
        })?;
        let payment = tx
            .get_payment(payment_id)
            .await?
            .ok_or(StoreError::NotFound { entity: "payment", id: payment_id })?;

        // Local writes go first; a seat-bound violation must fail before the refund.
        let receipt = self.record_refunded_cancellation(&mut tx, &ticket, &payment).await?;

        if let Err(e) = self.refund(&payment.transaction_id, credential, ticket.price).await {
            error!("Refund failed for ticket {}: {}", ticket.id, e);
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback after failed refund of ticket {} failed: {}", ticket.id, rollback);
            }
            return Err(e);
        }

        if let Err(e) = tx.commit().await {
            error!(
                "❌ RECONCILIATION: refund of {} on {} for ticket {} succeeded but the cancellation was rolled back: {}",
                ticket.price, payment.transaction_id, ticket.id, e
            );
            return Err(e.into());
        }

        Ok(receipt)
    }

    async fn record_refunded_cancellation(
        &self,
        tx: &mut S::Tx,
        ticket: &Ticket,
        payment: &Payment,
    ) -> Result<CancellationReceipt, BookingError> {
        let payment = tx.record_refund(payment.id, ticket.price).await?;
        info!(
            "Refunded {} on payment {} ({} of {} returned, status {})",
            ticket.price, payment.id, payment.refunded_amount, payment.amount, payment.status
        );

        self.record_cancellation(tx, ticket, PaymentStatus::Refunded).await
    }

    async fn record_cancellation(
        &self,
        tx: &mut S::Tx,
        ticket: &Ticket,
        payment_status: PaymentStatus,
    ) -> Result<CancellationReceipt, BookingError> {
        let cancelled = tx
            .update_ticket_status(ticket.id, TicketStatus::Cancelled, payment_status)
            .await?;
        let route = tx.adjust_seats(ticket.route_id, 1).await?;

        info!(
            "Ticket {} marked cancelled, route {} back to {} seat(s)",
            cancelled.id, route.id, route.available_seats
        );

        let message = self.templates.cancellation_notice(&cancelled, &route)?;

        Ok(CancellationReceipt {
            ticket: cancelled,
            route,
            message,
        })
    }

    /// A single ticket with its route, visible to its owner only.
    pub async fn ticket_details(
        &self,
        user_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<(Ticket, Route), BookingError> {
        let ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or(BookingError::TicketNotFound(ticket_id))?;

        if ticket.user_id != user_id {
            return Err(BookingError::Unauthorized);
        }

        let route = self
            .store
            .get_route(ticket.route_id)
            .await?
            .ok_or(BookingError::RouteNotFound(ticket.route_id))?;

        Ok((ticket, route))
    }

    pub async fn user_tickets(
        &self,
        user_id: Uuid,
        window: TicketWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, BookingError> {
        Ok(self.store.tickets_for_user(user_id, window, now).await?)
    }

    pub async fn cancelled_tickets(&self, user_id: Uuid) -> Result<Vec<Ticket>, BookingError> {
        Ok(self.store.cancelled_tickets_for_user(user_id).await?)
    }

    /// Administrative listing of every ticket.
    pub async fn all_tickets(
        &self,
        sort: TicketSort,
        order: SortOrder,
        page: PageRequest,
    ) -> Result<TicketPage, BookingError> {
        let (tickets, total) = self.store.list_tickets(sort, order, page).await?;
        Ok(TicketPage::new(tickets, total, page))
    }

    pub async fn all_cancelled_tickets(&self, page: PageRequest) -> Result<TicketPage, BookingError> {
        let (tickets, total) = self.store.list_cancelled_tickets(page).await?;
        Ok(TicketPage::new(tickets, total, page))
    }
}
