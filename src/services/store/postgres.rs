use super::{BookingStore, BookingTx, StoreError};
use crate::models::{
    Bus, PageRequest, Payment, PaymentStatus, Route, SortOrder, Ticket, TicketSort, TicketStatus,
    TicketWindow,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub struct PgBookingTx {
    tx: SqlxTransaction<'static, Postgres>,
}

#[async_trait]
impl BookingStore for PgBookingStore {
    type Tx = PgBookingTx;

    async fn begin(&self) -> Result<PgBookingTx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgBookingTx { tx })
    }

    async fn get_route(&self, id: Uuid) -> Result<Option<Route>, StoreError> {
        let route = sqlx::query_as::<_, Route>("SELECT * FROM routes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(route)
    }

    async fn get_bus(&self, id: Uuid) -> Result<Option<Bus>, StoreError> {
        let bus = sqlx::query_as::<_, Bus>("SELECT id, number, total_seats FROM buses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(bus)
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(ticket)
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    async fn tickets_for_user(
        &self,
        user_id: Uuid,
        window: TicketWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, StoreError> {
        let query = match window {
            TicketWindow::Upcoming => {
                r#"
                SELECT t.* FROM tickets t
                JOIN routes r ON r.id = t.route_id
                WHERE t.user_id = $1 AND r.start_date > $2
                ORDER BY r.start_date ASC, t.created_at ASC
                "#
            }
            TicketWindow::Past => {
                r#"
                SELECT t.* FROM tickets t
                JOIN routes r ON r.id = t.route_id
                WHERE t.user_id = $1 AND r.start_date <= $2
                ORDER BY r.start_date DESC, t.created_at ASC
                "#
            }
        };

        let tickets = sqlx::query_as::<_, Ticket>(query)
            .bind(user_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(tickets)
    }

    async fn cancelled_tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE user_id = $1 AND status = 'cancelled'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
    }

    async fn list_tickets(
        &self,
        sort: TicketSort,
        order: SortOrder,
        page: PageRequest,
    ) -> Result<(Vec<Ticket>, i64), StoreError> {
        // Only whitelisted identifiers are interpolated.
        let query = format!(
            r#"
            SELECT t.* FROM tickets t
            JOIN routes r ON r.id = t.route_id
            ORDER BY {} {}, t.id ASC
            LIMIT $1 OFFSET $2
            "#,
            sort_column(sort),
            sort_direction(order)
        );

        let tickets = sqlx::query_as::<_, Ticket>(&query)
            .bind(page.page_size)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets")
            .fetch_one(&self.pool)
            .await?;

        Ok((tickets, total))
    }

    async fn list_cancelled_tickets(&self, page: PageRequest) -> Result<(Vec<Ticket>, i64), StoreError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE status = 'cancelled'
            ORDER BY created_at DESC, id ASC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.page_size)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE status = 'cancelled'")
            .fetch_one(&self.pool)
            .await?;

        Ok((tickets, total))
    }
}

fn sort_column(sort: TicketSort) -> &'static str {
    match sort {
        TicketSort::User => "t.user_id",
        TicketSort::StartDate => "r.start_date",
        TicketSort::Route => "t.route_id",
        TicketSort::Price => "t.price",
        TicketSort::Status => "t.status",
        TicketSort::PaymentStatus => "t.payment_status",
    }
}

fn sort_direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

#[async_trait]
impl BookingTx for PgBookingTx {
    async fn lock_route(&mut self, id: Uuid) -> Result<Option<Route>, StoreError> {
        let route = sqlx::query_as::<_, Route>("SELECT * FROM routes WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(route)
    }

    async fn lock_ticket(&mut self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(ticket)
    }

    async fn get_bus(&mut self, id: Uuid) -> Result<Option<Bus>, StoreError> {
        let bus = sqlx::query_as::<_, Bus>("SELECT id, number, total_seats FROM buses WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(bus)
    }

    async fn get_payment(&mut self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(payment)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, user_id, amount, refunded_amount, status, transaction_id,
                idempotency_key, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id)
        .bind(payment.user_id)
        .bind(payment.amount)
        .bind(payment.refunded_amount)
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(payment.idempotency_key)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tickets (
                id, user_id, route_id, price, status, payment_status,
                order_number, qr_code, payment_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.user_id)
        .bind(ticket.route_id)
        .bind(ticket.price)
        .bind(ticket.status.as_str())
        .bind(ticket.payment_status.as_str())
        .bind(&ticket.order_number)
        .bind(&ticket.qr_code)
        .bind(ticket.payment_id)
        .bind(ticket.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_ticket_status(
        &mut self,
        id: Uuid,
        status: TicketStatus,
        payment_status: PaymentStatus,
    ) -> Result<Ticket, StoreError> {
        sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets
            SET status = $1, payment_status = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(status.as_str())
        .bind(payment_status.as_str())
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::NotFound { entity: "ticket", id })
    }

    async fn record_refund(&mut self, payment_id: Uuid, amount: i64) -> Result<Payment, StoreError> {
        sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET refunded_amount = refunded_amount + $1,
                status = CASE WHEN refunded_amount + $1 >= amount THEN 'refunded' ELSE status END,
                updated_at = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::NotFound { entity: "payment", id: payment_id })
    }

    async fn adjust_seats(&mut self, route_id: Uuid, delta: i32) -> Result<Route, StoreError> {
        let updated = sqlx::query_as::<_, Route>(
            r#"
            UPDATE routes r
            SET available_seats = r.available_seats + $1, updated_at = $2
            FROM buses b
            WHERE r.id = $3
              AND b.id = r.bus_id
              AND r.available_seats + $1 >= 0
              AND r.available_seats + $1 <= b.total_seats
            RETURNING r.*
            "#,
        )
        .bind(delta)
        .bind(Utc::now())
        .bind(route_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match updated {
            Some(route) => {
                debug!(
                    "Adjusted seats on route {} by {} (now {})",
                    route_id, delta, route.available_seats
                );
                Ok(route)
            }
            None => {
                let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM routes WHERE id = $1)")
                    .bind(route_id)
                    .fetch_one(&mut *self.tx)
                    .await?;

                if exists {
                    Err(StoreError::SeatBoundsViolated { route_id, delta })
                } else {
                    Err(StoreError::NotFound { entity: "route", id: route_id })
                }
            }
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
