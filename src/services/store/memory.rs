// In-process booking store for tests and local runs without Postgres.
//
// Transactions are serialised: `begin` takes the table lock and holds it until
// the handle is committed or dropped. Writes go to a staged copy that replaces
// the tables on commit and is discarded otherwise.

use super::{BookingStore, BookingTx, StoreError};
use crate::models::{
    Bus, PageRequest, Payment, PaymentStatus, Route, SortOrder, Ticket, TicketSort, TicketStatus,
    TicketWindow,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Places where a transaction can be told to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    InsertPayment,
    InsertTicket,
    AdjustSeats,
    Commit,
}

#[derive(Debug, Default, Clone)]
struct Tables {
    routes: HashMap<Uuid, Route>,
    buses: HashMap<Uuid, Bus>,
    tickets: HashMap<Uuid, Ticket>,
    payments: HashMap<Uuid, Payment>,
}

#[derive(Clone, Default)]
pub struct InMemoryBookingStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<StdMutex<HashSet<FaultPoint>>>,
    commits: Arc<AtomicUsize>,
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    faults: HashSet<FaultPoint>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_bus(&self, bus: Bus) {
        self.tables.lock().await.buses.insert(bus.id, bus);
    }

    pub async fn seed_route(&self, route: Route) {
        self.tables.lock().await.routes.insert(route.id, route);
    }

    pub async fn seed_ticket(&self, ticket: Ticket) {
        self.tables.lock().await.tickets.insert(ticket.id, ticket);
    }

    pub async fn seed_payment(&self, payment: Payment) {
        self.tables.lock().await.payments.insert(payment.id, payment);
    }

    /// Makes every later transaction fail at `point` until cleared.
    pub fn inject_fault(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.insert(point);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    pub async fn ticket_count(&self) -> usize {
        self.tables.lock().await.tickets.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.lock().await.payments.len()
    }

    pub async fn tickets(&self) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self.tables.lock().await.tickets.values().cloned().collect();
        tickets.sort_by_key(|t| t.created_at);
        tickets
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.tables.lock().await.payments.values().cloned().collect()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn active_faults(&self) -> HashSet<FaultPoint> {
        self.faults.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();

        Ok(InMemoryTx {
            guard,
            staged,
            faults: self.active_faults(),
            commits: self.commits.clone(),
        })
    }

    async fn get_route(&self, id: Uuid) -> Result<Option<Route>, StoreError> {
        Ok(self.tables.lock().await.routes.get(&id).cloned())
    }

    async fn get_bus(&self, id: Uuid) -> Result<Option<Bus>, StoreError> {
        Ok(self.tables.lock().await.buses.get(&id).cloned())
    }

    async fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.tables.lock().await.tickets.get(&id).cloned())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.tables.lock().await.payments.get(&id).cloned())
    }

    async fn tickets_for_user(
        &self,
        user_id: Uuid,
        window: TicketWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, StoreError> {
        let tables = self.tables.lock().await;

        let mut tickets: Vec<(DateTime<Utc>, Ticket)> = tables
            .tickets
            .values()
            .filter(|t| t.user_id == user_id)
            .filter_map(|t| tables.routes.get(&t.route_id).map(|r| (r.start_date, t.clone())))
            .filter(|(start, _)| match window {
                TicketWindow::Upcoming => *start > now,
                TicketWindow::Past => *start <= now,
            })
            .collect();

        tickets.sort_by(|(a_start, a), (b_start, b)| {
            let by_departure = match window {
                TicketWindow::Upcoming => a_start.cmp(b_start),
                TicketWindow::Past => b_start.cmp(a_start),
            };
            by_departure.then(a.created_at.cmp(&b.created_at))
        });

        Ok(tickets.into_iter().map(|(_, t)| t).collect())
    }

    async fn cancelled_tickets_for_user(&self, user_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let tables = self.tables.lock().await;

        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.user_id == user_id && t.status == TicketStatus::Cancelled)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(tickets)
    }

    async fn list_tickets(
        &self,
        sort: TicketSort,
        order: SortOrder,
        page: PageRequest,
    ) -> Result<(Vec<Ticket>, i64), StoreError> {
        let tables = self.tables.lock().await;

        let mut tickets: Vec<&Ticket> = tables.tickets.values().collect();
        tickets.sort_by(|a, b| {
            let primary = compare_by(&tables, sort, a, b);
            let primary = match order {
                SortOrder::Asc => primary,
                SortOrder::Desc => primary.reverse(),
            };
            primary.then(a.id.cmp(&b.id))
        });

        Ok((paginate(tickets, page), tables.tickets.len() as i64))
    }

    async fn list_cancelled_tickets(&self, page: PageRequest) -> Result<(Vec<Ticket>, i64), StoreError> {
        let tables = self.tables.lock().await;

        let mut tickets: Vec<&Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.status == TicketStatus::Cancelled)
            .collect();
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = tickets.len() as i64;

        Ok((paginate(tickets, page), total))
    }
}

fn compare_by(tables: &Tables, sort: TicketSort, a: &Ticket, b: &Ticket) -> CmpOrdering {
    match sort {
        TicketSort::User => a.user_id.cmp(&b.user_id),
        TicketSort::StartDate => {
            let start = |t: &Ticket| tables.routes.get(&t.route_id).map(|r| r.start_date);
            start(a).cmp(&start(b))
        }
        TicketSort::Route => a.route_id.cmp(&b.route_id),
        TicketSort::Price => a.price.cmp(&b.price),
        TicketSort::Status => a.status.as_str().cmp(b.status.as_str()),
        TicketSort::PaymentStatus => a.payment_status.as_str().cmp(b.payment_status.as_str()),
    }
}

fn paginate(tickets: Vec<&Ticket>, page: PageRequest) -> Vec<Ticket> {
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let size = usize::try_from(page.page_size).unwrap_or(0);

    tickets.into_iter().skip(offset).take(size).cloned().collect()
}

impl InMemoryTx {
    fn check_fault(&self, point: FaultPoint) -> Result<(), StoreError> {
        if self.faults.contains(&point) {
            warn!("Injected store fault triggered at {:?}", point);
            return Err(StoreError::Injected(point));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingTx for InMemoryTx {
    async fn lock_route(&mut self, id: Uuid) -> Result<Option<Route>, StoreError> {
        Ok(self.staged.routes.get(&id).cloned())
    }

    async fn lock_ticket(&mut self, id: Uuid) -> Result<Option<Ticket>, StoreError> {
        Ok(self.staged.tickets.get(&id).cloned())
    }

    async fn get_bus(&mut self, id: Uuid) -> Result<Option<Bus>, StoreError> {
        Ok(self.staged.buses.get(&id).cloned())
    }

    async fn get_payment(&mut self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.staged.payments.get(&id).cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        self.check_fault(FaultPoint::InsertPayment)?;
        self.staged.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<(), StoreError> {
        self.check_fault(FaultPoint::InsertTicket)?;
        self.staged.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn update_ticket_status(
        &mut self,
        id: Uuid,
        status: TicketStatus,
        payment_status: PaymentStatus,
    ) -> Result<Ticket, StoreError> {
        let ticket = self
            .staged
            .tickets
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "ticket", id })?;

        ticket.status = status;
        ticket.payment_status = payment_status;
        Ok(ticket.clone())
    }

    async fn record_refund(&mut self, payment_id: Uuid, amount: i64) -> Result<Payment, StoreError> {
        let payment = self
            .staged
            .payments
            .get_mut(&payment_id)
            .ok_or(StoreError::NotFound { entity: "payment", id: payment_id })?;

        payment.refunded_amount += amount;
        payment.status = payment.status_after_refunds();
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn adjust_seats(&mut self, route_id: Uuid, delta: i32) -> Result<Route, StoreError> {
        self.check_fault(FaultPoint::AdjustSeats)?;

        let route = self
            .staged
            .routes
            .get(&route_id)
            .ok_or(StoreError::NotFound { entity: "route", id: route_id })?;
        let total_seats = self
            .staged
            .buses
            .get(&route.bus_id)
            .map(|b| b.total_seats)
            .ok_or(StoreError::NotFound { entity: "bus", id: route.bus_id })?;

        let next = route.available_seats.checked_add(delta);
        match next {
            Some(seats) if (0..=total_seats).contains(&seats) => {
                let route = self
                    .staged
                    .routes
                    .get_mut(&route_id)
                    .ok_or(StoreError::NotFound { entity: "route", id: route_id })?;
                route.available_seats = seats;
                route.updated_at = Utc::now();
                Ok(route.clone())
            }
            _ => Err(StoreError::SeatBoundsViolated { route_id, delta }),
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.check_fault(FaultPoint::Commit)?;

        let InMemoryTx { mut guard, staged, commits, .. } = self;
        *guard = staged;
        commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
