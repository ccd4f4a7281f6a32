#![allow(dead_code)]

use async_trait::async_trait;
use busline::models::{Bus, Route};
use busline::services::email::TemplateRenderer;
use busline::services::gateway::{
    ChargeOutcome, ChargeRequest, GatewayCredential, GatewayError, PaymentGateway,
};
use busline::services::store::InMemoryBookingStore;
use busline::services::ticket::TicketService;
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_CREDENTIAL: &str = "sk_test_busline";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behaviour {
    Approve,
    Decline,
    /// Answers, but reports the charge as not completed.
    Incomplete,
    Hang(std::time::Duration),
}

/// Scripted gateway that remembers every call it receives.
pub struct RecordingGateway {
    charge: Mutex<Behaviour>,
    refund: Mutex<Behaviour>,
    pub charges: Mutex<Vec<ChargeRequest>>,
    pub refunds: Mutex<Vec<(String, i64)>>,
    pub credentials: Mutex<Vec<String>>,
}

impl RecordingGateway {
    pub fn new(charge: Behaviour, refund: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            charge: Mutex::new(charge),
            refund: Mutex::new(refund),
            charges: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
        })
    }

    pub fn approving() -> Arc<Self> {
        Self::new(Behaviour::Approve, Behaviour::Approve)
    }

    pub fn set_refund(&self, behaviour: Behaviour) {
        *self.refund.lock().unwrap() = behaviour;
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }

    pub fn charged_amounts(&self) -> Vec<i64> {
        self.charges.lock().unwrap().iter().map(|c| c.amount).collect()
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }

    pub fn refunds(&self) -> Vec<(String, i64)> {
        self.refunds.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn charge(
        &self,
        request: &ChargeRequest,
        credential: &GatewayCredential,
    ) -> Result<ChargeOutcome, GatewayError> {
        self.charges.lock().unwrap().push(request.clone());
        self.credentials.lock().unwrap().push(credential.expose().to_string());

        let behaviour = *self.charge.lock().unwrap();
        match behaviour {
            Behaviour::Approve => Ok(ChargeOutcome {
                success: true,
                transaction_ref: format!("pi_{}", Uuid::new_v4().simple()),
            }),
            Behaviour::Decline => Err(GatewayError::Declined("card_declined".to_string())),
            Behaviour::Incomplete => Ok(ChargeOutcome {
                success: false,
                transaction_ref: format!("pi_{}", Uuid::new_v4().simple()),
            }),
            Behaviour::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ChargeOutcome {
                    success: true,
                    transaction_ref: "pi_late".to_string(),
                })
            }
        }
    }

    async fn refund(
        &self,
        transaction_ref: &str,
        credential: &GatewayCredential,
        amount: i64,
    ) -> Result<bool, GatewayError> {
        self.refunds.lock().unwrap().push((transaction_ref.to_string(), amount));
        self.credentials.lock().unwrap().push(credential.expose().to_string());

        let behaviour = *self.refund.lock().unwrap();
        match behaviour {
            Behaviour::Approve => Ok(true),
            Behaviour::Decline => Err(GatewayError::Declined("refund_failed".to_string())),
            Behaviour::Incomplete => Ok(false),
            Behaviour::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(true)
            }
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub struct Fixture {
    pub store: InMemoryBookingStore,
    pub gateway: Arc<RecordingGateway>,
    pub service: TicketService<InMemoryBookingStore>,
    pub bus: Bus,
    pub route: Route,
}

pub fn bus(total_seats: i32) -> Bus {
    Bus {
        id: Uuid::new_v4(),
        number: "017 AA 02".to_string(),
        total_seats,
    }
}

pub fn route_for(bus: &Bus, available_seats: i32, price: i64, departs_in: Duration) -> Route {
    let now = Utc::now();
    Route {
        id: Uuid::new_v4(),
        departure: "Almaty".to_string(),
        destination: "Astana".to_string(),
        start_date: now + departs_in,
        end_date: now + departs_in + Duration::hours(12),
        available_seats,
        bus_id: bus.id,
        price,
        created_at: now,
        updated_at: now,
    }
}

pub async fn fixture_with(
    available_seats: i32,
    total_seats: i32,
    price: i64,
    departs_in: Duration,
    gateway: Arc<RecordingGateway>,
) -> Fixture {
    let store = InMemoryBookingStore::new();
    let bus = bus(total_seats);
    let route = route_for(&bus, available_seats, price, departs_in);

    store.seed_bus(bus.clone()).await;
    store.seed_route(route.clone()).await;

    let service = TicketService::new(
        store.clone(),
        gateway.clone(),
        GatewayCredential::new(TEST_CREDENTIAL),
        TemplateRenderer::new().unwrap(),
    )
    .with_gateway_timeout(std::time::Duration::from_secs(2));

    Fixture {
        store,
        gateway,
        service,
        bus,
        route,
    }
}

/// A route leaving in three days with an approving gateway.
pub async fn fixture(available_seats: i32, total_seats: i32, price: i64) -> Fixture {
    fixture_with(
        available_seats,
        total_seats,
        price,
        Duration::days(3),
        RecordingGateway::approving(),
    )
    .await
}

pub async fn seats_left(fixture: &Fixture) -> i32 {
    use busline::services::store::BookingStore;

    fixture
        .store
        .get_route(fixture.route.id)
        .await
        .unwrap()
        .unwrap()
        .available_seats
}
