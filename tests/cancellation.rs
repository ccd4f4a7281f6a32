mod common;

use busline::errors::BookingError;
use busline::models::{Payment, PaymentRecordStatus, PaymentStatus, Ticket, TicketStatus};
use busline::services::gateway::GatewayCredential;
use busline::services::store::{BookingStore, FaultPoint, StoreError};
use chrono::Duration;
use common::{fixture, fixture_with, seats_left, Behaviour, RecordingGateway, TEST_CREDENTIAL};
use uuid::Uuid;

fn credential() -> GatewayCredential {
    GatewayCredential::new(TEST_CREDENTIAL)
}

#[tokio::test]
async fn test_cancel_refunds_ticket_price_and_frees_one_seat() {
    let fx = fixture(3, 40, 500).await;
    let user_id = Uuid::new_v4();
    let receipt = fx
        .service
        .purchase(user_id, fx.route.id, "pm_card_visa", 2)
        .await
        .unwrap();
    assert_eq!(seats_left(&fx).await, 1);

    let ticket = &receipt.tickets[0];
    let cancelled = fx
        .service
        .cancel(user_id, ticket.id, &credential())
        .await
        .unwrap();

    assert_eq!(cancelled.ticket.id, ticket.id);
    assert_eq!(cancelled.ticket.status, TicketStatus::Cancelled);
    assert_eq!(cancelled.ticket.payment_status, PaymentStatus::Refunded);
    assert_eq!(cancelled.route.available_seats, 2);
    assert!(cancelled.message.contains(&ticket.order_number));
    assert!(cancelled.message.contains("Almaty → Astana"));

    assert_eq!(
        fx.gateway.refunds(),
        vec![(receipt.payment.transaction_id.clone(), 500)]
    );
    assert_eq!(seats_left(&fx).await, 2);

    // Half of the batch came back; the payment stays successful.
    let payment = fx.store.get_payment(receipt.payment.id).await.unwrap().unwrap();
    assert_eq!(payment.refunded_amount, 500);
    assert_eq!(payment.status, PaymentRecordStatus::Successful);

    let sibling = fx.store.get_ticket(receipt.tickets[1].id).await.unwrap().unwrap();
    assert_eq!(sibling.status, TicketStatus::Approved);
}

#[tokio::test]
async fn test_cancelling_whole_batch_marks_payment_refunded() {
    let fx = fixture(2, 40, 500).await;
    let user_id = Uuid::new_v4();
    let receipt = fx
        .service
        .purchase(user_id, fx.route.id, "pm_card_visa", 2)
        .await
        .unwrap();

    for ticket in &receipt.tickets {
        fx.service.cancel(user_id, ticket.id, &credential()).await.unwrap();
    }

    let payment = fx.store.get_payment(receipt.payment.id).await.unwrap().unwrap();
    assert_eq!(payment.refunded_amount, 1000);
    assert_eq!(payment.status, PaymentRecordStatus::Refunded);
    assert_eq!(seats_left(&fx).await, 2);
    assert_eq!(fx.gateway.refund_count(), 2);
}

#[tokio::test]
async fn test_second_cancel_is_rejected_without_refunding_again() {
    let fx = fixture(3, 40, 500).await;
    let user_id = Uuid::new_v4();
    let receipt = fx
        .service
        .purchase(user_id, fx.route.id, "pm_card_visa", 1)
        .await
        .unwrap();
    let ticket_id = receipt.tickets[0].id;

    fx.service.cancel(user_id, ticket_id, &credential()).await.unwrap();
    let err = fx
        .service
        .cancel(user_id, ticket_id, &credential())
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::AlreadyCancelled(id) if id == ticket_id));
    assert_eq!(fx.gateway.refund_count(), 1);
    assert_eq!(seats_left(&fx).await, 3);
}

#[tokio::test]
async fn test_only_the_owner_may_cancel() {
    let fx = fixture(3, 40, 500).await;
    let owner = Uuid::new_v4();
    let receipt = fx
        .service
        .purchase(owner, fx.route.id, "pm_card_visa", 1)
        .await
        .unwrap();

    let err = fx
        .service
        .cancel(Uuid::new_v4(), receipt.tickets[0].id, &credential())
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Unauthorized));
    assert_eq!(fx.gateway.refund_count(), 0);
    assert_eq!(seats_left(&fx).await, 2);
}

#[tokio::test]
async fn test_unknown_ticket() {
    let fx = fixture(3, 40, 500).await;
    let missing = Uuid::new_v4();

    let err = fx
        .service
        .cancel(Uuid::new_v4(), missing, &credential())
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::TicketNotFound(id) if id == missing));
}

#[tokio::test]
async fn test_cancellation_closes_a_day_before_departure() {
    let fx = fixture_with(
        3,
        40,
        500,
        Duration::hours(23),
        RecordingGateway::approving(),
    )
    .await;
    let user_id = Uuid::new_v4();
    let receipt = fx
        .service
        .purchase(user_id, fx.route.id, "pm_card_visa", 1)
        .await
        .unwrap();

    let err = fx
        .service
        .cancel(user_id, receipt.tickets[0].id, &credential())
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::CancellationWindowClosed { hours: 24 }));
    assert_eq!(fx.gateway.refund_count(), 0);

    let ticket = fx.store.get_ticket(receipt.tickets[0].id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Approved);
    assert_eq!(ticket.payment_status, PaymentStatus::Paid);
    assert_eq!(seats_left(&fx).await, 2);
    let payment = fx.store.get_payment(receipt.payment.id).await.unwrap().unwrap();
    assert_eq!(payment.refunded_amount, 0);
}

#[tokio::test]
async fn test_failed_refund_keeps_ticket_active() {
    let fx = fixture(3, 40, 500).await;
    let user_id = Uuid::new_v4();
    let receipt = fx
        .service
        .purchase(user_id, fx.route.id, "pm_card_visa", 1)
        .await
        .unwrap();

    for behaviour in [Behaviour::Decline, Behaviour::Incomplete] {
        fx.gateway.set_refund(behaviour);

        let err = fx
            .service
            .cancel(user_id, receipt.tickets[0].id, &credential())
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::RefundFailed(_)), "{:?}", behaviour);
    }

    let ticket = fx.store.get_ticket(receipt.tickets[0].id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Approved);
    assert_eq!(ticket.payment_status, PaymentStatus::Paid);
    assert_eq!(seats_left(&fx).await, 2);

    // Works once the processor recovers.
    fx.gateway.set_refund(Behaviour::Approve);
    fx.service
        .cancel(user_id, receipt.tickets[0].id, &credential())
        .await
        .unwrap();
    assert_eq!(seats_left(&fx).await, 3);
}

#[tokio::test]
async fn test_unpaid_ticket_is_cancelled_without_refund() {
    let fx = fixture(2, 3, 500).await;
    let user_id = Uuid::new_v4();

    let mut ticket = Ticket::paid(user_id, fx.route.id, 500, "ORD-1700000000-0001", Uuid::new_v4());
    ticket.status = TicketStatus::Awaiting;
    ticket.payment_status = PaymentStatus::Pending;
    ticket.payment_id = None;
    fx.store.seed_ticket(ticket.clone()).await;

    let receipt = fx
        .service
        .cancel(user_id, ticket.id, &credential())
        .await
        .unwrap();

    assert_eq!(receipt.ticket.status, TicketStatus::Cancelled);
    assert_eq!(receipt.ticket.payment_status, PaymentStatus::Pending);
    assert_eq!(fx.gateway.refund_count(), 0);
    assert_eq!(seats_left(&fx).await, 3);
}

#[tokio::test]
async fn test_seat_count_never_exceeds_bus_capacity() {
    // Route already shows every seat free, yet a stray ticket exists.
    let fx = fixture(3, 3, 500).await;
    let user_id = Uuid::new_v4();
    let payment = Payment::successful(user_id, 500, "pi_stray", Uuid::new_v4());
    let ticket = Ticket::paid(user_id, fx.route.id, 500, "ORD-1700000000-0002", payment.id);
    fx.store.seed_payment(payment).await;
    fx.store.seed_ticket(ticket.clone()).await;

    let err = fx
        .service
        .cancel(user_id, ticket.id, &credential())
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::PersistenceFailure(_)));
    assert_eq!(seats_left(&fx).await, 3);
    let stored = fx.store.get_ticket(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TicketStatus::Approved);

    // Retrying hits the same bound and still moves no money.
    let err = fx
        .service
        .cancel(user_id, ticket.id, &credential())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::PersistenceFailure(StoreError::SeatBoundsViolated { .. })
    ));
    assert_eq!(fx.gateway.refund_count(), 0);
}

#[tokio::test]
async fn test_commit_failure_after_refund_leaves_ticket_untouched() {
    let fx = fixture(3, 40, 500).await;
    let user_id = Uuid::new_v4();
    let receipt = fx
        .service
        .purchase(user_id, fx.route.id, "pm_card_visa", 1)
        .await
        .unwrap();

    fx.store.inject_fault(FaultPoint::Commit);
    let err = fx
        .service
        .cancel(user_id, receipt.tickets[0].id, &credential())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BookingError::PersistenceFailure(StoreError::Injected(FaultPoint::Commit))
    ));
    // The refund went through; only the local record is missing.
    assert_eq!(fx.gateway.refund_count(), 1);
    assert_eq!(seats_left(&fx).await, 2);
    let ticket = fx.store.get_ticket(receipt.tickets[0].id).await.unwrap().unwrap();
    assert_eq!(ticket.status, TicketStatus::Approved);
    let payment = fx.store.get_payment(receipt.payment.id).await.unwrap().unwrap();
    assert_eq!(payment.refunded_amount, 0);
}

#[tokio::test]
async fn test_explicit_credential_is_used_for_refund() {
    let fx = fixture(3, 40, 500).await;
    let user_id = Uuid::new_v4();
    let receipt = fx
        .service
        .purchase(user_id, fx.route.id, "pm_card_visa", 1)
        .await
        .unwrap();

    fx.service
        .cancel(user_id, receipt.tickets[0].id, &GatewayCredential::new("sk_live_other"))
        .await
        .unwrap();

    let credentials = fx.gateway.credentials.lock().unwrap();
    assert_eq!(credentials.as_slice(), &[TEST_CREDENTIAL.to_string(), "sk_live_other".to_string()]);
}
