mod common;

use busline::models::{PageRequest, SortOrder, Ticket, TicketSort, TicketStatus};
use busline::services::gateway::GatewayCredential;
use common::{fixture, TEST_CREDENTIAL};
use uuid::Uuid;

async fn seed_priced(fx: &common::Fixture, prices: &[i64]) -> Vec<Ticket> {
    let mut seeded = Vec::new();
    for (i, price) in prices.iter().enumerate() {
        let ticket = Ticket::paid(
            Uuid::new_v4(),
            fx.route.id,
            *price,
            &format!("ORD-1700000000-{:04}", i),
            Uuid::new_v4(),
        );
        fx.store.seed_ticket(ticket.clone()).await;
        seeded.push(ticket);
    }
    seeded
}

#[tokio::test]
async fn test_all_tickets_sorted_by_price() {
    let fx = fixture(10, 40, 500).await;
    seed_priced(&fx, &[700, 300, 500, 900]).await;

    let asc = fx
        .service
        .all_tickets(TicketSort::Price, SortOrder::Asc, PageRequest::default())
        .await
        .unwrap();
    let prices: Vec<i64> = asc.tickets.iter().map(|t| t.price).collect();
    assert_eq!(prices, vec![300, 500, 700, 900]);
    assert_eq!(asc.total_count, 4);

    let desc = fx
        .service
        .all_tickets(TicketSort::Price, SortOrder::Desc, PageRequest::default())
        .await
        .unwrap();
    let prices: Vec<i64> = desc.tickets.iter().map(|t| t.price).collect();
    assert_eq!(prices, vec![900, 700, 500, 300]);
}

#[tokio::test]
async fn test_all_tickets_pages_through_results() {
    let fx = fixture(10, 40, 500).await;
    seed_priced(&fx, &[100, 200, 300, 400, 500]).await;

    let second = fx
        .service
        .all_tickets(TicketSort::Price, SortOrder::Asc, PageRequest::new(Some(2), Some(2)))
        .await
        .unwrap();

    let prices: Vec<i64> = second.tickets.iter().map(|t| t.price).collect();
    assert_eq!(prices, vec![300, 400]);
    assert_eq!(second.total_count, 5);
    assert_eq!(second.page_info.total_pages, 3);
    assert!(second.page_info.has_next);
    assert!(second.page_info.has_previous);

    let beyond = fx
        .service
        .all_tickets(TicketSort::Price, SortOrder::Asc, PageRequest::new(Some(9), Some(2)))
        .await
        .unwrap();
    assert!(beyond.tickets.is_empty());
    assert_eq!(beyond.total_count, 5);
}

#[tokio::test]
async fn test_all_cancelled_tickets_spans_users() {
    let fx = fixture(10, 40, 500).await;
    let credential = GatewayCredential::new(TEST_CREDENTIAL);

    let mut cancelled = Vec::new();
    for _ in 0..2 {
        let user_id = Uuid::new_v4();
        let receipt = fx
            .service
            .purchase(user_id, fx.route.id, "pm_card_visa", 2)
            .await
            .unwrap();
        fx.service
            .cancel(user_id, receipt.tickets[0].id, &credential)
            .await
            .unwrap();
        cancelled.push(receipt.tickets[0].id);
    }

    let page = fx.service.all_cancelled_tickets(PageRequest::default()).await.unwrap();

    assert_eq!(page.total_count, 2);
    assert!(page.tickets.iter().all(|t| t.status == TicketStatus::Cancelled));
    let mut ids: Vec<Uuid> = page.tickets.iter().map(|t| t.id).collect();
    ids.sort();
    cancelled.sort();
    assert_eq!(ids, cancelled);

    let all = fx
        .service
        .all_tickets(TicketSort::Status, SortOrder::Asc, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(all.total_count, 4);
    // "approved" sorts before "cancelled".
    assert_eq!(all.tickets[0].status, TicketStatus::Approved);
    assert_eq!(all.tickets[3].status, TicketStatus::Cancelled);
}
