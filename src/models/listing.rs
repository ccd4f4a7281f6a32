use super::Ticket;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Column an administrative ticket listing is ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketSort {
    #[default]
    User,
    StartDate,
    Route,
    Price,
    Status,
    PaymentStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// One-based page request. Out-of-range values fall back to the defaults and
/// the page size is capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = match page_size {
            Some(size) if size > 0 => size.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };

        Self { page, page_size }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Serialize)]
pub struct PageInfo {
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Debug, Serialize)]
pub struct TicketPage {
    pub tickets: Vec<Ticket>,
    pub total_count: i64,
    pub page_info: PageInfo,
}

impl TicketPage {
    pub fn new(tickets: Vec<Ticket>, total_count: i64, request: PageRequest) -> Self {
        let total_pages = (total_count + request.page_size - 1) / request.page_size;

        Self {
            tickets,
            total_count,
            page_info: PageInfo {
                page: request.page,
                page_size: request.page_size,
                total_pages,
                has_next: request.page < total_pages,
                has_previous: request.page > 1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults_and_cap() {
        assert_eq!(PageRequest::new(None, None), PageRequest { page: 1, page_size: 10 });
        assert_eq!(PageRequest::new(Some(0), Some(-5)), PageRequest { page: 1, page_size: 10 });
        assert_eq!(PageRequest::new(Some(3), Some(500)).page_size, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn test_page_info() {
        let page = TicketPage::new(vec![], 25, PageRequest::new(Some(2), Some(10)));
        assert_eq!(page.page_info.total_pages, 3);
        assert!(page.page_info.has_next);
        assert!(page.page_info.has_previous);

        let empty = TicketPage::new(vec![], 0, PageRequest::default());
        assert_eq!(empty.page_info.total_pages, 0);
        assert!(!empty.page_info.has_next);
    }

    #[test]
    fn test_sort_parsing() {
        let sort: TicketSort = serde_json::from_str("\"payment_status\"").unwrap();
        assert_eq!(sort, TicketSort::PaymentStatus);
        let order: SortOrder = serde_json::from_str("\"desc\"").unwrap();
        assert_eq!(order, SortOrder::Desc);
    }
}
