//! Pagination envelope shared by every list endpoint (§6: "standard
//! pagination `{page, limit, sort, filter}` and response `{data, total,
//! page, limit, totalPages}`").
//!
//! The error envelope lives on [`crate::error::AppError`]'s `IntoResponse`
//! impl rather than here — one JSON shape, one place that builds it. HAL
//! and JSON:API envelope variants had no use here — this platform's
//! clients need none of that — and were dropped in the final trim (see
//! DESIGN.md).

use serde::{Deserialize, Serialize};

/// Query parameters accepted by every list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub sort: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    20
}

impl ListQuery {
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.limit
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    #[serde(rename = "totalPages")]
    pub total_pages: usize,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: usize, query: &ListQuery) -> Self {
        let limit = query.limit.max(1);
        let total_pages = total.div_ceil(limit).max(1);
        Self { data, total, page: query.page.max(1), limit, total_pages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_zero_indexed_from_page_one() {
        let query = ListQuery { page: 1, limit: 20, sort: None, status: None, category: None };
        assert_eq!(query.offset(), 0);
        let query = ListQuery { page: 3, limit: 20, sort: None, status: None, category: None };
        assert_eq!(query.offset(), 40);
    }

    #[test]
    fn total_pages_rounds_up() {
        let query = ListQuery { page: 1, limit: 10, sort: None, status: None, category: None };
        let page: PaginatedResponse<()> = PaginatedResponse::new(vec![], 25, &query);
        assert_eq!(page.total_pages, 3);
    }
}
