use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Standard JSON response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Pagination query parameters (`?page=1&limit=10`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PaginationQuery {
    /// Clamped page/limit, as an offset into the result set.
    #[must_use]
    pub fn offset(&self) -> u64 {
        let page = self.page.max(1);
        (page - 1) * self.clamped_limit()
    }

    #[must_use]
    pub fn clamped_limit(&self) -> u64 {
        self.limit.clamp(1, 100)
    }
}

/// Pagination metadata echoed alongside list responses.
#[derive(Debug, Serialize)]
pub struct PaginationMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
}

/// A paginated list payload.
#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub meta: PaginationMeta,
    pub data: Vec<T>,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(query: &PaginationQuery, total: u64, data: Vec<T>) -> Self {
        Self {
            meta: PaginationMeta {
                page: query.page.max(1),
                limit: query.clamped_limit(),
                total,
            },
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_offsets() {
        let q = PaginationQuery { page: 1, limit: 10 };
        assert_eq!(q.offset(), 0);

        let q = PaginationQuery { page: 3, limit: 20 };
        assert_eq!(q.offset(), 40);

        // Page 0 is treated as page 1, limit is clamped.
        let q = PaginationQuery { page: 0, limit: 1000 };
        assert_eq!(q.offset(), 0);
        assert_eq!(q.clamped_limit(), 100);
    }
}
