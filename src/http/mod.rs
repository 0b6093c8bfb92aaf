//! HTTP plumbing shared by the route modules.

pub mod auth;
pub mod response;

pub use auth::{issue_access_token, AuthUser, Claims};
pub use response::{ApiResponse, Paginated, PaginationMeta, PaginationQuery};
