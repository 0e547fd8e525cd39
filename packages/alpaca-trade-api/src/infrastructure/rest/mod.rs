//! REST Request Engine
//!
//! Async ([`RestClient`]) and blocking ([`BlockingRestClient`]) engines that
//! share request construction, response classification, retry budgeting,
//! endpoint builders, and pagination.

mod blocking;
mod client;
pub mod endpoints;
pub mod pagination;
mod request;
mod retry;

pub use blocking::BlockingRestClient;
pub use client::RestClient;
pub use endpoints::{ActivityQuery, ApiCall, DataQuery, OrderQuery, PortfolioHistoryQuery};
pub use pagination::{BlockingPages, PageCursor};
pub use request::{ApiPrefix, DATA_API_VERSION, RequestSpec, Target, auth_headers};
pub use retry::{ErrorCategory, RATE_LIMITED, RetryBudget, classify};
