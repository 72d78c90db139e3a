//! Quality-control execution backend.

mod http;
mod rate_limiter;
mod traits;
mod types;

pub use http::HttpQcExecutor;
pub use rate_limiter::{PollRateLimiter, RateLimitStatus, TokenBucket};
pub use traits::QcExecutor;
pub use types::{QcError, QcOutcome, QcPoll};
