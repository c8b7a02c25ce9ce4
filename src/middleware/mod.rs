pub mod error_handling;
pub mod ip_rate_limiter;
pub mod metrics;
pub mod request_id;

pub use error_handling::*;
pub use ip_rate_limiter::*;
pub use metrics::*;
pub use request_id::*;
