//! Retry layer
//! - policy.rs: retry classification and backoff computation
//! - transport.rs: the `HttpTransport` wrapper that replays requests

pub mod policy;
pub mod transport;

pub use policy::*;
pub use transport::RetryingTransport;
