//! Execution layer: HTTP plumbing, request dispatch and error classification.

pub mod continuable;
pub mod dispatcher;
pub mod error_shapes;
pub mod http;

pub use continuable::{GenRequest, Prepared, RequestIssues, ToGenResult};
pub use dispatcher::{Dispatcher, RateLimitParser};
pub use error_shapes::{DecodedError, ErrorShape, ErrorShapes};
