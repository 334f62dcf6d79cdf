//! Default Configuration Values
//!
//! Centralized defaults for the HTTP layer, retries and streaming.

use std::time::Duration;

/// HTTP client defaults
pub mod http {
    use super::*;

    /// Default request timeout.
    ///
    /// Generation calls can take tens of seconds before the first byte arrives.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default timeout for establishing a connection.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default User-Agent string.
    pub const USER_AGENT: &str = concat!("genwire/", env!("CARGO_PKG_VERSION"));

    /// Maximum number of redirects followed before giving up.
    pub const MAX_REDIRECTS: usize = 10;

    /// Maximum idle connections kept per host.
    pub const MAX_IDLE_PER_HOST: usize = 10;
}

/// Retry defaults
pub mod retry {
    /// Replays attempted after the first failure.
    pub const RETRY_COUNT: u32 = 10;
}

/// Streaming defaults
pub mod streaming {
    /// Capacity of the packet channel between the decoder and the accumulator.
    pub const PACKET_BUFFER: usize = 16;

    /// Capacity of the fragment channel handed to the caller.
    pub const FRAGMENT_BUFFER: usize = 16;
}
