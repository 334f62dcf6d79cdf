//! HTTP layer: the transport seam, its reqwest implementation, headers and logging.

pub mod headers;
pub mod logging;
pub mod reqwest_transport;
pub mod transport;

pub use headers::HttpHeaderBuilder;
pub use logging::LoggingTransport;
pub use reqwest_transport::ReqwestTransport;
pub use transport::{ByteStream, HttpRequest, HttpResponse, HttpTransport, RequestBody};
