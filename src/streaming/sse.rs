//! Server-sent event decoding.
//!
//! Turns a response body into a lazy stream of typed packets. Framing is done
//! line by line so that lines which are not `data:` records are still visible:
//! some servers report errors mid-stream as a bare JSON line.

use crate::encoding::decode_json;
use crate::error::LlmError;
use crate::execution::error_shapes::{DecodedError, ErrorShapes};
use crate::execution::http::ByteStream;
use futures::{Stream, StreamExt};
use futures_util::TryStreamExt;
use serde::de::DeserializeOwned;
use std::io;
use std::pin::Pin;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

/// A stream of decoded packets. Ends after the first error.
pub type PacketStream<T> = Pin<Box<dyn Stream<Item = Result<T, LlmError>> + Send>>;

const DONE: &str = "[DONE]";
const MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// How packets and inline errors are decoded.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Drop unknown packet fields instead of failing.
    pub lenient: bool,
    /// Shapes tried when a line is not a packet.
    pub error_shapes: ErrorShapes,
}

enum Line<'a> {
    Skip,
    Done,
    Data(&'a str),
    Other,
}

fn classify(line: &str) -> Line<'_> {
    if line.is_empty() || line.starts_with(':') {
        return Line::Skip;
    }
    if let Some(payload) = line.strip_prefix("data:") {
        let payload = payload.trim_start();
        return match payload {
            "" => Line::Skip,
            DONE => Line::Done,
            _ => Line::Data(payload),
        };
    }
    if ["event:", "id:", "retry:"].iter().any(|p| line.starts_with(p)) {
        return Line::Skip;
    }
    Line::Other
}

/// Decode `body` as an event stream of `T` packets.
///
/// The stream is forward-only: it ends at `[DONE]`, at the end of the body, or
/// after yielding the first error.
pub fn decode_stream<T>(body: ByteStream, options: DecodeOptions) -> PacketStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let reader = StreamReader::new(body.map_err(io::Error::other));
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    Box::pin(async_stream::stream! {
        while let Some(next) = lines.next().await {
            let raw = match next {
                Ok(raw) => raw,
                Err(e) => {
                    yield Err(read_error(e));
                    return;
                }
            };
            let line = raw.trim();
            match classify(line) {
                Line::Skip => continue,
                Line::Done => {
                    tracing::trace!("event stream done");
                    return;
                }
                Line::Data(payload) => {
                    let bytes = payload.as_bytes();
                    // Decode strictly first: a lenient decode would turn an error
                    // record into an empty packet.
                    let decoded = match decode_json::<T>(bytes, false) {
                        Ok(packet) => Ok(packet),
                        Err(err) => match options.error_shapes.decode(bytes) {
                            Some(api) => Err(inline_api_error(api)),
                            None if options.lenient => decode_json::<T>(bytes, true),
                            None => Err(err),
                        },
                    };
                    match decoded {
                        Ok(packet) => yield Ok(packet),
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
                Line::Other => {
                    match options.error_shapes.decode(line.as_bytes()) {
                        Some(api) => yield Err(inline_api_error(api)),
                        None => {
                            yield Err(LlmError::StreamError(format!(
                                "unexpected line, expected \"data: \", got {line:?}"
                            )))
                        }
                    }
                    return;
                }
            }
        }
    })
}

// The HTTP status was already 200, so only the payload can say otherwise.
fn inline_api_error(err: DecodedError) -> LlmError {
    let code = if err.indicates_rate_limit() {
        429
    } else {
        err.status_hint.unwrap_or(200)
    };
    err.into_api_error(code)
}

fn read_error(err: LinesCodecError) -> LlmError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            LlmError::StreamError(format!("event line longer than {MAX_LINE_LEN} bytes"))
        }
        LinesCodecError::Io(io_err) => {
            let described = io_err.to_string();
            match io_err.into_inner().map(|inner| inner.downcast::<LlmError>()) {
                Some(Ok(llm)) => *llm,
                _ => LlmError::StreamError(format!("failed to read server response: {described}")),
            }
        }
    }
}
