//! Retry classification and backoff.
//!
//! [`RetryPolicy::decide`] is a pure function of the attempt outcome, the
//! cancellation state and the attempt index. The retrying transport only acts
//! on the decision.

use crate::defaults;
use crate::error::{LlmError, is_retryable_status};
use crate::execution::http::HttpResponse;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `backoff`, then replay the request.
    Retry { backoff: Duration },
    /// Hand the outcome to the caller unchanged.
    Stop,
}

/// Retry budget and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Replays allowed after the first attempt.
    pub retry_count: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: defaults::retry::RETRY_COUNT,
        }
    }
}

impl RetryPolicy {
    pub const fn new(retry_count: u32) -> Self {
        Self { retry_count }
    }

    /// A policy that never replays.
    pub const fn none() -> Self {
        Self { retry_count: 0 }
    }

    /// Decide what follows attempt number `attempt` (0 for the first replay).
    pub fn decide(
        &self,
        attempt: u32,
        cancelled: bool,
        outcome: &Result<HttpResponse, LlmError>,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        if attempt >= self.retry_count || !should_retry(cancelled, outcome) {
            return RetryDecision::Stop;
        }
        let retry_after = outcome
            .as_ref()
            .ok()
            .and_then(|resp| resp.header(RETRY_AFTER.as_str()));
        RetryDecision::Retry {
            backoff: backoff(attempt, retry_after, now),
        }
    }
}

/// Whether a failed attempt is worth replaying.
///
/// Permanent transport kinds, non-retryable statuses and anything observed
/// after cancellation stop immediately.
pub fn should_retry(cancelled: bool, outcome: &Result<HttpResponse, LlmError>) -> bool {
    if cancelled {
        return false;
    }
    match outcome {
        Ok(resp) => is_retryable_status(resp.status),
        Err(LlmError::Transport(e)) => !e.kind.is_permanent(),
        Err(_) => false,
    }
}

/// The wait before replay `attempt`: `Retry-After` when present, `2^attempt` seconds otherwise.
pub fn backoff(attempt: u32, retry_after: Option<&str>, now: DateTime<Utc>) -> Duration {
    retry_after
        .and_then(|value| parse_retry_after(value, now))
        .unwrap_or_else(|| Duration::from_secs(2u64.saturating_pow(attempt)))
}

/// Parse a `Retry-After` value: delta-seconds or an HTTP-date.
///
/// Negative deltas and dates in the past clamp to zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Some(Duration::from_secs(secs.max(0) as u64));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (date.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;
    use chrono::TimeZone;
    use reqwest::header::{HeaderMap, HeaderValue};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap()
    }

    fn response(status: u16, retry_after: Option<&'static str>) -> Result<HttpResponse, LlmError> {
        let mut headers = HeaderMap::new();
        if let Some(v) = retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from_static(v));
        }
        Ok(HttpResponse::from_bytes(status, headers, ""))
    }

    #[test]
    fn retry_after_seconds_overrides_exponential_backoff() {
        let policy = RetryPolicy::new(3);
        let decision = policy.decide(2, false, &response(429, Some("5")), now());
        assert_eq!(
            decision,
            RetryDecision::Retry {
                backoff: Duration::from_secs(5)
            }
        );
    }

    #[test]
    fn exponential_backoff_without_header() {
        for attempt in 0..6 {
            assert_eq!(
                backoff(attempt, None, now()),
                Duration::from_secs(1 << attempt)
            );
        }
        // Uncapped, and never overflows.
        assert_eq!(backoff(10, None, now()), Duration::from_secs(1024));
        assert_eq!(backoff(200, None, now()), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn retry_after_http_date() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now()),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now()),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("-3", now()), Some(Duration::ZERO));
        assert_eq!(parse_retry_after("soon", now()), None);
    }

    #[test]
    fn only_gateway_and_rate_limit_statuses_retry() {
        let policy = RetryPolicy::new(3);
        for status in [429, 502, 503, 504] {
            assert!(matches!(
                policy.decide(0, false, &response(status, None), now()),
                RetryDecision::Retry { .. }
            ));
        }
        for status in [200, 400, 401, 404, 500] {
            assert_eq!(
                policy.decide(0, false, &response(status, None), now()),
                RetryDecision::Stop
            );
        }
    }

    #[test]
    fn permanent_transport_errors_stop() {
        let policy = RetryPolicy::new(3);
        let permanent = Err(LlmError::transport(
            TransportErrorKind::UntrustedCertificate,
            "bad cert",
        ));
        assert_eq!(policy.decide(0, false, &permanent, now()), RetryDecision::Stop);

        let transient = Err(LlmError::transport(TransportErrorKind::Connect, "refused"));
        assert_eq!(
            policy.decide(1, false, &transient, now()),
            RetryDecision::Retry {
                backoff: Duration::from_secs(2)
            }
        );
    }

    #[test]
    fn cancellation_and_budget_stop() {
        let policy = RetryPolicy::new(2);
        assert_eq!(
            policy.decide(0, true, &response(503, None), now()),
            RetryDecision::Stop
        );
        assert_eq!(
            policy.decide(2, false, &response(503, None), now()),
            RetryDecision::Stop
        );
        assert_eq!(
            RetryPolicy::none().decide(0, false, &response(503, None), now()),
            RetryDecision::Stop
        );
    }
}
