//! `x-ratelimit-*` response headers.

use crate::types::{RateLimit, RateLimitKind};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::HeaderMap;

/// Read the request and token windows from OpenAI style headers.
///
/// A window is reported only when its limit header holds a positive number.
/// Reset values are relative durations such as `6m0s` or `20ms`, resolved
/// against `now`.
pub fn parse_rate_limits(headers: &HeaderMap, now: DateTime<Utc>) -> Vec<RateLimit> {
    [
        (RateLimitKind::Requests, "requests"),
        (RateLimitKind::Tokens, "tokens"),
    ]
    .into_iter()
    .filter_map(|(kind, suffix)| {
        let limit = parse_count(headers, &format!("x-ratelimit-limit-{suffix}"))?;
        if limit == 0 {
            return None;
        }
        let remaining =
            parse_count(headers, &format!("x-ratelimit-remaining-{suffix}")).unwrap_or(0);
        let reset = header_str(headers, &format!("x-ratelimit-reset-{suffix}"))
            .and_then(parse_duration)
            .and_then(|after| now.checked_add_signed(after));
        Some(RateLimit {
            kind,
            limit,
            remaining,
            reset,
        })
    })
    .collect()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

fn parse_count(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name)?.parse().ok()
}

/// Parse a duration like `1h2m3.5s`, `20ms` or a bare number of seconds.
fn parse_duration(s: &str) -> Option<TimeDelta> {
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<f64>() {
        return seconds(secs);
    }
    let mut total = 0.0;
    let mut rest = s;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let value: f64 = rest[..split].parse().ok()?;
        rest = &rest[split..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            "ns" => 1e-9,
            _ => return None,
        };
        total += value * scale;
        rest = &rest[unit_len..];
    }
    seconds(total)
}

fn seconds(secs: f64) -> Option<TimeDelta> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let nanos = (secs * 1e9).round();
    if nanos > i64::MAX as f64 {
        return None;
    }
    Some(TimeDelta::nanoseconds(nanos as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn both_windows_are_read() {
        let h = headers(&[
            ("x-ratelimit-limit-requests", "500"),
            ("x-ratelimit-remaining-requests", "499"),
            ("x-ratelimit-reset-requests", "120ms"),
            ("x-ratelimit-limit-tokens", "30000"),
            ("x-ratelimit-remaining-tokens", "29950"),
            ("x-ratelimit-reset-tokens", "6m0s"),
        ]);
        let limits = parse_rate_limits(&h, now());
        assert_eq!(
            limits,
            vec![
                RateLimit {
                    kind: RateLimitKind::Requests,
                    limit: 500,
                    remaining: 499,
                    reset: Some(now() + TimeDelta::milliseconds(120)),
                },
                RateLimit {
                    kind: RateLimitKind::Tokens,
                    limit: 30000,
                    remaining: 29950,
                    reset: Some(now() + TimeDelta::minutes(6)),
                },
            ]
        );
    }

    #[test]
    fn missing_or_zero_limit_skips_the_window() {
        let h = headers(&[
            ("x-ratelimit-remaining-requests", "3"),
            ("x-ratelimit-limit-tokens", "0"),
        ]);
        assert!(parse_rate_limits(&h, now()).is_empty());
        assert!(parse_rate_limits(&HeaderMap::new(), now()).is_empty());
    }

    #[test]
    fn unreadable_reset_is_dropped() {
        let h = headers(&[
            ("x-ratelimit-limit-requests", "10"),
            ("x-ratelimit-reset-requests", "soon"),
        ]);
        let limits = parse_rate_limits(&h, now());
        assert_eq!(limits.len(), 1);
        assert_eq!(limits[0].remaining, 0);
        assert_eq!(limits[0].reset, None);
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("1s"), Some(TimeDelta::seconds(1)));
        assert_eq!(parse_duration("20ms"), Some(TimeDelta::milliseconds(20)));
        assert_eq!(parse_duration("1h2m3.5s"), Some(TimeDelta::milliseconds(3_723_500)));
        assert_eq!(parse_duration("2.5"), Some(TimeDelta::milliseconds(2500)));
        assert_eq!(parse_duration("0s"), Some(TimeDelta::zero()));
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration("m"), None);
        assert_eq!(parse_duration("-1s"), None);
        assert_eq!(parse_duration(""), None);
    }
}
