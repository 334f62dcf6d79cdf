//! Strict JSON decoding with unknown-field discovery.
//!
//! Wire types that should catch schema drift derive `Deserialize` with
//! `#[serde(deny_unknown_fields)]`. When such a decode fails, the body is parsed a
//! second time as a `serde_json::Value` and the offending fields are removed one by
//! one, so the error can name every one of them (or, in lenient mode, so the value
//! can still be decoded).

use crate::error::LlmError;
use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_path_to_error::Segment;

const MAX_UNKNOWN_FIELDS: usize = 64;
const SNIPPET_LEN: usize = 256;

/// Decode `bytes` into `T`.
///
/// In strict mode unknown fields are an [`LlmError::UnknownFields`] naming each of
/// them by path. In lenient mode they are dropped with a debug log.
pub fn decode_json<T: DeserializeOwned>(bytes: &[u8], lenient: bool) -> Result<T, LlmError> {
    let first = match serde_json::from_slice::<T>(bytes) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };
    let type_name = std::any::type_name::<T>();
    let Ok(mut value) = serde_json::from_slice::<Value>(bytes) else {
        return Err(parse_error(type_name, &first, bytes));
    };

    let mut unknown = Vec::new();
    while unknown.len() < MAX_UNKNOWN_FIELDS {
        match serde_path_to_error::deserialize::<_, T>(&value) {
            Ok(decoded) => {
                if unknown.is_empty() || lenient {
                    if !unknown.is_empty() {
                        tracing::debug!(type_name, fields = ?unknown, "ignored unknown fields");
                    }
                    return Ok(decoded);
                }
                return Err(LlmError::UnknownFields {
                    type_name,
                    fields: unknown,
                });
            }
            Err(e) => {
                let Some(name) = unknown_field_name(e.inner()) else {
                    return Err(parse_error(type_name, e.inner(), bytes));
                };
                let segments: Vec<&Segment> = e.path().iter().collect();
                let parent = parent_segments(&segments, &name);
                if !remove_field(&mut value, parent, &name) {
                    return Err(parse_error(type_name, e.inner(), bytes));
                }
                unknown.push(field_path(parent, &name));
            }
        }
    }
    Err(LlmError::UnknownFields {
        type_name,
        fields: unknown,
    })
}

/// Serialize a request body.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, LlmError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| LlmError::InternalError(format!("failed to encode request: {e}")))
}

/// A printable, bounded excerpt of a raw body for error messages.
pub fn snippet(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.chars().count() <= SNIPPET_LEN {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(SNIPPET_LEN).collect();
    out.push_str("...");
    out
}

fn parse_error(type_name: &str, err: &serde_json::Error, bytes: &[u8]) -> LlmError {
    LlmError::ParseError(format!(
        "failed to decode {type_name}: {err}; body: {}",
        snippet(bytes)
    ))
}

// serde reports unknown fields as "unknown field `name`, expected ...".
fn unknown_field_name(err: &serde_json::Error) -> Option<String> {
    let msg = err.to_string();
    let rest = msg.strip_prefix("unknown field `")?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

// The reported path may or may not end with the rejected key itself.
fn parent_segments<'a>(segments: &'a [&'a Segment], name: &str) -> &'a [&'a Segment] {
    match segments.split_last() {
        Some((Segment::Map { key }, parent)) if key == name => parent,
        _ => segments,
    }
}

fn remove_field(root: &mut Value, parent: &[&Segment], name: &str) -> bool {
    let mut cur = root;
    for seg in parent {
        let next = match seg {
            Segment::Seq { index } => cur.get_mut(*index),
            Segment::Map { key } => cur.get_mut(key.as_str()),
            Segment::Enum { variant } => cur.get_mut(variant.as_str()),
            _ => None,
        };
        match next {
            Some(v) => cur = v,
            None => return false,
        }
    }
    cur.as_object_mut()
        .is_some_and(|obj| obj.remove(name).is_some())
}

fn field_path(parent: &[&Segment], name: &str) -> String {
    let mut out = String::new();
    for seg in parent {
        match seg {
            Segment::Seq { index } => out.push_str(&format!("[{index}]")),
            Segment::Map { key } => push_key(&mut out, key),
            Segment::Enum { variant } => push_key(&mut out, variant),
            _ => push_key(&mut out, "?"),
        }
    }
    push_key(&mut out, name);
    out
}

fn push_key(out: &mut String, key: &str) {
    if !out.is_empty() {
        out.push('.');
    }
    out.push_str(key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Inner {
        #[serde(default)]
        content: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Outer {
        #[serde(default)]
        id: String,
        #[serde(default)]
        items: Vec<Inner>,
    }

    #[test]
    fn clean_body_decodes() {
        let v: Outer = decode_json(br#"{"id":"a","items":[{"content":"x"}]}"#, false).unwrap();
        assert_eq!(v.items[0].content, "x");
    }

    #[test]
    fn strict_mode_names_every_unknown_field() {
        let body = br#"{"id":"a","extra":1,"items":[{"content":"x","logprobs":null}]}"#;
        let err = decode_json::<Outer>(body, false).unwrap_err();
        match err {
            LlmError::UnknownFields { fields, .. } => {
                assert_eq!(fields.len(), 2);
                assert!(fields.contains(&"extra".to_string()), "{fields:?}");
                assert!(
                    fields.contains(&"items[0].logprobs".to_string()),
                    "{fields:?}"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lenient_mode_drops_unknown_fields() {
        let body = br#"{"id":"a","extra":{"deep":true},"items":[]}"#;
        let v: Outer = decode_json(body, true).unwrap();
        assert_eq!(v.id, "a");
    }

    #[test]
    fn malformed_json_is_a_parse_error_with_the_body() {
        let err = decode_json::<Outer>(b"{not json", false).unwrap_err();
        match err {
            LlmError::ParseError(msg) => assert!(msg.contains("{not json"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn type_mismatch_is_a_parse_error() {
        let err = decode_json::<Outer>(br#"{"id":5}"#, true).unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
    }

    #[test]
    fn snippet_is_bounded() {
        let long = "x".repeat(1000);
        assert!(snippet(long.as_bytes()).len() < 300);
    }
}
