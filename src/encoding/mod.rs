//! Wire encoding helpers.

pub mod json;

pub use json::{decode_json, encode_json, snippet};
