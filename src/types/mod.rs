//! Core data model: fragments, results, usage and request inputs.

pub mod common;
pub mod fragment;
pub mod message;
pub mod result;

pub use common::*;
pub use fragment::*;
pub use message::*;
pub use result::*;
