//! Provider adapters built on the transport core.

pub mod openai_compatible;
