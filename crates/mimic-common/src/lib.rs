//! Common utilities for mimic
//!
//! This crate provides the HTTP vocabulary and the JSON codec shared by the
//! mimic backends.

pub mod error;
pub mod http;
pub mod json;

pub use error::{CodecError, CodecResult};
pub use http::{HttpMethod, HttpStatus};
pub use json::JsonOptions;
