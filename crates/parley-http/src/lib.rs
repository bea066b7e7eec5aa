//! parley-http: HTTP backend transport for parley
//!
//! Implements the `parley_core::Backend` contract against the chat server's
//! REST API, including the chunked-text chat stream with cancellation.

mod client;

pub use client::{HttpBackend, DEFAULT_BASE_URL};
