//! HTTP transport adapters.
//!
//! This module provides the reqwest implementation of the `HttpTransport`
//! port and its backend URL resolution rules.

mod reqwest_transport;

pub use reqwest_transport::{ReqwestTransport, resolve_url};
