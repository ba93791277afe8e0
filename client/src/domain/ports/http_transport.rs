//! Driven port performing one raw HTTP exchange with the backend.
//!
//! The transport knows nothing about credentials or result normalization;
//! [`crate::domain::SafeFetch`] turns its raw output into a
//! [`crate::domain::NormalizedResult`].

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::request::RequestDescriptor;

/// Raw response as received from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Canonical reason phrase, e.g. `Unauthorized`.
    pub status_text: Option<String>,
    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Undecoded body bytes.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Response with a status and body and no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: None,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Attach the reason phrase.
    #[must_use]
    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    /// Attach a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

define_port_error! {
    /// Failures raised before a response was received.
    pub enum TransportError {
        /// Connection, DNS or I/O failure.
        Unreachable { message: String } =>
            "backend unreachable: {message}",
        /// The request exceeded the configured timeout.
        Timeout { message: String } =>
            "backend request timed out: {message}",
        /// The request could not be built (for example an invalid URL).
        InvalidRequest { message: String } =>
            "request could not be built: {message}",
    }
}

/// Port sending one request and returning the raw response.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform exactly one network exchange.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use evlink_client::domain::RequestDescriptor;
    /// use evlink_client::domain::ports::HttpTransport;
    ///
    /// let response = transport.send(&RequestDescriptor::get("/me")).await?;
    /// assert!(response.is_success());
    /// ```
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError>;
}
