//! Single-attempt request execution with normalized outcomes.
//!
//! `SafeFetch` performs exactly one transport call and folds every outcome
//! into a [`NormalizedResult`]. It never reads the session store; credentials
//! arrive as ordinary headers on the request.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::ports::{HttpTransport, RawResponse, TransportError};
use super::request::{APPLICATION_JSON, CONTENT_TYPE, RequestDescriptor};
use super::result::{ErrorInfo, NormalizedResult};

/// Turns a raw response into a normalized result.
pub type Decoder<T> = fn(RawResponse) -> NormalizedResult<T>;

/// Successful raw download: headers plus undecoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl RawPayload {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Credential-agnostic request executor.
#[derive(Clone)]
pub struct SafeFetch {
    transport: Arc<dyn HttpTransport>,
}

impl SafeFetch {
    /// Build an executor over `transport`.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Perform one call and decode a 2xx JSON body into `T`.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let result: NormalizedResult<Value> =
    ///     safe_fetch.fetch(&RequestDescriptor::get("/me")).await;
    /// if let Some(error) = result.error() {
    ///     eprintln!("{} ({})", error.message(), error.status());
    /// }
    /// ```
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
    ) -> NormalizedResult<T> {
        self.fetch_with(request, decode_json::<T>).await
    }

    /// Perform one call and return the raw 2xx payload.
    pub async fn fetch_raw(&self, request: &RequestDescriptor) -> NormalizedResult<RawPayload> {
        self.fetch_with(request, decode_raw).await
    }

    /// Perform one call and decode a 2xx response with `decoder`.
    pub async fn fetch_with<T>(
        &self,
        request: &RequestDescriptor,
        decoder: Decoder<T>,
    ) -> NormalizedResult<T> {
        let prepared = request
            .clone()
            .with_default_header(CONTENT_TYPE, APPLICATION_JSON);
        match self.transport.send(&prepared).await {
            Ok(response) => {
                debug!(
                    method = %prepared.method(),
                    path = prepared.path(),
                    status = response.status,
                    "backend request completed"
                );
                if response.is_success() {
                    decoder(response)
                } else {
                    NormalizedResult::failure(http_error(&response))
                }
            }
            Err(error) => {
                warn!(
                    method = %prepared.method(),
                    path = prepared.path(),
                    kind = error.variant_name(),
                    %error,
                    "backend request failed before a response"
                );
                NormalizedResult::failure(transport_error(&error))
            }
        }
    }
}

/// Decode a 2xx JSON body; empty or non-JSON bodies are success without data.
pub fn decode_json<T: DeserializeOwned>(response: RawResponse) -> NormalizedResult<T> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return NormalizedResult::empty();
    }
    let Ok(value) = serde_json::from_slice::<Value>(&response.body) else {
        debug!(status = response.status, "2xx response without a JSON body");
        return NormalizedResult::empty();
    };
    match serde_json::from_value::<T>(value) {
        Ok(data) => NormalizedResult::data_of(data),
        Err(error) => NormalizedResult::failure(ErrorInfo::decode(
            response.status,
            format!("unexpected response shape: {error}"),
        )),
    }
}

/// Keep a 2xx body as raw bytes alongside its headers.
pub fn decode_raw(response: RawResponse) -> NormalizedResult<RawPayload> {
    NormalizedResult::data_of(RawPayload {
        headers: response.headers,
        body: response.body,
    })
}

fn transport_error(error: &TransportError) -> ErrorInfo {
    let message = match error {
        TransportError::Unreachable { message }
        | TransportError::Timeout { message }
        | TransportError::InvalidRequest { message } => message.clone(),
    };
    ErrorInfo::transport(message)
}

fn http_error(response: &RawResponse) -> ErrorInfo {
    let message = detail_message(&response.body)
        .or_else(|| {
            response
                .status_text
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| format!("Request failed with status {}", response.status));
    ErrorInfo::http(response.status, message)
}

/// Machine-readable detail from an error body.
///
/// Accepts `{"detail": "..."}`, validation-style `{"detail": [{"msg": "..."}]}`,
/// and `{"message": "..."}` / `{"error": "..."}` payloads.
fn detail_message(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let object = value.as_object()?;
    if let Some(detail) = object.get("detail") {
        match detail {
            Value::String(text) if !text.trim().is_empty() => return Some(text.clone()),
            Value::Array(items) => {
                let messages = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect::<Vec<_>>();
                if !messages.is_empty() {
                    return Some(messages.join("; "));
                }
            }
            _ => {}
        }
    }
    ["message", "error"]
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .find(|text| !text.trim().is_empty())
        .map(str::to_owned)
}
