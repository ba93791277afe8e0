//! Reqwest-backed backend transport.
//!
//! This adapter owns transport details only: URL resolution against the
//! configured base, header and body encoding, timeout mapping, and copying the
//! raw response back into the domain shape.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::domain::ports::{HttpTransport, RawResponse, TransportError};
use crate::domain::{Method, RequestDescriptor};

const API_PREFIX: &str = "/api";
const DEFAULT_USER_AGENT: &str = concat!("evlink-client/", env!("CARGO_PKG_VERSION"));

/// Transport sending requests relative to one backend base URL.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Build a transport with an explicit request timeout.
    /// ```rust,ignore
    /// let transport = ReqwestTransport::new(base_url, Duration::from_secs(30))?;
    /// ```
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

/// Resolve a backend-relative `path` and `query` against `base`.
///
/// Slashes between base and path are normalised. When the base already ends
/// in `/api` and the path starts with `/api/`, the duplicate prefix is dropped.
///
/// # Examples
/// ```
/// use evlink_client::outbound::http::resolve_url;
/// use url::Url;
///
/// let base = Url::parse("https://backend.example.com/api/").expect("valid url");
/// let url = resolve_url(&base, "/api/user/subscription-status", &[]);
/// assert_eq!(url.as_str(), "https://backend.example.com/api/user/subscription-status");
/// ```
pub fn resolve_url(base: &Url, path: &str, query: &[(String, String)]) -> Url {
    let base_path = base.path().trim_end_matches('/');
    let relative = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    };
    let relative = match relative.strip_prefix(API_PREFIX) {
        Some(rest) if base_path.ends_with(API_PREFIX) && rest.starts_with('/') => rest.to_owned(),
        _ => relative,
    };

    let mut url = base.clone();
    url.set_path(&format!("{base_path}{relative}"));
    url.set_query(None);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    url
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        let url = resolve_url(&self.base_url, request.path(), request.query());
        let mut builder = self.client.request(to_reqwest_method(request.method()), url);
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_owned());
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();
        let body = response.bytes().await.map_err(map_transport_error)?;

        Ok(RawResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().map(str::to_owned),
            headers,
            body: body.to_vec(),
        })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_transport_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(error.to_string())
    } else if error.is_builder() {
        TransportError::invalid_request(error.to_string())
    } else {
        TransportError::unreachable(error.to_string())
    }
}
