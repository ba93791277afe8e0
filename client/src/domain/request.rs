//! Transport-agnostic request descriptors.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// `Content-Type` header name.
pub const CONTENT_TYPE: &str = "Content-Type";
/// `Authorization` header name.
pub const AUTHORIZATION: &str = "Authorization";
/// JSON media type sent on every request.
pub const APPLICATION_JSON: &str = "application/json";

/// HTTP method supported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Upper-case method name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported method name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method: {0}")]
pub struct UnsupportedMethod(pub String);

impl FromStr for Method {
    type Err = UnsupportedMethod;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            _ => Err(UnsupportedMethod(raw.to_owned())),
        }
    }
}

/// One outbound request: method, backend-relative path, optional serialized
/// body and headers.
///
/// Header names are matched case-insensitively; setting a header replaces any
/// existing value with the same name.
///
/// # Examples
/// ```
/// use evlink_client::domain::{Method, RequestDescriptor};
///
/// let request = RequestDescriptor::get("/user/42/subscription")
///     .with_header("X-Trace", "abc");
/// assert_eq!(request.method(), Method::Get);
/// assert_eq!(request.header("x-trace"), Some("abc"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<String>,
    headers: Vec<(String, String)>,
}

impl RequestDescriptor {
    /// Request with no body or headers.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
        }
    }

    /// `GET` request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// `POST` request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// `PATCH` request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// `PUT` request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    /// `DELETE` request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Attach an already serialized body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `payload` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the serializer error when `payload` cannot be encoded.
    pub fn with_json<B: Serialize + ?Sized>(self, payload: &B) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(payload)?;
        Ok(self.with_body(body))
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a header, replacing any value with the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Set a header only when the caller has not provided one.
    #[must_use]
    pub fn with_default_header(self, name: &str, value: &str) -> Self {
        if self.header(name).is_some() {
            self
        } else {
            self.with_header(name, value)
        }
    }

    /// Set a header in place, replacing any value with the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    /// Remove a header by name.
    pub fn remove_header(&mut self, name: &str) {
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
    }

    /// Method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Backend-relative path.
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Query parameters in insertion order.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Serialized body.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Headers in insertion order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("get", Method::Get)]
    #[case(" PATCH ", Method::Patch)]
    #[case("Delete", Method::Delete)]
    fn parses_methods_case_insensitively(#[case] raw: &str, #[case] expected: Method) {
        assert_eq!(raw.parse::<Method>(), Ok(expected));
    }

    #[rstest]
    fn rejects_unknown_methods() {
        assert!("TRACE".parse::<Method>().is_err());
    }

    #[rstest]
    fn header_replacement_ignores_case() {
        let request = RequestDescriptor::get("/me")
            .with_header("authorization", "Bearer a")
            .with_header("Authorization", "Bearer b");
        assert_eq!(request.headers().len(), 1);
        assert_eq!(request.header("AUTHORIZATION"), Some("Bearer b"));
    }

    #[rstest]
    fn default_header_keeps_caller_value() {
        let request = RequestDescriptor::post("/x")
            .with_header("content-type", "text/csv")
            .with_default_header(CONTENT_TYPE, APPLICATION_JSON);
        assert_eq!(request.header(CONTENT_TYPE), Some("text/csv"));
    }

    #[rstest]
    fn json_body_is_serialized_once() {
        let request = RequestDescriptor::post("/api/public/access-code/use")
            .with_json(&json!({ "code": "abc", "user_id": "42" }))
            .expect("serializable payload");
        let body: serde_json::Value =
            serde_json::from_str(request.body().expect("body present")).expect("valid JSON");
        assert_eq!(body, json!({ "code": "abc", "user_id": "42" }));
    }
}
