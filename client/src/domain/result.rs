//! The normalized success/error envelope returned by every network call.
//!
//! No error ever crosses this boundary as a Rust `Err`: transport failures,
//! non-2xx responses and decode failures all become [`ErrorInfo`] values
//! inside a [`NormalizedResult`].

use std::fmt;

use serde::{Serialize, Serializer};

/// Status reported when no HTTP response was received.
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

const UNAUTHORIZED: u16 = 401;
const FORBIDDEN: u16 = 403;

/// Failure category carried by [`ErrorInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request never produced a response.
    Transport,
    /// The backend answered with a non-2xx status.
    Http,
    /// A 2xx JSON body did not match the expected shape.
    Decode,
    /// The client failed before sending or after receiving, e.g. encoding a
    /// body or writing local state. No network fault is implied.
    Local,
}

/// Human-readable failure description plus the transport status code.
///
/// # Examples
/// ```
/// use evlink_client::domain::{ErrorInfo, FailureKind};
///
/// let err = ErrorInfo::http(401, "Invalid token");
/// assert!(err.is_unauthorized());
/// assert_eq!(err.kind(), FailureKind::Http);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    message: String,
    status: u16,
    kind: FailureKind,
}

impl ErrorInfo {
    /// Transport-level failure; status is always `0`.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: TRANSPORT_FAILURE_STATUS,
            kind: FailureKind::Transport,
        }
    }

    /// Non-2xx response.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            kind: FailureKind::Http,
        }
    }

    /// Body decode failure for a response with `status`.
    pub fn decode(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            kind: FailureKind::Decode,
        }
    }

    /// Client-side failure unrelated to the network; status is `0`.
    pub fn local(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: TRANSPORT_FAILURE_STATUS,
            kind: FailureKind::Local,
        }
    }

    /// Message suitable for display.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// HTTP status, or `0` when no response was involved.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Failure category.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Whether the backend rejected the credential.
    pub fn is_unauthorized(&self) -> bool {
        self.kind == FailureKind::Http && self.status == UNAUTHORIZED
    }

    /// Whether the backend refused access; consumers usually treat this as
    /// "feature not available" rather than an error banner.
    pub fn is_forbidden(&self) -> bool {
        self.kind == FailureKind::Http && self.status == FORBIDDEN
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.message, self.status)
    }
}

/// Uniform outcome of one request.
///
/// `Success(None)` is a 2xx response without a JSON payload; callers must
/// tolerate missing data on success. `data` and `error` are never populated
/// together.
///
/// Serializes to the `{ "data": ..., "error": ... }` envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResult<T> {
    /// 2xx response, with the decoded payload when one was present.
    Success(Option<T>),
    /// Transport, HTTP or decode failure.
    Failure(ErrorInfo),
}

impl<T> NormalizedResult<T> {
    /// Success with a payload.
    pub fn data_of(data: T) -> Self {
        Self::Success(Some(data))
    }

    /// Success without a payload.
    pub fn empty() -> Self {
        Self::Success(None)
    }

    /// Failure.
    pub fn failure(error: ErrorInfo) -> Self {
        Self::Failure(error)
    }

    /// Payload, when the call succeeded with one.
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => data.as_ref(),
            Self::Failure(_) => None,
        }
    }

    /// Failure details, when the call failed.
    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Success(_) => None,
            Self::Failure(error) => Some(error),
        }
    }

    /// Whether the call succeeded (with or without payload).
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Failure status, `None` on success.
    pub fn error_status(&self) -> Option<u16> {
        self.error().map(ErrorInfo::status)
    }

    /// Whether the call failed with `401`.
    pub fn is_unauthorized(&self) -> bool {
        self.error().is_some_and(ErrorInfo::is_unauthorized)
    }

    /// Consume into the payload.
    pub fn into_data(self) -> Option<T> {
        match self {
            Self::Success(data) => data,
            Self::Failure(_) => None,
        }
    }

    /// Consume into a standard `Result`.
    pub fn into_result(self) -> Result<Option<T>, ErrorInfo> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Failure(error) => Err(error),
        }
    }

    /// Transform the payload, keeping failures untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> NormalizedResult<U> {
        match self {
            Self::Success(data) => NormalizedResult::Success(data.map(f)),
            Self::Failure(error) => NormalizedResult::Failure(error),
        }
    }
}

impl<T> From<Result<Option<T>, ErrorInfo>> for NormalizedResult<T> {
    fn from(value: Result<Option<T>, ErrorInfo>) -> Self {
        match value {
            Ok(data) => Self::Success(data),
            Err(error) => Self::Failure(error),
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    data: Option<&'a T>,
    error: Option<&'a ErrorInfo>,
}

impl<T: Serialize> Serialize for NormalizedResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Envelope {
            data: self.data(),
            error: self.error(),
        }
        .serialize(serializer)
    }
}
