//! Bearer credentials issued by the identity provider.
//!
//! Tokens are opaque: nothing in this crate inspects their expiry. Validity is
//! only discovered when a backend call answers `401`.

use std::fmt;

use zeroize::Zeroizing;

/// Validation errors raised when constructing an [`AccessToken`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialValidationError {
    /// Token was empty once trimmed.
    Empty,
    /// Token contained whitespace and cannot be sent as a bearer value.
    ContainsWhitespace,
}

impl fmt::Display for CredentialValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "access token must not be empty"),
            Self::ContainsWhitespace => write!(f, "access token must not contain whitespace"),
        }
    }
}

impl std::error::Error for CredentialValidationError {}

/// Opaque bearer token.
///
/// ## Invariants
/// - Non-empty and free of whitespace.
/// - Memory is zeroized on drop and `Debug` output never reveals the value.
///
/// # Examples
/// ```
/// use evlink_client::domain::AccessToken;
///
/// let token = AccessToken::new("tok2").expect("valid token");
/// assert_eq!(token.bearer(), "Bearer tok2");
/// assert_eq!(format!("{token:?}"), "AccessToken(<redacted>)");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(Zeroizing<String>);

impl AccessToken {
    /// Validate and wrap a raw token string.
    pub fn new(raw: impl Into<String>) -> Result<Self, CredentialValidationError> {
        let raw = Zeroizing::new(raw.into());
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CredentialValidationError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(CredentialValidationError::ContainsWhitespace);
        }
        Ok(Self(Zeroizing::new(trimmed.to_owned())))
    }

    /// Raw token value.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// `Authorization` header value carrying this token.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.as_str())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Validation errors raised for primary sign-in credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInValidationError {
    /// Email was missing or blank once trimmed.
    EmptyEmail,
    /// Password was blank.
    EmptyPassword,
}

impl fmt::Display for SignInValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyEmail => write!(f, "email must not be empty"),
            Self::EmptyPassword => write!(f, "password must not be empty"),
        }
    }
}

impl std::error::Error for SignInValidationError {}

/// Email and password used for a password grant.
///
/// ## Invariants
/// - `email` is trimmed and non-empty.
/// - `password` is non-empty and keeps caller-provided whitespace.
#[derive(Clone, PartialEq, Eq)]
pub struct SignInCredentials {
    email: String,
    password: Zeroizing<String>,
}

impl SignInCredentials {
    /// Validate raw email/password inputs.
    pub fn try_from_parts(email: &str, password: &str) -> Result<Self, SignInValidationError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(SignInValidationError::EmptyEmail);
        }
        if password.is_empty() {
            return Err(SignInValidationError::EmptyPassword);
        }
        Ok(Self {
            email: email.to_owned(),
            password: Zeroizing::new(password.to_owned()),
        })
    }

    /// Email address.
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Password.
    pub fn password(&self) -> &str {
        self.password.as_str()
    }
}

impl fmt::Debug for SignInCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}
