//! Session state: the pairing of a credential with a user identity.
//!
//! A [`Session`] is replaced wholesale on every transition. Consumers observe
//! transitions through [`SessionTransition`] values delivered by the session
//! store; they never mutate a session in place.

use std::fmt;

use serde::Serialize;

use super::credential::AccessToken;

/// Role value granting administrative access.
pub const ADMIN_ROLE: &str = "admin";

/// Validation errors for [`UserId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdValidationError {
    /// Identifier was blank.
    Empty,
}

impl fmt::Display for UserIdValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "user id must not be empty"),
        }
    }
}

impl std::error::Error for UserIdValidationError {}

/// Identity provider user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap an identifier.
    pub fn new(raw: impl Into<String>) -> Result<Self, UserIdValidationError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(UserIdValidationError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity half of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Provider user id.
    pub id: UserId,
    /// Display name, when the provider knows one.
    pub display_name: Option<String>,
    /// Primary email address.
    pub email: Option<String>,
    /// Whether the provider metadata marks this user as an administrator.
    pub is_admin: bool,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
}

impl UserIdentity {
    /// Identity with only an id; other fields empty.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            display_name: None,
            email: None,
            is_admin: false,
            avatar_url: None,
        }
    }

    /// Attach an email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Attach a display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the role flag from a provider role string.
    #[must_use]
    pub fn with_role(mut self, role: Option<&str>) -> Self {
        self.is_admin = role == Some(ADMIN_ROLE);
        self
    }

    /// Attach an avatar URL.
    #[must_use]
    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    /// Name shown in the UI: display name, falling back to email.
    pub fn label(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.email.as_deref())
    }

    /// Upper-case initials of the label, e.g. `"AL"` for `"Ada Lovelace"`.
    pub fn initials(&self) -> String {
        self.label()
            .map(|label| {
                label
                    .split_whitespace()
                    .filter_map(|part| part.chars().next())
                    .flat_map(char::to_uppercase)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Credential and identity of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSession {
    /// Bearer credential.
    pub token: AccessToken,
    /// Identity the credential belongs to.
    pub user: UserIdentity,
}

/// The live authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    /// Nobody is signed in.
    #[default]
    Empty,
    /// A user is signed in.
    Authenticated(AuthenticatedSession),
}

impl Session {
    /// Build an authenticated session.
    pub fn authenticated(token: AccessToken, user: UserIdentity) -> Self {
        Self::Authenticated(AuthenticatedSession { token, user })
    }

    /// Whether a user is signed in.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Current credential, if any.
    pub fn token(&self) -> Option<&AccessToken> {
        match self {
            Self::Authenticated(session) => Some(&session.token),
            Self::Empty => None,
        }
    }

    /// Current identity, if any.
    pub fn user(&self) -> Option<&UserIdentity> {
        match self {
            Self::Authenticated(session) => Some(&session.user),
            Self::Empty => None,
        }
    }
}

/// Kind of session transition reported by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    /// A user signed in.
    SignedIn,
    /// The credential was rotated for the same user.
    TokenRefreshed,
    /// Identity metadata changed for the same user.
    UserUpdated,
    /// The session was cleared.
    SignedOut,
}

/// One session transition: what happened and the resulting session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTransition {
    /// Transition kind.
    pub kind: SessionEventKind,
    /// Session after the transition.
    pub session: Session,
}

impl SessionTransition {
    /// Sign-in transition.
    pub fn signed_in(session: Session) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            session,
        }
    }

    /// Token refresh transition.
    pub fn token_refreshed(session: Session) -> Self {
        Self {
            kind: SessionEventKind::TokenRefreshed,
            session,
        }
    }

    /// Sign-out transition; always carries the empty session.
    pub fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            session: Session::Empty,
        }
    }
}
