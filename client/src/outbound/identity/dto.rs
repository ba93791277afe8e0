//! DTOs for the GoTrue token and error payloads.
//!
//! The adapter decodes into these transport DTOs first, then maps into a
//! domain [`Session`] in one pass.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::domain::{AccessToken, Session, UserId, UserIdentity};

#[derive(Serialize)]
pub(super) struct PasswordGrantDto<'a> {
    pub(super) email: &'a str,
    pub(super) password: &'a str,
}

#[derive(Serialize)]
pub(super) struct RefreshGrantDto<'a> {
    pub(super) refresh_token: &'a str,
}

#[derive(Deserialize)]
pub(super) struct TokenResponseDto {
    access_token: String,
    refresh_token: String,
    user: UserDto,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: MetadataDto,
    #[serde(default)]
    app_metadata: MetadataDto,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataDto {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

/// Error payload; GoTrue versions disagree on the field carrying the text.
#[derive(Debug, Default, Deserialize)]
pub(super) struct ErrorDto {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ErrorDto {
    pub(super) fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// Session plus the refresh token the adapter keeps to itself.
pub(super) struct IssuedSession {
    pub(super) session: Session,
    pub(super) refresh_token: Zeroizing<String>,
}

impl TokenResponseDto {
    pub(super) fn into_issued_session(self) -> Result<IssuedSession, String> {
        let token = AccessToken::new(self.access_token)
            .map_err(|error| format!("invalid access token: {error}"))?;
        let id = UserId::new(self.user.id).map_err(|error| format!("invalid user id: {error}"))?;
        let metadata = self.user.user_metadata;
        let role = self.user.app_metadata.role.or(metadata.role);

        let mut user = UserIdentity::new(id).with_role(role.as_deref());
        if let Some(email) = self.user.email {
            user = user.with_email(email);
        }
        if let Some(name) = metadata.full_name.or(metadata.name) {
            user = user.with_display_name(name);
        }
        if let Some(avatar) = metadata.avatar_url {
            user = user.with_avatar_url(avatar);
        }

        Ok(IssuedSession {
            session: Session::authenticated(token, user),
            refresh_token: Zeroizing::new(self.refresh_token),
        })
    }
}
