//! Client configuration loaded via OrthoConfig.
//!
//! Raw values arrive as strings from the environment (prefix `EVLINK_`) or a
//! configuration file; [`ClientSettings::validate`] turns them into a
//! [`ClientConfig`] with parsed URLs and durations.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;

use crate::domain::{SignInCredentials, SignInValidationError};

const DEFAULT_LINK_CODE_DIR: &str = ".evlink";

/// Raw configuration values for the EVLink client.
#[derive(Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "EVLINK")]
pub struct ClientSettings {
    /// Backend base URL every request path is resolved against.
    pub base_url: Option<String>,
    /// GoTrue identity service URL.
    pub identity_url: Option<String>,
    /// Anonymous API key sent to the identity service.
    pub identity_anon_key: Option<String>,
    /// Per-request timeout in seconds.
    #[ortho_config(default = 30)]
    pub request_timeout_secs: u64,
    /// Directory holding the one-shot linking code.
    pub link_code_dir: Option<PathBuf>,
    /// Account email used for password sign-in.
    pub email: Option<String>,
    /// Account password used for password sign-in.
    pub password: Option<String>,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("base_url", &self.base_url)
            .field("identity_url", &self.identity_url)
            .field(
                "identity_anon_key",
                &self.identity_anon_key.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("link_code_dir", &self.link_code_dir)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Errors raised while validating [`ClientSettings`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// A required value was not configured.
    #[error("missing configuration value: {field}")]
    Missing {
        /// Setting name without the environment prefix.
        field: &'static str,
    },
    /// A URL value did not parse.
    #[error("invalid URL for {field}: {message}")]
    InvalidUrl {
        /// Setting name without the environment prefix.
        field: &'static str,
        /// Parser message.
        message: String,
    },
    /// A URL used a scheme other than http or https.
    #[error("unsupported URL scheme for {field}: {scheme}")]
    UnsupportedScheme {
        /// Setting name without the environment prefix.
        field: &'static str,
        /// Scheme found in the value.
        scheme: String,
    },
    /// The request timeout was zero.
    #[error("request timeout must be at least one second")]
    ZeroTimeout,
    /// Sign-in credentials were present but unusable.
    #[error(transparent)]
    Credentials(#[from] SignInValidationError),
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL.
    pub base_url: Url,
    /// GoTrue identity service URL.
    pub identity_url: Url,
    /// Anonymous API key for the identity service.
    pub identity_anon_key: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Directory holding the one-shot linking code.
    pub link_code_dir: PathBuf,
}

impl ClientSettings {
    /// Validate raw values into a [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when a required value is missing, a URL does
    /// not parse or uses a non-HTTP scheme, or the timeout is zero.
    pub fn validate(&self) -> Result<ClientConfig, SettingsError> {
        let base_url = parse_url("base_url", self.base_url.as_deref())?;
        let identity_url = parse_url("identity_url", self.identity_url.as_deref())?;
        let identity_anon_key = required("identity_anon_key", self.identity_anon_key.as_deref())?;
        if self.request_timeout_secs == 0 {
            return Err(SettingsError::ZeroTimeout);
        }

        Ok(ClientConfig {
            base_url,
            identity_url,
            identity_anon_key: identity_anon_key.to_owned(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            link_code_dir: self
                .link_code_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LINK_CODE_DIR)),
        })
    }

    /// Build password sign-in credentials from the configured email and
    /// password.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Missing`] when either value is absent and
    /// [`SettingsError::Credentials`] when one is blank.
    pub fn sign_in_credentials(&self) -> Result<SignInCredentials, SettingsError> {
        let email = self
            .email
            .as_deref()
            .ok_or(SettingsError::Missing { field: "email" })?;
        let password = self
            .password
            .as_deref()
            .ok_or(SettingsError::Missing { field: "password" })?;
        Ok(SignInCredentials::try_from_parts(email, password)?)
    }
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, SettingsError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(SettingsError::Missing { field })
}

fn parse_url(field: &'static str, value: Option<&str>) -> Result<Url, SettingsError> {
    let raw = required(field, value)?;
    let url = Url::parse(raw).map_err(|error| SettingsError::InvalidUrl {
        field,
        message: error.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(SettingsError::UnsupportedScheme {
            field,
            scheme: scheme.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for client configuration parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

    const VARS: [&str; 7] = [
        "EVLINK_BASE_URL",
        "EVLINK_IDENTITY_URL",
        "EVLINK_IDENTITY_ANON_KEY",
        "EVLINK_REQUEST_TIMEOUT_SECS",
        "EVLINK_LINK_CODE_DIR",
        "EVLINK_EMAIL",
        "EVLINK_PASSWORD",
    ];

    fn load_from_empty_args() -> ClientSettings {
        ClientSettings::load_from_iter([OsString::from("evlink-client")])
            .expect("config should load")
    }

    fn settings() -> ClientSettings {
        ClientSettings {
            base_url: Some("https://backend.example.com/api".to_owned()),
            identity_url: Some("https://auth.example.com".to_owned()),
            identity_anon_key: Some("anon".to_owned()),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            link_code_dir: None,
            email: None,
            password: None,
        }
    }

    #[rstest]
    fn default_values_are_used_when_missing() {
        let _guard = lock_env(VARS.map(|name| (name, None::<String>)));

        let loaded = load_from_empty_args();
        assert_eq!(loaded.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(loaded.base_url.is_none());
        assert_eq!(
            loaded.validate(),
            Err(SettingsError::Missing { field: "base_url" })
        );
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            ("EVLINK_BASE_URL", Some("https://backend.example.com/api".to_owned())),
            ("EVLINK_IDENTITY_URL", Some("https://auth.example.com".to_owned())),
            ("EVLINK_IDENTITY_ANON_KEY", Some("anon-key".to_owned())),
            ("EVLINK_REQUEST_TIMEOUT_SECS", Some("5".to_owned())),
            ("EVLINK_LINK_CODE_DIR", Some("/tmp/evlink-state".to_owned())),
            ("EVLINK_EMAIL", Some("ada@example.com".to_owned())),
            ("EVLINK_PASSWORD", Some("hunter2".to_owned())),
        ]);

        let loaded = load_from_empty_args();
        let config = loaded.validate().expect("valid config");
        assert_eq!(config.base_url.as_str(), "https://backend.example.com/api");
        assert_eq!(config.identity_anon_key, "anon-key");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.link_code_dir, PathBuf::from("/tmp/evlink-state"));

        let credentials = loaded.sign_in_credentials().expect("credentials");
        assert_eq!(credentials.email(), "ada@example.com");
    }

    #[rstest]
    fn link_code_dir_falls_back_to_the_default() {
        let config = settings().validate().expect("valid config");
        assert_eq!(config.link_code_dir, PathBuf::from(DEFAULT_LINK_CODE_DIR));
    }

    #[rstest]
    #[case::not_a_url("not a url", "InvalidUrl")]
    #[case::wrong_scheme("ftp://files.example.com", "UnsupportedScheme")]
    #[case::blank("   ", "Missing")]
    fn rejects_unusable_base_urls(#[case] raw: &str, #[case] expected: &str) {
        let mut raw_settings = settings();
        raw_settings.base_url = Some(raw.to_owned());

        let error = raw_settings.validate().expect_err("invalid base url");
        let variant = match error {
            SettingsError::InvalidUrl { .. } => "InvalidUrl",
            SettingsError::UnsupportedScheme { .. } => "UnsupportedScheme",
            SettingsError::Missing { .. } => "Missing",
            SettingsError::ZeroTimeout | SettingsError::Credentials(_) => "other",
        };
        assert_eq!(variant, expected);
    }

    #[rstest]
    fn zero_timeout_is_rejected() {
        let mut raw_settings = settings();
        raw_settings.request_timeout_secs = 0;
        assert_eq!(raw_settings.validate(), Err(SettingsError::ZeroTimeout));
    }

    #[rstest]
    fn sign_in_requires_both_values() {
        let mut raw_settings = settings();
        raw_settings.email = Some("ada@example.com".to_owned());
        assert_eq!(
            raw_settings.sign_in_credentials().map(|_| ()),
            Err(SettingsError::Missing { field: "password" })
        );

        raw_settings.password = Some(String::new());
        assert_eq!(
            raw_settings.sign_in_credentials().map(|_| ()),
            Err(SettingsError::Credentials(SignInValidationError::EmptyPassword))
        );
    }

    #[rstest]
    fn debug_output_redacts_secrets() {
        let mut raw_settings = settings();
        raw_settings.password = Some("hunter2".to_owned());
        let rendered = format!("{raw_settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("\"anon\""));
    }
}
