//! Driven port for the one-shot linking code kept in local storage.
//!
//! The code is captured before sign-in (for example from an invitation link)
//! and must be consumed exactly once afterwards. Access is synchronous: the
//! backing store is local and deletion must be possible from a `Drop` guard.

use std::fmt;
use std::sync::Mutex;

use super::define_port_error;

/// Well-known storage key holding the linking code.
pub const LINK_CODE_KEY: &str = "access_code";

/// Validated linking code.
#[derive(Clone, PartialEq, Eq)]
pub struct LinkCode(String);

impl LinkCode {
    /// Wrap a raw code; blank values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    /// Raw code value.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for LinkCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LinkCode(<redacted>)")
    }
}

define_port_error! {
    /// Errors raised by link code storage.
    pub enum LinkCodeStoreError {
        /// The storage medium failed.
        Io { message: String } =>
            "link code storage failed: {message}",
    }
}

/// Port reading and deleting the one-shot linking code.
#[cfg_attr(test, mockall::automock)]
pub trait LinkCodeStore: Send + Sync {
    /// Read the pending code without consuming it.
    fn load(&self) -> Result<Option<LinkCode>, LinkCodeStoreError>;

    /// Persist a code, replacing any pending one.
    fn save(&self, code: &LinkCode) -> Result<(), LinkCodeStoreError>;

    /// Delete the pending code; deleting an absent code succeeds.
    fn remove(&self) -> Result<(), LinkCodeStoreError>;
}

/// Process-memory link code store.
#[derive(Debug, Default)]
pub struct InMemoryLinkCodeStore {
    code: Mutex<Option<LinkCode>>,
}

impl InMemoryLinkCodeStore {
    /// Store pre-loaded with `code`.
    pub fn with_code(code: &str) -> Self {
        Self {
            code: Mutex::new(LinkCode::parse(code)),
        }
    }

    /// Whether a code is still pending.
    pub fn is_pending(&self) -> bool {
        self.code
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

impl LinkCodeStore for InMemoryLinkCodeStore {
    fn load(&self) -> Result<Option<LinkCode>, LinkCodeStoreError> {
        self.code
            .lock()
            .map(|guard| guard.clone())
            .map_err(|err| LinkCodeStoreError::io(err.to_string()))
    }

    fn save(&self, code: &LinkCode) -> Result<(), LinkCodeStoreError> {
        let mut guard = self
            .code
            .lock()
            .map_err(|err| LinkCodeStoreError::io(err.to_string()))?;
        *guard = Some(code.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), LinkCodeStoreError> {
        let mut guard = self
            .code
            .lock()
            .map_err(|err| LinkCodeStoreError::io(err.to_string()))?;
        *guard = None;
        Ok(())
    }
}
