//! Identity provider adapters.
//!
//! This module provides a thin GoTrue REST implementation of the
//! `IdentityProvider` port.

mod dto;
mod gotrue;

pub use gotrue::GoTrueIdentityProvider;
