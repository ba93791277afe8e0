//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **http**: reqwest-backed [`crate::domain::ports::HttpTransport`]
//! - **identity**: GoTrue (Supabase Auth) REST identity provider
//! - **link_code**: cap-std file store for the one-shot linking code
//!
//! Adapters translate between wire formats and domain types and contain no
//! request-retry or session logic.

pub mod http;
pub mod identity;
pub mod link_code;
