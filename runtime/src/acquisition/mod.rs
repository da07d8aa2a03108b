//! HTTP-based acquisition: the static tier and the rule tables it shares
//! with the rendered tier.
//!
//! The browser is only needed when these layers come back incomplete.

pub mod http_client;
pub mod selectors;
pub mod static_fetch;
