//! Common types for the plume implementation of an atproto client
//!
//! Everything here is owned (`SmolStr`-backed) so values can cross await
//! points and live in shared session state without lifetime juggling.

#![warn(missing_docs)]
pub use smol_str;
pub use url;

/// DID document model and PDS endpoint extraction.
pub mod did_doc;
pub mod error;
/// HTTP client abstraction used by plume crates.
pub mod http_client;
/// Record shapes written to a repository (posts, facets, references).
pub mod record;
pub mod session;
/// Validated identifier strings.
pub mod types;
pub mod xrpc;

pub use types::{AtUri, Did, Handle};

/// Authorization applied by plume itself.
///
/// DPoP-bound requests never show up here; the OAuth SDK signs those.
#[derive(Debug, Clone)]
pub enum AuthorizationToken {
    /// Bearer token (access JWT issued directly by the PDS)
    Bearer(smol_str::SmolStr),
}

impl TryFrom<&AuthorizationToken> for http::HeaderValue {
    type Error = http::header::InvalidHeaderValue;

    fn try_from(token: &AuthorizationToken) -> Result<Self, Self::Error> {
        match token {
            AuthorizationToken::Bearer(t) => http::HeaderValue::from_str(&format!("Bearer {t}")),
        }
    }
}
