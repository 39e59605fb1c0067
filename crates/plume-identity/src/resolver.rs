//! Identity resolution: DID → document through a PLC directory, handle → DID
//! through a public `com.atproto.identity.resolveHandle` endpoint.
//!
//! Nothing is cached. Every call fetches fresh; layer a cache on top if needed.

use std::future::Future;

use bon::Builder;
use http::StatusCode;
use miette::Diagnostic;
use plume_common::did_doc::{DidDocument, PdsEndpointError};
use plume_common::error::{AtStrError, TransportError};
use plume_common::types::{Did, Handle};
use thiserror::Error;
use url::Url;

/// Errors that can occur during identity resolution.
#[derive(Debug, Error, Diagnostic)]
#[allow(missing_docs)]
pub enum IdentityError {
    #[error("unsupported DID method: {0}")]
    #[diagnostic(
        code(plume_identity::unsupported_did_method),
        help("only did:plc identities can be resolved")
    )]
    UnsupportedDidMethod(String),
    #[error("HTTP error: {0}")]
    #[diagnostic(
        code(plume_identity::http),
        help("check network connectivity and TLS configuration")
    )]
    Http(#[from] TransportError),
    #[error("HTTP status {0}")]
    #[diagnostic(
        code(plume_identity::http_status),
        help("the directory or resolver rejected the lookup")
    )]
    HttpStatus(StatusCode),
    #[error("URL parse error: {0}")]
    #[diagnostic(code(plume_identity::url))]
    Url(#[from] url::ParseError),
    #[error("serialize/deserialize error: {0}")]
    #[diagnostic(code(plume_identity::serde))]
    Serde(#[from] serde_json::Error),
    #[error("resolver returned an invalid identifier: {0}")]
    #[diagnostic(code(plume_identity::invalid_identifier))]
    InvalidIdentifier(#[from] AtStrError),
    #[error(transparent)]
    #[diagnostic(transparent)]
    Pds(#[from] PdsEndpointError),
    /// DID document id did not match requested DID
    #[error("DID doc id mismatch: expected {expected}, got {found}")]
    #[diagnostic(
        code(plume_identity::doc_id_mismatch),
        help("document id differs from requested DID; do not trust this document")
    )]
    DocIdMismatch { expected: Did, found: Did },
}

impl IdentityError {
    pub(crate) fn unsupported_did_method(did: &str) -> Self {
        Self::UnsupportedDidMethod(did.to_string())
    }

    pub(crate) fn transport(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Http(TransportError::Other(Box::new(e)))
    }
}

/// Result alias for identity resolution.
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Configurable resolver options.
///
/// - `plc_directory`: base of the PLC directory serving `did:plc` documents.
/// - `handle_resolver`: base of a service answering
///   `com.atproto.identity.resolveHandle` without authentication.
/// - `validate_doc_id`: if true (default), `pds_for_did` rejects documents whose
///   `id` differs from the requested DID.
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct ResolverOptions {
    /// PLC directory base URL
    pub plc_directory: Url,
    /// Public handle resolution base URL
    pub handle_resolver: Url,
    /// Validate that fetched DID document id matches the requested DID
    #[builder(default = true)]
    pub validate_doc_id: bool,
}

/// Default PLC directory.
pub const DEFAULT_PLC_DIRECTORY: &str = "https://plc.directory/";

/// Default public handle resolver.
pub const DEFAULT_HANDLE_RESOLVER: &str = "https://public.api.bsky.app/";

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            plc_directory: Url::parse(DEFAULT_PLC_DIRECTORY).expect("valid url"),
            handle_resolver: Url::parse(DEFAULT_HANDLE_RESOLVER).expect("valid url"),
            validate_doc_id: true,
        }
    }
}

/// Trait for identity resolution, for pluggable implementations.
pub trait IdentityResolver {
    /// Access options for validation decisions in default methods
    fn options(&self) -> &ResolverOptions;

    /// Resolve handle to DID
    fn resolve_handle(&self, handle: &Handle) -> impl Future<Output = Result<Did>> + Send
    where
        Self: Sync;

    /// Fetch the current DID document
    fn resolve_did_doc(&self, did: &Did) -> impl Future<Output = Result<DidDocument>> + Send
    where
        Self: Sync;

    /// Return the single PDS url declared by a DID's document
    fn pds_for_did(&self, did: &Did) -> impl Future<Output = Result<Url>> + Send
    where
        Self: Sync,
    {
        async {
            let doc = self.resolve_did_doc(did).await?;
            if self.options().validate_doc_id && doc.id != *did {
                return Err(IdentityError::DocIdMismatch {
                    expected: did.clone(),
                    found: doc.id,
                });
            }
            Ok(doc.pds_endpoint()?)
        }
    }

    /// Return the DID and PDS url for a handle
    fn pds_for_handle(&self, handle: &Handle) -> impl Future<Output = Result<(Did, Url)>> + Send
    where
        Self: Sync,
    {
        async {
            let did = self.resolve_handle(handle).await?;
            let pds = self.pds_for_did(&did).await?;
            Ok((did, pds))
        }
    }
}

impl<T: IdentityResolver + Sync + Send> IdentityResolver for std::sync::Arc<T> {
    fn options(&self) -> &ResolverOptions {
        self.as_ref().options()
    }

    async fn resolve_handle(&self, handle: &Handle) -> Result<Did> {
        self.as_ref().resolve_handle(handle).await
    }

    async fn resolve_did_doc(&self, did: &Did) -> Result<DidDocument> {
        self.as_ref().resolve_did_doc(did).await
    }
}
