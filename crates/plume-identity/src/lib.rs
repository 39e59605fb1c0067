//! Identity resolution for Plume
//!
//! Resolves `did:plc` identities to their DID documents through a PLC
//! directory, and handles to DIDs through a public `resolveHandle` endpoint.
//! The document's single PDS service entry is where the identity's records live.
//!
//! ## Quick start
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use plume_identity::{PublicResolver, resolver::IdentityResolver};
//! use plume_common::types::Handle;
//!
//! let resolver = PublicResolver::default();
//! let did = resolver.resolve_handle(&Handle::new("alice.bsky.social")?).await?;
//! let pds = resolver.pds_for_did(&did).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Customization
//!
//! ```
//! use plume_identity::PlumeResolver;
//! use plume_identity::resolver::ResolverOptions;
//!
//! let opts = ResolverOptions::new()
//!     .plc_directory(url::Url::parse("http://localhost:2582/").unwrap())
//!     .handle_resolver(url::Url::parse("http://localhost:2583/").unwrap())
//!     .build();
//! let resolver = PlumeResolver::new(reqwest::Client::new(), opts);
//! ```

#![warn(missing_docs)]
pub mod resolver;

use crate::resolver::{IdentityError, IdentityResolver, ResolverOptions};
use http::{Method, Request};
use plume_common::did_doc::DidDocument;
use plume_common::http_client::HttpClient;
use plume_common::types::{Did, Handle};
use plume_common::xrpc::{CallOptions, RESOLVE_HANDLE, query_request};
use serde::Deserialize;
use url::Url;

/// Default resolver implementation over any [`HttpClient`].
#[derive(Clone)]
pub struct PlumeResolver<C> {
    http: C,
    opts: ResolverOptions,
}

#[derive(Deserialize)]
struct ResolveHandleOutput {
    did: Did,
}

impl<C> PlumeResolver<C> {
    /// Create a resolver with all options up front
    pub fn new(http: C, opts: ResolverOptions) -> Self {
        tracing::debug!(
            plc_directory = %opts.plc_directory,
            handle_resolver = %opts.handle_resolver,
            validate_doc_id = opts.validate_doc_id,
            "plume resolver created"
        );
        Self { http, opts }
    }

    /// `<plc-directory>/<percent-encoded did>`.
    pub fn plc_url(&self, did: &Did) -> resolver::Result<Url> {
        if did.method() != "plc" {
            return Err(IdentityError::unsupported_did_method(did.as_str()));
        }
        let base = self.opts.plc_directory.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!(
            "{base}/{}",
            urlencoding::encode(did.as_str())
        ))?)
    }
}

impl<C: HttpClient> PlumeResolver<C> {
    async fn get_json_bytes(&self, request: Request<Vec<u8>>) -> resolver::Result<Vec<u8>> {
        let resp = self
            .http
            .send_http(request)
            .await
            .map_err(IdentityError::transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(IdentityError::HttpStatus(status));
        }
        Ok(resp.into_body())
    }
}

impl<C: HttpClient + Sync> IdentityResolver for PlumeResolver<C> {
    fn options(&self) -> &ResolverOptions {
        &self.opts
    }

    #[tracing::instrument(level = "debug", skip(self), fields(handle = %handle))]
    async fn resolve_handle(&self, handle: &Handle) -> resolver::Result<Did> {
        let request = query_request(
            &self.opts.handle_resolver,
            RESOLVE_HANDLE,
            &[("handle", handle.as_str())],
            &CallOptions::default(),
        )?;
        let body = self.get_json_bytes(request).await?;
        let out: ResolveHandleOutput = serde_json::from_slice(&body)?;
        Ok(out.did)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(did = %did))]
    async fn resolve_did_doc(&self, did: &Did) -> resolver::Result<DidDocument> {
        let url = self.plc_url(did)?;
        let request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(http::header::ACCEPT, "application/json")
            .body(Vec::new())
            .map_err(IdentityError::transport)?;
        let body = self.get_json_bytes(request).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Resolver against the public network over reqwest.
#[cfg(feature = "reqwest-client")]
pub type PublicResolver = PlumeResolver<reqwest::Client>;

#[cfg(feature = "reqwest-client")]
impl Default for PublicResolver {
    /// Build a resolver with a reqwest HTTP client and the public PLC directory
    fn default() -> Self {
        PlumeResolver::new(reqwest::Client::new(), ResolverOptions::default())
    }
}
