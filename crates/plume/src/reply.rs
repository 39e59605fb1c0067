//! Resolve a reply parent's content fingerprint.

use plume_common::AtUri;
use plume_common::http_client::HttpClient;
use plume_common::record::{GetRecordOutput, StrongRef};
use plume_common::xrpc::{GET_RECORD, XrpcExt};
use url::Url;

/// Looks up `{uri, cid}` for a parent record.
///
/// Tries the given PDS first, then the public mirror. Neither call is
/// authenticated.
#[derive(Clone)]
pub struct ReplyResolver<C> {
    http: C,
    public_mirror: Url,
}

impl<C: HttpClient + Sync> ReplyResolver<C> {
    /// Resolver falling back to `public_mirror`.
    pub fn new(http: C, public_mirror: Url) -> Self {
        Self {
            http,
            public_mirror,
        }
    }

    /// Strong reference to `uri`, or `None` when no source knows its `cid`.
    #[tracing::instrument(level = "debug", skip(self), fields(uri = %uri))]
    pub async fn resolve(&self, pds: &Url, uri: &AtUri) -> Option<StrongRef> {
        for base in [pds, &self.public_mirror] {
            match self.fetch(base, uri).await {
                Ok(Some(strong)) => return Some(strong),
                Ok(None) => tracing::debug!(source = %base, "record has no cid"),
                Err(e) => tracing::debug!(source = %base, error = %e, "getRecord failed"),
            }
        }
        tracing::warn!(uri = %uri, "reply parent not found on PDS or mirror");
        None
    }

    async fn fetch(
        &self,
        base: &Url,
        uri: &AtUri,
    ) -> plume_common::error::XrpcResult<Option<StrongRef>> {
        let out: GetRecordOutput = self
            .http
            .xrpc(base.clone())
            .query(
                GET_RECORD,
                &[
                    ("repo", uri.repo()),
                    ("collection", uri.collection()),
                    ("rkey", uri.rkey()),
                ],
            )
            .await?;
        Ok(out.cid.map(|cid| StrongRef {
            uri: uri.clone(),
            cid,
        }))
    }
}
