//! Publishing posts and blobs to the current identity's PDS.

use std::collections::BTreeMap;
use std::sync::Arc;

use bon::Builder;
use plume_common::AtUri;
use plume_common::http_client::HttpClient;
use plume_common::record::{
    BlobRef, Facet, POST_COLLECTION, PostRecord, ReplyRef, StrongRef, UploadBlobOutput,
};
use plume_common::types::Did;
use plume_common::xrpc::{CREATE_RECORD, UPLOAD_BLOB};
use plume_identity::resolver::IdentityResolver;
use serde::Serialize;
use serde_json::Value;
use smol_str::SmolStr;
use url::Url;

use crate::error::PublishError;
use crate::facets::MentionResolver;
use crate::fetcher::AuthenticatedFetcher;
use crate::policy::{FailurePolicy, Operation};
use crate::reply::ReplyResolver;

/// A post to publish.
///
/// ```
/// use plume::publisher::NewPost;
/// use plume::facets::detect_facets;
///
/// let text = "hello @alice.example.com";
/// let post = NewPost::new(text).facets(detect_facets(text)).build();
/// assert!(post.reply_to.is_none());
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct NewPost {
    /// Post text
    #[builder(start_fn, into)]
    pub text: String,
    /// Address of the post being replied to
    pub reply_to: Option<AtUri>,
    /// Facets over `text`; mention features may still hold handles
    pub facets: Option<Vec<Facet>>,
    /// Extra record fields (embed, langs, ...). Keys that name a typed post
    /// field are ignored.
    #[builder(default)]
    pub extra: BTreeMap<SmolStr, Value>,
}

#[derive(Serialize)]
struct CreateRecordInput<'a> {
    repo: &'a Did,
    collection: &'a str,
    record: &'a PostRecord,
}

/// Writes records on behalf of the current session.
pub struct ContentPublisher<C, R> {
    fetcher: AuthenticatedFetcher<C>,
    resolver: Arc<R>,
    replies: ReplyResolver<C>,
    mentions: MentionResolver<Arc<R>>,
}

impl<C: Clone, R> Clone for ContentPublisher<C, R> {
    fn clone(&self) -> Self {
        Self {
            fetcher: self.fetcher.clone(),
            resolver: self.resolver.clone(),
            replies: self.replies.clone(),
            mentions: self.mentions.clone(),
        }
    }
}

impl<C, R> ContentPublisher<C, R>
where
    C: HttpClient + Clone + Sync,
    R: IdentityResolver + Send + Sync,
{
    /// Publisher that reads parents from the current PDS or `public_mirror`.
    pub fn new(fetcher: AuthenticatedFetcher<C>, http: C, resolver: Arc<R>, public_mirror: Url) -> Self {
        Self {
            fetcher,
            replies: ReplyResolver::new(http, public_mirror),
            mentions: MentionResolver::new(resolver.clone()),
            resolver,
        }
    }

    async fn pds(&self, sub: &Did) -> Result<Url, PublishError> {
        let pds = self.resolver.pds_for_did(sub).await.map_err(PublishError::Pds);
        FailurePolicy::require(Operation::PdsResolution, pds)
    }

    /// Publish a post and return its `{uri, cid}`.
    ///
    /// The PDS is resolved before anything is sent to it. A reply whose parent
    /// cannot be found fails without creating a record. Mentions that do not
    /// resolve are published as written.
    #[tracing::instrument(skip_all, fields(reply = post.reply_to.is_some()))]
    pub async fn publish(&self, post: NewPost) -> Result<StrongRef, PublishError> {
        let session = self.fetcher.session()?;
        let pds = self.pds(session.sub()).await?;

        let NewPost {
            text,
            reply_to,
            facets,
            extra,
        } = post;
        let mut record = PostRecord::new(text);
        let skipped = record.merge_extra(extra);
        if !skipped.is_empty() {
            tracing::warn!(?skipped, "ignoring extra fields that shadow post fields");
        }

        if let Some(parent) = reply_to {
            let strong = self
                .replies
                .resolve(&pds, &parent)
                .await
                .ok_or(PublishError::ReplyParentNotFound(parent));
            record.reply = Some(ReplyRef::flat(FailurePolicy::require(
                Operation::ReplyResolution,
                strong,
            )?));
        }

        if let Some(facets) = facets {
            record.facets = Some(self.mentions.resolve(facets).await);
        }

        let input = CreateRecordInput {
            repo: session.sub(),
            collection: POST_COLLECTION,
            record: &record,
        };
        let created: StrongRef = FailurePolicy::require(
            Operation::RecordCreation,
            self.fetcher.procedure(&pds, CREATE_RECORD, &input).await,
        )?;
        tracing::info!(uri = %created.uri, cid = %created.cid, "post created");
        Ok(created)
    }

    /// Upload a blob and return the server's reference to it.
    #[tracing::instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub async fn upload_blob(&self, bytes: Vec<u8>, mime_type: &str) -> Result<BlobRef, PublishError> {
        let session = self.fetcher.session()?;
        let pds = self.pds(session.sub()).await?;
        let out: UploadBlobOutput = FailurePolicy::require(
            Operation::BlobUpload,
            self.fetcher.upload(&pds, UPLOAD_BLOB, bytes, mime_type).await,
        )?;
        Ok(out.blob)
    }
}
