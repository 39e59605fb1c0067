use crate::types::AtUri;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::BTreeMap;

/// Collection NSID for posts.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Collection NSID for the profile record (`rkey = self`).
pub const PROFILE_COLLECTION: &str = "app.bsky.actor.profile";

/// Record fields owned by [`PostRecord`]; caller extras may not replace them.
pub const RESERVED_POST_FIELDS: &[&str] = &["$type", "text", "createdAt", "reply", "facets"];

/// `app.bsky.feed.post` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    /// Record type, always [`POST_COLLECTION`]
    #[serde(rename = "$type")]
    pub record_type: SmolStr,
    /// Post text
    pub text: String,
    /// RFC 3339 creation timestamp
    pub created_at: String,
    /// Reply references, absent for root posts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    /// Rich-text annotations over `text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Vec<Facet>>,
    /// Caller-supplied extra fields (embeds, langs, labels, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<SmolStr, Value>,
}

impl PostRecord {
    /// Base record stamped with the current time.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            record_type: SmolStr::new_static(POST_COLLECTION),
            text: text.into(),
            created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            reply: None,
            facets: None,
            extra: BTreeMap::new(),
        }
    }

    /// Merge extra fields, skipping any that would shadow a typed field.
    ///
    /// Returns the names of the skipped keys.
    pub fn merge_extra(&mut self, extra: BTreeMap<SmolStr, Value>) -> Vec<SmolStr> {
        let mut skipped = Vec::new();
        for (key, value) in extra {
            if RESERVED_POST_FIELDS.contains(&key.as_str()) {
                skipped.push(key);
            } else {
                self.extra.insert(key, value);
            }
        }
        skipped
    }
}

/// Reference to a specific version of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    /// Record address
    pub uri: AtUri,
    /// Content fingerprint of the referenced version
    pub cid: SmolStr,
}

/// Reply references of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    /// First post of the thread
    pub root: StrongRef,
    /// Post being replied to
    pub parent: StrongRef,
}

impl ReplyRef {
    /// Flat reply: `root` and `parent` are both the given post.
    pub fn flat(parent: StrongRef) -> Self {
        Self {
            root: parent.clone(),
            parent,
        }
    }
}

/// Rich-text annotation over a byte range of the post text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    /// UTF-8 byte range
    pub index: ByteSlice,
    /// What the range means
    pub features: Vec<FacetFeature>,
}

/// UTF-8 byte range, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    /// Start byte (inclusive)
    pub byte_start: usize,
    /// End byte (exclusive)
    pub byte_end: usize,
}

/// A facet feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    /// Mention of an account. `did` holds a raw handle until resolved.
    #[serde(rename = "app.bsky.richtext.facet#mention")]
    Mention {
        /// Resolved DID, or the original handle text when unresolved
        did: SmolStr,
    },
    /// Hyperlink
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link {
        /// Target URI
        uri: SmolStr,
    },
    /// Hashtag, without the leading `#`
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag {
        /// Tag text
        tag: SmolStr,
    },
}

/// Opaque blob reference returned by `uploadBlob`.
///
/// Never built locally; embed it verbatim into a later record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(pub Value);

/// Output of `com.atproto.repo.uploadBlob`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadBlobOutput {
    /// The stored blob
    pub blob: BlobRef,
}

/// Output of `com.atproto.repo.getRecord`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetRecordOutput {
    /// Record address
    pub uri: AtUri,
    /// Content fingerprint, absent on some mirrors for deleted records
    #[serde(default)]
    pub cid: Option<SmolStr>,
    /// The record body
    #[serde(default)]
    pub value: Value,
}
