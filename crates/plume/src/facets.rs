//! Rich-text facets: detection in plain text and mention resolution.

use std::sync::LazyLock;

use plume_common::record::{ByteSlice, Facet, FacetFeature};
use plume_common::types::{DID_REGEX, Did, HANDLE_REGEX, Handle};
use plume_identity::resolver::IdentityResolver;
use regex::Regex;
use smol_str::SmolStr;

use crate::policy::{FailurePolicy, Operation};

static MENTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s|\()(@)([a-zA-Z0-9.:-]+)(\b)").unwrap());

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|\s|\()(https?://[\S]+)").unwrap());

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    // Excludes invisible and zero-width characters
    Regex::new(r"(^|\s)[#＃]([^\s\x{00AD}\x{2060}\x{200A}\x{200B}\x{200C}\x{200D}]+)").unwrap()
});

static TRAILING_PUNCT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\p{P}+$").unwrap());

const MAX_TAG_LEN: usize = 64;

/// Detect mentions, links and hashtags in `text`.
///
/// Mention features carry the handle as written (without `@`); run them
/// through [`MentionResolver`] before publishing. Facets are ordered by start
/// byte.
pub fn detect_facets(text: &str) -> Vec<Facet> {
    let mut facets = Vec::new();
    facets.extend(detect_mentions(text));
    facets.extend(detect_links(text));
    facets.extend(detect_tags(text));
    facets.sort_by_key(|f| f.index.byte_start);
    facets
}

fn facet(start: usize, end: usize, feature: FacetFeature) -> Facet {
    Facet {
        index: ByteSlice {
            byte_start: start,
            byte_end: end,
        },
        features: vec![feature],
    }
}

fn trimmed_len(s: &str) -> usize {
    TRAILING_PUNCT_REGEX.find(s).map(|m| m.start()).unwrap_or(s.len())
}

fn detect_mentions(text: &str) -> impl Iterator<Item = Facet> + '_ {
    MENTION_REGEX.captures_iter(text).filter_map(|cap| {
        let at_sign = cap.get(2)?;
        let ident = cap.get(3)?;
        let value = ident.as_str().trim_end_matches('.');
        if !HANDLE_REGEX.is_match(value) && !DID_REGEX.is_match(value) {
            return None;
        }
        let end = ident.start() + value.len();
        Some(facet(
            at_sign.start(),
            end,
            FacetFeature::Mention {
                did: SmolStr::new(value),
            },
        ))
    })
}

fn detect_links(text: &str) -> impl Iterator<Item = Facet> + '_ {
    URL_REGEX.captures_iter(text).filter_map(|cap| {
        let m = cap.get(2)?;
        let len = trimmed_len(m.as_str());
        // `https://` alone is not a link
        if len <= "https://".len() {
            return None;
        }
        let uri = &m.as_str()[..len];
        Some(facet(
            m.start(),
            m.start() + len,
            FacetFeature::Link {
                uri: SmolStr::new(uri),
            },
        ))
    })
}

fn detect_tags(text: &str) -> impl Iterator<Item = Facet> + '_ {
    TAG_REGEX.captures_iter(text).filter_map(|cap| {
        let tag = cap.get(2)?;
        let len = trimmed_len(tag.as_str());
        if len == 0 || len > MAX_TAG_LEN {
            return None;
        }
        // The hash sign is the char right before the tag; `＃` is 3 bytes
        let hash_start = text[..tag.start()].char_indices().next_back()?.0;
        Some(facet(
            hash_start,
            tag.start() + len,
            FacetFeature::Tag {
                tag: SmolStr::new(&tag.as_str()[..len]),
            },
        ))
    })
}

/// Resolves handle mentions to DIDs.
#[derive(Clone)]
pub struct MentionResolver<R> {
    resolver: R,
}

impl<R: IdentityResolver + Sync> MentionResolver<R> {
    /// Resolver using `resolver` for handle lookups.
    pub fn new(resolver: R) -> Self {
        Self { resolver }
    }

    /// Replace every handle mention in `facets` with the resolved DID.
    ///
    /// Mentions that are already DIDs are kept. A mention that fails to
    /// resolve keeps its original text and is logged.
    pub async fn resolve(&self, mut facets: Vec<Facet>) -> Vec<Facet> {
        for facet in facets.iter_mut() {
            for feature in facet.features.iter_mut() {
                let FacetFeature::Mention { did } = feature else {
                    continue;
                };
                if Did::looks_like(did.as_str()) {
                    continue;
                }
                let lookup = match Handle::new(did.as_str()) {
                    Ok(handle) => self
                        .resolver
                        .resolve_handle(&handle)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                if let Ok(Some(resolved)) =
                    FailurePolicy::apply(Operation::MentionResolution, lookup)
                {
                    tracing::debug!(handle = %did, did = %resolved, "mention resolved");
                    *did = SmolStr::new(resolved.as_str());
                }
            }
        }
        facets
    }
}
