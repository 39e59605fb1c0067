use crate::error::AtStrError;
use regex::Regex;
use smol_str::SmolStr;
use std::sync::LazyLock;

/// A decentralized identifier, e.g. `did:plc:ewvi7nxzyoun6zhxrhs64oiz`.
///
/// Validation follows the atproto DID syntax; it does not check that the
/// method is one this crate can resolve.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Did(SmolStr);

/// Regex for DID validation per AT Protocol spec.
pub static DID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^did:[a-z]+:[a-zA-Z0-9._:%-]*[a-zA-Z0-9._-]$").unwrap());

impl Did {
    /// Fallible constructor, validates. Accepts an `at://` prefixed DID.
    pub fn new(did: impl AsRef<str>) -> Result<Self, AtStrError> {
        let did = did.as_ref();
        let did = did.strip_prefix("at://").unwrap_or(did);
        if did.len() > 2048 {
            Err(AtStrError::new("did", did, "longer than 2048 bytes"))
        } else if !DID_REGEX.is_match(did) {
            Err(AtStrError::new("did", did, "does not match did syntax"))
        } else {
            Ok(Self(SmolStr::new(did)))
        }
    }

    /// The method segment (`plc`, `web`, ...).
    pub fn method(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    /// Whether this looks like a DID at all, without full validation.
    ///
    /// Mention facets use this prefix test to decide whether a value still
    /// needs handle resolution.
    pub fn looks_like(value: &str) -> bool {
        value.starts_with("did:")
    }
}

string_newtype!(Did);
