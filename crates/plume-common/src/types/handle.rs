use crate::error::AtStrError;
use regex::Regex;
use smol_str::SmolStr;
use std::sync::LazyLock;

/// A domain-name handle such as `alice.bsky.social`, stored lowercase.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(SmolStr);

/// Regex for handle validation per AT Protocol spec.
pub static HANDLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$")
        .unwrap()
});

/// Normalize user input into handle form: trimmed, no leading `@`, lowercase.
///
/// Does not validate; use [`Handle::new`] for that.
pub fn normalize_handle(input: &str) -> String {
    let trimmed = input.trim();
    trimmed
        .strip_prefix('@')
        .unwrap_or(trimmed)
        .trim_start()
        .to_lowercase()
}

impl Handle {
    /// Fallible constructor. Normalizes (see [`normalize_handle`]) then validates.
    pub fn new(handle: impl AsRef<str>) -> Result<Self, AtStrError> {
        let normalized = normalize_handle(handle.as_ref());
        if normalized.len() > 253 {
            Err(AtStrError::new("handle", &normalized, "longer than 253 bytes"))
        } else if !HANDLE_REGEX.is_match(&normalized) {
            Err(AtStrError::new("handle", &normalized, "does not match handle syntax"))
        } else {
            Ok(Self(SmolStr::new(normalized)))
        }
    }

    /// Whether the handle ends with the given domain suffix (`.example.com` or `example.com`).
    pub fn has_suffix(&self, suffix: &str) -> bool {
        let suffix = suffix.trim_start_matches('.').to_lowercase();
        self.0 == suffix || self.0.ends_with(&format!(".{suffix}"))
    }
}

string_newtype!(Handle);
