use crate::error::AtStrError;
use smol_str::SmolStr;

/// A record address: `at://<repo>/<collection>/<rkey>`.
///
/// Only the record form is accepted; plain repo or collection URIs cannot be
/// turned into the `getRecord` parameters reply construction needs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AtUri(SmolStr);

impl AtUri {
    /// Fallible constructor, validates the three path segments.
    pub fn new(uri: impl AsRef<str>) -> Result<Self, AtStrError> {
        let uri = uri.as_ref();
        if uri.len() > 8192 {
            return Err(AtStrError::new("at-uri", uri, "longer than 8192 bytes"));
        }
        let rest = uri
            .strip_prefix("at://")
            .ok_or_else(|| AtStrError::new("at-uri", uri, "missing at:// scheme"))?;
        let mut parts = rest.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(repo), Some(collection), Some(rkey), None)
                if !repo.is_empty() && !collection.is_empty() && !rkey.is_empty() =>
            {
                Ok(Self(SmolStr::new(uri)))
            }
            _ => Err(AtStrError::new(
                "at-uri",
                uri,
                "expected at://<repo>/<collection>/<rkey>",
            )),
        }
    }

    fn segment(&self, idx: usize) -> &str {
        self.0["at://".len()..].split('/').nth(idx).unwrap_or_default()
    }

    /// Repository authority (DID or handle).
    pub fn repo(&self) -> &str {
        self.segment(0)
    }

    /// Collection NSID.
    pub fn collection(&self) -> &str {
        self.segment(1)
    }

    /// Record key.
    pub fn rkey(&self) -> &str {
        self.segment(2)
    }
}

string_newtype!(AtUri);
