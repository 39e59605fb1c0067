use crate::types::Did;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use url::Url;

/// Service type that marks a Personal Data Server entry.
pub const PDS_SERVICE_TYPE: &str = "AtprotoPersonalDataServer";

/// Fragment id that marks a Personal Data Server entry.
pub const PDS_SERVICE_ID: &str = "#atproto_pds";

/// DID Document representation.
///
/// Only the fields this client reads are modeled explicitly. All other fields
/// are captured in `extra_data` for forward compatibility.
///
/// Example
/// ```
/// use plume_common::did_doc::DidDocument;
/// use serde_json::json;
/// let doc: DidDocument = serde_json::from_value(json!({
///   "id": "did:plc:alice",
///   "alsoKnownAs": ["at://alice.example"],
///   "service": [{"id":"#atproto_pds","type":"AtprotoPersonalDataServer","serviceEndpoint":"https://pds.example"}]
/// })).unwrap();
/// assert_eq!(doc.id.as_str(), "did:plc:alice");
/// assert_eq!(doc.pds_endpoint().unwrap().as_str(), "https://pds.example/");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    /// Document identifier (e.g., `did:plc:...`)
    pub id: Did,

    /// Alternate identifiers for the subject, such as `at://<handle>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub also_known_as: Option<Vec<SmolStr>>,

    /// Verification methods, kept opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<Vec<Value>>,

    /// Services associated with this DID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<Service>>,

    /// Forward-compatible capture of unmodeled fields
    #[serde(flatten)]
    pub extra_data: BTreeMap<SmolStr, Value>,
}

/// Service entry in a DID document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Service id, usually a fragment like `#atproto_pds`
    pub id: SmolStr,
    /// Service type, e.g. `AtprotoPersonalDataServer`
    #[serde(rename = "type")]
    pub r#type: SmolStr,
    /// Endpoint: a URL string, or an object carrying a `url` field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<Value>,
}

impl Service {
    /// Whether this entry declares the subject's PDS, by id fragment or by type.
    pub fn is_pds(&self) -> bool {
        self.id == PDS_SERVICE_ID
            || self.id.ends_with(PDS_SERVICE_ID)
            || self.r#type == PDS_SERVICE_TYPE
    }

    /// Parse the endpoint as a URL.
    pub fn endpoint_url(&self) -> Option<Url> {
        match self.service_endpoint.as_ref()? {
            Value::String(s) => Url::parse(s).ok(),
            Value::Object(obj) => obj
                .get("url")
                .and_then(Value::as_str)
                .and_then(|s| Url::parse(s).ok()),
            _ => None,
        }
    }
}

/// Why a PDS endpoint could not be taken from a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum PdsEndpointError {
    /// No service entry declares a PDS
    #[error("DID document declares no PDS service")]
    #[diagnostic(
        code(plume::did_doc::missing_pds),
        help("the identity must publish an AtprotoPersonalDataServer service entry")
    )]
    Missing,
    /// More than one service entry declares a PDS
    #[error("DID document declares {0} PDS services, expected exactly one")]
    #[diagnostic(code(plume::did_doc::ambiguous_pds))]
    Ambiguous(usize),
    /// The single PDS entry has no usable URL
    #[error("PDS service endpoint is not a valid URL")]
    #[diagnostic(code(plume::did_doc::invalid_pds_url))]
    InvalidUrl,
}

impl DidDocument {
    /// The endpoint of the single PDS service entry.
    ///
    /// Errors when zero or several entries qualify, or the endpoint is not a URL.
    pub fn pds_endpoint(&self) -> Result<Url, PdsEndpointError> {
        let mut pds = self
            .service
            .iter()
            .flatten()
            .filter(|s| s.is_pds());
        let first = pds.next().ok_or(PdsEndpointError::Missing)?;
        let extra = pds.count();
        if extra > 0 {
            return Err(PdsEndpointError::Ambiguous(extra + 1));
        }
        first.endpoint_url().ok_or(PdsEndpointError::InvalidUrl)
    }
}
