//! Profile hydration for a freshly established session.

use plume_common::error::XrpcResult;
use plume_common::http_client::HttpClient;
use plume_common::record::{GetRecordOutput, PROFILE_COLLECTION};
use plume_common::session::PublicProfile;
use plume_common::types::{Did, Handle};
use plume_common::xrpc::{GET_BLOB, GET_PROFILE, GET_RECORD, RESOLVE_HANDLE, XrpcExt, xrpc_url};
use serde::Deserialize;
use serde_json::Value;
use smol_str::SmolStr;
use url::Url;

use crate::config::LocalDeployment;
use crate::policy::{FailurePolicy, Operation};

#[derive(Deserialize)]
struct ResolvedHandle {
    did: Did,
}

/// `app.bsky.actor.profile` record body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRecord {
    #[serde(default)]
    display_name: Option<SmolStr>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    avatar: Option<Value>,
    #[serde(default)]
    banner: Option<Value>,
    #[serde(default)]
    created_at: Option<String>,
}

/// Content fingerprint inside a blob reference, new (`ref.$link`) or legacy (`cid`) form.
fn blob_cid(blob: &Value) -> Option<&str> {
    blob.get("ref")
        .and_then(|r| r.get("$link"))
        .or_else(|| blob.get("cid"))
        .and_then(Value::as_str)
}

fn blob_url(pds: &Url, did: &Did, blob: &Value) -> Option<String> {
    let cid = blob_cid(blob)?;
    let mut url = xrpc_url(pds, GET_BLOB);
    url.query_pairs_mut()
        .append_pair("did", did.as_str())
        .append_pair("cid", cid);
    Some(url.into())
}

/// Loads the public profile of a subject.
///
/// Accounts on the configured local deployment are read from their own PDS
/// profile record; everyone else from the public directory.
#[derive(Clone)]
pub struct ProfileLoader<C> {
    http: C,
    public_appview: Url,
    local: Option<LocalDeployment>,
}

impl<C: HttpClient + Sync> ProfileLoader<C> {
    /// Loader reading from `public_appview`, preferring `local` when it hosts the account.
    pub fn new(http: C, public_appview: Url, local: Option<LocalDeployment>) -> Self {
        Self {
            http,
            public_appview,
            local,
        }
    }

    /// Profile for `sub`. Never fails; falls back to [`PublicProfile::minimal`].
    #[tracing::instrument(level = "debug", skip(self), fields(sub = %sub))]
    pub async fn load(&self, sub: &Did, handle: Option<&Handle>) -> PublicProfile {
        let identifier = handle.map(Handle::as_str).unwrap_or(sub.as_str());
        let result = match self.local_pds(sub, handle).await {
            Some(pds) => self.local_profile(pds, sub, identifier).await,
            None => self.public_profile(sub).await,
        };
        match FailurePolicy::apply(Operation::ProfileLoad, result) {
            Ok(Some(profile)) => profile,
            _ => PublicProfile::minimal(identifier),
        }
    }

    async fn local_pds(&self, sub: &Did, handle: Option<&Handle>) -> Option<&Url> {
        let local = self.local.as_ref()?;
        let handle = handle?;
        if local.handle_suffixes.iter().any(|s| handle.has_suffix(s)) {
            return Some(&local.pds);
        }
        // Custom-domain handles: ask the local PDS whether it hosts the account
        let probe: XrpcResult<ResolvedHandle> = self
            .http
            .xrpc(local.pds.clone())
            .query(RESOLVE_HANDLE, &[("handle", handle.as_str())])
            .await;
        match probe {
            Ok(resolved) if resolved.did == *sub => Some(&local.pds),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "local handle probe failed");
                None
            }
        }
    }

    async fn local_profile(
        &self,
        pds: &Url,
        sub: &Did,
        identifier: &str,
    ) -> XrpcResult<PublicProfile> {
        let out: GetRecordOutput = self
            .http
            .xrpc(pds.clone())
            .query(
                GET_RECORD,
                &[
                    ("repo", sub.as_str()),
                    ("collection", PROFILE_COLLECTION),
                    ("rkey", "self"),
                ],
            )
            .await?;
        let record: ProfileRecord = serde_json::from_value(out.value)?;
        Ok(PublicProfile {
            handle: SmolStr::new(identifier),
            display_name: record.display_name,
            description: record.description,
            avatar_url: record.avatar.as_ref().and_then(|b| blob_url(pds, sub, b)),
            banner_url: record.banner.as_ref().and_then(|b| blob_url(pds, sub, b)),
            created_at: record.created_at,
            ..Default::default()
        })
    }

    async fn public_profile(&self, sub: &Did) -> XrpcResult<PublicProfile> {
        self.http
            .xrpc(self.public_appview.clone())
            .query(GET_PROFILE, &[("actor", sub.as_str())])
            .await
    }
}
