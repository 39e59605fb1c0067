//! Identity session and profile shapes shared across plume crates.

use crate::types::{Did, Handle};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The authenticated identity of this process.
///
/// `sub` is fixed at construction; every other field may be refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySession {
    sub: Did,
    /// Handle, or the DID when no handle is known
    pub handle: SmolStr,
    /// Display name, falls back to the handle
    pub display_name: SmolStr,
    /// Avatar image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Hydrated public profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<PublicProfile>,
    /// Access token issued directly by the PDS (non-OAuth login)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<SmolStr>,
}

impl IdentitySession {
    /// A session with nothing known beyond the subject.
    pub fn new(sub: Did) -> Self {
        let handle = SmolStr::new(sub.as_str());
        Self {
            sub,
            display_name: handle.clone(),
            handle,
            avatar_url: None,
            profile: None,
            access_token: None,
        }
    }

    /// The subject DID.
    pub fn sub(&self) -> &Did {
        &self.sub
    }

    /// Set handle and display name together.
    pub fn with_handle(mut self, handle: &Handle) -> Self {
        self.handle = SmolStr::new(handle.as_str());
        self.display_name = self.handle.clone();
        self
    }

    /// Attach a directly issued access token.
    pub fn with_access_token(mut self, token: impl Into<SmolStr>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Copy profile-derived display fields onto the session.
    pub fn apply_profile(&mut self, profile: PublicProfile) {
        self.handle = profile.handle.clone();
        self.display_name = profile
            .display_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| profile.handle.clone());
        self.avatar_url = profile.avatar_url.clone();
        self.profile = Some(profile);
    }
}

/// Public profile view (`app.bsky.actor.getProfile` output subset).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    /// Handle, or the DID for the minimal fallback profile
    pub handle: SmolStr,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<SmolStr>,
    /// Profile description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Avatar image URL
    #[serde(default, rename = "avatar", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Banner image URL
    #[serde(default, rename = "banner", skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    /// Follower count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers_count: Option<u64>,
    /// Follow count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follows_count: Option<u64>,
    /// Post count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts_count: Option<u64>,
    /// Account creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl PublicProfile {
    /// Fallback profile when hydration fails: the identifier as handle, nothing else.
    pub fn minimal(identifier: &str) -> Self {
        Self {
            handle: SmolStr::new(identifier),
            ..Default::default()
        }
    }
}

/// Session information from `com.atproto.server.createSession`.
///
/// Persisted as the server-issued session blob for direct (non-OAuth) logins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSession {
    /// Access token (JWT) used for authenticated requests
    pub access_jwt: SmolStr,
    /// Refresh token (JWT) used to obtain new access tokens
    pub refresh_jwt: SmolStr,
    /// User's DID
    pub did: Did,
    /// User's handle
    pub handle: SmolStr,
}

impl From<&ServerSession> for IdentitySession {
    fn from(s: &ServerSession) -> Self {
        let mut session = IdentitySession::new(s.did.clone()).with_access_token(s.access_jwt.clone());
        session.handle = s.handle.clone();
        session.display_name = s.handle.clone();
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_overrides_display_fields_only() {
        let mut s = IdentitySession::new(Did::new("did:plc:alice").unwrap()).with_access_token("tok");
        s.apply_profile(PublicProfile {
            handle: "alice.example".into(),
            display_name: Some("Alice".into()),
            avatar_url: Some("https://cdn.example/a.jpg".into()),
            ..Default::default()
        });
        assert_eq!(s.sub().as_str(), "did:plc:alice");
        assert_eq!(s.display_name, "Alice");
        assert_eq!(s.avatar_url.as_deref(), Some("https://cdn.example/a.jpg"));
        assert_eq!(s.access_token.as_deref(), Some("tok"));
    }

    #[test]
    fn empty_display_name_falls_back_to_handle() {
        let mut s = IdentitySession::new(Did::new("did:plc:alice").unwrap());
        s.apply_profile(PublicProfile {
            handle: "alice.example".into(),
            display_name: Some("".into()),
            ..Default::default()
        });
        assert_eq!(s.display_name, "alice.example");
    }

    #[test]
    fn minimal_profile() {
        let p = PublicProfile::minimal("did:plc:alice");
        assert_eq!(p.handle, "did:plc:alice");
        assert!(p.avatar_url.is_none());
    }

    #[test]
    fn profile_from_public_view() {
        let p: PublicProfile = serde_json::from_value(serde_json::json!({
            "did": "did:plc:alice",
            "handle": "alice.example",
            "displayName": "Alice",
            "avatar": "https://cdn.example/a.jpg",
            "followersCount": 3,
            "postsCount": 10
        }))
        .unwrap();
        assert_eq!(p.avatar_url.as_deref(), Some("https://cdn.example/a.jpg"));
        assert_eq!(p.followers_count, Some(3));
        assert_eq!(p.follows_count, None);
    }
}
