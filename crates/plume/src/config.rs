//! Client configuration.

use std::time::Duration;

use bon::Builder;
use plume_identity::resolver::{DEFAULT_HANDLE_RESOLVER, DEFAULT_PLC_DIRECTORY, ResolverOptions};
use smol_str::SmolStr;
use url::Url;

/// Default read-only public directory.
pub const DEFAULT_PUBLIC_APPVIEW: &str = "https://public.api.bsky.app/";

fn default_url(s: &'static str) -> Url {
    Url::parse(s).expect("valid url")
}

/// A locally administered PDS whose accounts should get their profile from
/// the PDS itself rather than the public directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDeployment {
    /// Base URL of the local PDS
    pub pds: Url,
    /// Handle suffixes served by the local PDS, e.g. `.pds.example.com`
    pub handle_suffixes: Vec<SmolStr>,
}

/// Popup handshake timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
#[builder(start_fn = new)]
pub struct PopupOptions {
    /// How often the popup re-posts an unacknowledged result
    #[builder(default = Duration::from_millis(250))]
    pub retry_interval: Duration,
    /// How long the popup keeps re-posting before giving up
    #[builder(default = Duration::from_secs(5))]
    pub ack_timeout: Duration,
    /// How long the opener waits for a result
    #[builder(default = Duration::from_secs(300))]
    pub result_timeout: Duration,
}

impl Default for PopupOptions {
    fn default() -> Self {
        Self::new().build()
    }
}

/// Configuration for a [`SessionManager`](crate::manager::SessionManager).
///
/// ```
/// use plume::config::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .default_return_to("/home")
///     .login_failure_redirect_delay(Duration::from_secs(5))
///     .build();
/// assert_eq!(config.plc_directory.as_str(), "https://plc.directory/");
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(start_fn = new)]
pub struct ClientConfig {
    /// PLC directory for `did:plc` documents
    #[builder(default = default_url(DEFAULT_PLC_DIRECTORY))]
    pub plc_directory: Url,
    /// Public read-only directory (profiles, record mirror)
    #[builder(default = default_url(DEFAULT_PUBLIC_APPVIEW))]
    pub public_appview: Url,
    /// Public `resolveHandle` endpoint
    #[builder(default = default_url(DEFAULT_HANDLE_RESOLVER))]
    pub handle_resolver: Url,
    /// Post-login destination when nothing else is known
    #[builder(default = SmolStr::new_static("/"), into)]
    pub default_return_to: SmolStr,
    /// Where a failed login sends the user
    #[builder(default = SmolStr::new_static("/"), into)]
    pub landing_path: SmolStr,
    /// How long the login failure message stays up
    #[builder(default = Duration::from_secs(3))]
    pub login_failure_redirect_delay: Duration,
    /// Local deployment to prefer for profiles
    pub local_deployment: Option<LocalDeployment>,
    /// Best-effort registration endpoint called after login
    pub registration_endpoint: Option<Url>,
    /// Popup handshake timing
    #[builder(default)]
    pub popup: PopupOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new().build()
    }
}

impl ClientConfig {
    /// Resolver options derived from this configuration.
    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions::new()
            .plc_directory(self.plc_directory.clone())
            .handle_resolver(self.handle_resolver.clone())
            .build()
    }
}
