//! Session lifecycle: SDK start-up, login, logout, revocation.
//!
//! [`SessionManager`] is the only writer of the [`SessionStore`]. Everything
//! else (fetcher, publisher, UI) reads snapshots from it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use plume_common::http_client::HttpClient;
use plume_common::session::{IdentitySession, ServerSession};
use plume_common::types::{Did, Handle};
use plume_common::xrpc::{CREATE_SESSION, XrpcExt};
use plume_identity::resolver::IdentityResolver;
use serde::Serialize;
use smol_str::SmolStr;
use tokio::sync::OnceCell;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::{PopupError, SessionError, StorageError};
use crate::fetcher::AuthenticatedFetcher;
use crate::host::{AppEvent, Host, LogoutDetail, StorageArea};
use crate::oauth::{CallbackParams, OAuthSdk, SdkEvent, SdkInit, SignInOptions};
use crate::policy::{FailurePolicy, Operation};
use crate::popup::{self, PopupOutcome};
use crate::profile::ProfileLoader;
use crate::publisher::ContentPublisher;
use crate::registration::Registrar;
use crate::store::{
    AuthState, HANDLE_KEY, IDENTITY_KEYS, RETURN_TO_KEY, SERVER_SESSION_KEY, SUB_KEY, SessionStore,
};

/// What [`SessionManager::init`] found.
#[derive(Debug, Clone, PartialEq)]
pub enum InitOutcome {
    /// The page was an authorization callback; a new session was established
    SignedIn {
        /// The new session
        session: IdentitySession,
        /// Application state passed to `sign_in`
        state: Option<String>,
    },
    /// An existing session was restored
    Restored(IdentitySession),
    /// Nobody is signed in
    Anonymous,
}

/// What to show after a failed login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginFailure {
    /// Human-readable reason
    pub message: String,
    /// Where to send the user afterwards
    pub landing_path: SmolStr,
    /// How long to show the message first
    pub delay: Duration,
}

#[derive(Serialize)]
struct CreateSessionInput<'a> {
    identifier: &'a str,
    password: &'a str,
}

struct Inner<C, R> {
    config: ClientConfig,
    sdk: Arc<dyn OAuthSdk>,
    http: C,
    resolver: Arc<R>,
    host: Host,
    store: Arc<SessionStore>,
    profiles: ProfileLoader<C>,
    registrar: Registrar<C>,
    init: OnceCell<Result<InitOutcome, Arc<SessionError>>>,
}

/// Owns the current identity session and drives the OAuth SDK.
///
/// Cheap to clone; clones share state.
pub struct SessionManager<C, R> {
    inner: Arc<Inner<C, R>>,
}

impl<C, R> Clone for SessionManager<C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(feature = "reqwest-client")]
impl SessionManager<reqwest::Client, plume_identity::PublicResolver> {
    /// Manager resolving identities against the URLs in `config` over reqwest.
    pub fn with_public_network(config: ClientConfig, sdk: Arc<dyn OAuthSdk>, host: Host) -> Self {
        let http = reqwest::Client::new();
        let resolver = plume_identity::PlumeResolver::new(http.clone(), config.resolver_options());
        Self::new(config, sdk, http, resolver, host)
    }
}

impl<C, R> SessionManager<C, R>
where
    C: HttpClient + Clone + Send + Sync + 'static,
    R: IdentityResolver + Send + Sync + 'static,
{
    /// Manager over the given SDK, HTTP client, resolver and host.
    pub fn new(config: ClientConfig, sdk: Arc<dyn OAuthSdk>, http: C, resolver: R, host: Host) -> Self {
        let profiles = ProfileLoader::new(
            http.clone(),
            config.public_appview.clone(),
            config.local_deployment.clone(),
        );
        let registrar = Registrar::new(http.clone(), config.registration_endpoint.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                sdk,
                http,
                resolver: Arc::new(resolver),
                host,
                store: Arc::new(SessionStore::new()),
                profiles,
                registrar,
                init: OnceCell::new(),
            }),
        }
    }

    /// The session store (read side).
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.inner.store
    }

    /// Snapshot of the current session.
    pub fn current(&self) -> Option<IdentitySession> {
        self.inner.store.current()
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Fetcher bound to the current session.
    pub fn fetcher(&self) -> AuthenticatedFetcher<C> {
        AuthenticatedFetcher::new(
            self.inner.http.clone(),
            self.inner.sdk.clone(),
            self.inner.store.clone(),
        )
    }

    /// Publisher bound to the current session.
    pub fn publisher(&self) -> ContentPublisher<C, R> {
        ContentPublisher::new(
            self.fetcher(),
            self.inner.http.clone(),
            self.inner.resolver.clone(),
            self.inner.config.public_appview.clone(),
        )
    }

    /// Start the SDK and process a pending callback or stored session.
    ///
    /// Runs once per manager. Concurrent and later callers all get the result
    /// of that single run, including its error.
    pub async fn init(&self) -> Result<InitOutcome, Arc<SessionError>> {
        self.inner
            .init
            .get_or_init(|| async { self.run_init().await.map_err(Arc::new) })
            .await
            .clone()
    }

    #[tracing::instrument(name = "init", skip(self))]
    async fn run_init(&self) -> Result<InitOutcome, SessionError> {
        let store = &self.inner.store;
        store.set_state(AuthState::Initializing);
        self.watch_sdk_events();

        let outcome = self.start_session().await;
        if matches!(outcome, Ok(InitOutcome::Anonymous) | Err(_)) {
            store.set_state(AuthState::Unauthenticated);
        }
        outcome
    }

    async fn start_session(&self) -> Result<InitOutcome, SessionError> {
        let init = self
            .inner
            .sdk
            .init()
            .await
            .map_err(SessionError::from_callback)?;
        let outcome = match init {
            Some(SdkInit::Callback(callback)) => {
                tracing::info!(sub = %callback.session.sub(), "authorization callback processed");
                let session = self
                    .establish(IdentitySession::new(callback.session.sub().clone()))
                    .await?;
                InitOutcome::SignedIn {
                    session,
                    state: callback.state,
                }
            }
            Some(SdkInit::Restored(oauth)) => {
                tracing::info!(sub = %oauth.sub(), "oauth session restored");
                InitOutcome::Restored(self.establish(IdentitySession::new(oauth.sub().clone())).await?)
            }
            None => match self.restore_server_session().await? {
                Some(session) => InitOutcome::Restored(session),
                None => match self.restore_stored_subject().await? {
                    Some(session) => InitOutcome::Restored(session),
                    None => InitOutcome::Anonymous,
                },
            },
        };
        Ok(outcome)
    }

    /// Ask the SDK for the session of the subject remembered under [`SUB_KEY`].
    ///
    /// A pointer the SDK cannot restore is dropped.
    async fn restore_stored_subject(&self) -> Result<Option<IdentitySession>, SessionError> {
        let storage = &self.inner.host.storage;
        let Some(raw) = storage.get(StorageArea::Local, SUB_KEY).await? else {
            return Ok(None);
        };
        let restored = match Did::new(&raw) {
            Ok(sub) => self.inner.sdk.restore(&sub).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match restored {
            Ok(oauth) => {
                tracing::info!(sub = %oauth.sub(), "oauth session restored from stored subject");
                self.establish(IdentitySession::new(oauth.sub().clone()))
                    .await
                    .map(Some)
            }
            Err(e) => {
                tracing::warn!(sub = %raw, error = %e, "dropping unrestorable stored subject");
                storage.remove(StorageArea::Local, SUB_KEY).await?;
                Ok(None)
            }
        }
    }

    async fn restore_server_session(&self) -> Result<Option<IdentitySession>, SessionError> {
        let storage = &self.inner.host.storage;
        let Some(raw) = storage.get(StorageArea::Local, SERVER_SESSION_KEY).await? else {
            return Ok(None);
        };
        let server: ServerSession = match serde_json::from_str(&raw) {
            Ok(server) => server,
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable server session");
                storage.remove(StorageArea::Local, SERVER_SESSION_KEY).await?;
                return Ok(None);
            }
        };
        tracing::info!(sub = %server.did, "server session restored");
        self.establish(IdentitySession::from(&server)).await.map(Some)
    }

    /// Hydrate, persist and publish a new current session.
    async fn establish(&self, mut session: IdentitySession) -> Result<IdentitySession, SessionError> {
        let inner = &self.inner;
        let storage = &inner.host.storage;

        let handle = match Handle::new(&session.handle) {
            Ok(handle) => Some(handle),
            Err(_) => storage
                .get(StorageArea::Local, HANDLE_KEY)
                .await?
                .and_then(|h| Handle::new(h).ok()),
        };
        let profile = inner.profiles.load(session.sub(), handle.as_ref()).await;
        session.apply_profile(profile);

        storage
            .set(StorageArea::Local, SUB_KEY, session.sub().to_string())
            .await?;
        storage
            .set(StorageArea::Local, HANDLE_KEY, session.handle.to_string())
            .await?;

        inner.store.establish(session.clone());
        inner.store.set_state(AuthState::Authenticated);
        tracing::info!(sub = %session.sub(), handle = %session.handle, "session established");

        inner.host.events.emit(AppEvent::Login(session.clone()));
        inner.host.events.emit(AppEvent::ProfileLoaded(session.clone()));
        inner.registrar.register(&session).await;
        Ok(session)
    }

    async fn remember_destination(&self, return_to: Option<&str>) -> Result<(), SessionError> {
        let inner = &self.inner;
        let storage = &inner.host.storage;
        let destination = match return_to {
            Some(path) => path.to_string(),
            None => match storage.get(StorageArea::Session, RETURN_TO_KEY).await? {
                Some(saved) => saved,
                None => inner
                    .host
                    .navigator
                    .current_location()
                    .unwrap_or_else(|| inner.config.default_return_to.to_string()),
            },
        };
        storage
            .set(StorageArea::Session, RETURN_TO_KEY, destination)
            .await?;
        Ok(())
    }

    /// Start an OAuth login for `handle` and return the normalized handle.
    ///
    /// The post-login destination is `return_to`, else a previously saved
    /// destination, else the current location, else the configured default.
    #[tracing::instrument(skip(self))]
    pub async fn login(&self, handle: &str, return_to: Option<&str>) -> Result<Handle, SessionError> {
        let handle = Handle::new(handle)?;
        self.remember_destination(return_to).await?;
        self.inner
            .host
            .storage
            .set(StorageArea::Local, HANDLE_KEY, handle.to_string())
            .await?;

        tracing::info!(handle = %handle, "starting login");
        self.inner
            .sdk
            .sign_in(&handle, SignInOptions::default())
            .await
            .map_err(SessionError::from_sign_in)?;
        Ok(handle)
    }

    /// Consume the saved post-login destination.
    pub async fn take_return_to(&self) -> Result<String, SessionError> {
        let storage = &self.inner.host.storage;
        let saved = storage.get(StorageArea::Session, RETURN_TO_KEY).await?;
        storage.remove(StorageArea::Session, RETURN_TO_KEY).await?;
        Ok(saved.unwrap_or_else(|| self.inner.config.default_return_to.to_string()))
    }

    /// Log in with an identifier and password against the account's PDS.
    ///
    /// The server-issued session is kept in storage and sent as a bearer
    /// token; no OAuth session is involved.
    #[tracing::instrument(skip(self, password))]
    pub async fn login_with_password(
        &self,
        identifier: &str,
        password: &str,
    ) -> Result<IdentitySession, SessionError> {
        let inner = &self.inner;
        let trimmed = identifier.trim();
        let did = if Did::looks_like(trimmed) {
            Did::new(trimmed)?
        } else {
            inner.resolver.resolve_handle(&Handle::new(trimmed)?).await?
        };
        let pds = inner.resolver.pds_for_did(&did).await?;
        tracing::debug!(did = %did, pds = %pds, "creating server session");

        let server: ServerSession = inner
            .http
            .xrpc(pds)
            .procedure(
                CREATE_SESSION,
                &CreateSessionInput {
                    identifier: did.as_str(),
                    password,
                },
            )
            .await?;
        let blob = serde_json::to_string(&server).map_err(StorageError::from)?;
        inner
            .host
            .storage
            .set(StorageArea::Local, SERVER_SESSION_KEY, blob)
            .await?;
        self.establish(IdentitySession::from(&server)).await
    }

    /// Log in through a popup window and wait for it to report back.
    #[tracing::instrument(skip(self))]
    pub async fn login_popup(&self, handle: &str) -> Result<IdentitySession, SessionError> {
        let inner = &self.inner;
        let handle = Handle::new(handle)?;
        inner
            .host
            .storage
            .set(StorageArea::Local, HANDLE_KEY, handle.to_string())
            .await?;

        let id = popup::new_request_id();
        let rx = inner.host.bus.subscribe();
        let options = SignInOptions {
            state: Some(id.to_string()),
            popup: true,
        };
        inner
            .sdk
            .sign_in(&handle, options)
            .await
            .map_err(SessionError::from_sign_in)?;

        let sub = popup::await_result(inner.host.bus.as_ref(), rx, &id, &inner.config.popup)
            .await
            .map_err(|e| match e {
                PopupError::Failed(sdk) if sdk.is_cancellation() => SessionError::LoginCancelled,
                e => SessionError::Popup(e),
            })?;
        let oauth = inner
            .sdk
            .restore(&sub)
            .await
            .map_err(|_| SessionError::SessionNotFound(sub))?;
        self.establish(IdentitySession::new(oauth.sub().clone())).await
    }

    /// Popup side: process the callback and report the outcome to the opener.
    #[tracing::instrument(skip_all)]
    pub async fn finish_popup_login(&self, params: CallbackParams) -> Result<Did, SessionError> {
        let inner = &self.inner;
        let id = params.state.clone().ok_or(PopupError::MissingRequestId)?;
        let result = inner.sdk.callback(params).await;
        let outcome = match &result {
            Ok(callback) => PopupOutcome::Success {
                sub: callback.session.sub().clone(),
            },
            Err(e) => PopupOutcome::Failure {
                message: SmolStr::new(e.message()),
            },
        };
        popup::deliver_result(inner.host.bus.as_ref(), &id, outcome, &inner.config.popup).await?;
        let callback = result.map_err(SessionError::from_callback)?;
        Ok(callback.session.sub().clone())
    }

    /// Log out. Always clears local state and reloads, even if revocation fails.
    ///
    /// Revocation is skipped for server-issued sessions; the SDK does not own them.
    #[tracing::instrument(skip(self))]
    pub async fn logout(&self) {
        let inner = &self.inner;
        let storage = &inner.host.storage;
        let current = inner.store.current();

        let server_issued = current
            .as_ref()
            .is_some_and(|s| s.access_token.is_some())
            || matches!(
                storage.get(StorageArea::Local, SERVER_SESSION_KEY).await,
                Ok(Some(_))
            );
        let sub = match &current {
            Some(session) => Some(session.sub().clone()),
            None => match storage.get(StorageArea::Local, SUB_KEY).await {
                Ok(stored) => stored.and_then(|s| Did::new(s).ok()),
                Err(_) => None,
            },
        };

        // Set before revoking so the SDK's own deletion notice is ignored
        inner.store.set_state(AuthState::LoggedOut);
        if let Some(sub) = sub.as_ref().filter(|_| !server_issued) {
            let _ = FailurePolicy::apply(Operation::Revocation, inner.sdk.revoke(sub).await);
        }

        self.teardown().await;
        tracing::info!(sub = ?sub, "logged out");
        inner.host.events.emit(AppEvent::Logout(None));
        inner.host.navigator.reload();
    }

    async fn teardown(&self) {
        let inner = &self.inner;
        for (area, key) in IDENTITY_KEYS {
            if let Err(e) = inner.host.storage.remove(area, key).await {
                tracing::warn!(key, error = %e, "failed to clear storage key");
            }
        }
        inner.store.clear();
        inner.store.set_state(AuthState::LoggedOut);
    }

    /// React to an SDK notification.
    ///
    /// Ignored once logged out, and for subjects other than the current one.
    pub async fn handle_sdk_event(&self, event: SdkEvent) {
        let inner = &self.inner;
        if inner.store.state() == AuthState::LoggedOut {
            tracing::debug!(?event, "sdk event after logout");
            return;
        }
        let Some(current) = inner.store.current() else {
            tracing::debug!(?event, "sdk event without a session");
            return;
        };
        match event {
            SdkEvent::Deleted { sub, cause } if sub == *current.sub() => {
                tracing::info!(sub = %sub, cause = %cause, "session revoked");
                self.teardown().await;
                inner
                    .host
                    .events
                    .emit(AppEvent::Logout(Some(LogoutDetail { sub, cause })));
                inner.host.navigator.reload();
            }
            SdkEvent::Updated { sub } if sub == *current.sub() => {
                inner.store.set_state(AuthState::Refreshing);
                let mut refreshed = current;
                let handle = Handle::new(&refreshed.handle).ok();
                let profile = inner.profiles.load(refreshed.sub(), handle.as_ref()).await;
                refreshed.apply_profile(profile);

                // A logout or revocation may have landed while the profile loaded
                if inner.store.state() != AuthState::Refreshing {
                    return;
                }
                match inner.store.refresh(refreshed.clone()) {
                    Ok(()) => inner.host.events.emit(AppEvent::ProfileLoaded(refreshed)),
                    Err(e) => tracing::warn!(error = %e, "session refresh rejected"),
                }
                inner.store.set_state(AuthState::Authenticated);
            }
            other => tracing::debug!(event = ?other, "sdk event for another subject"),
        }
    }

    /// Follow SDK notifications in a background task.
    ///
    /// The task ends when the SDK closes its channel or every manager clone is dropped.
    pub fn watch_sdk_events(&self) -> JoinHandle<()> {
        let mut rx = self.inner.sdk.subscribe();
        let weak: Weak<Inner<C, R>> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "missed sdk events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                SessionManager { inner }.handle_sdk_event(event).await;
            }
        })
    }

    /// What to tell the user about a failed login.
    pub fn login_failure(&self, err: &SessionError) -> LoginFailure {
        LoginFailure {
            message: err.user_message(),
            landing_path: self.inner.config.landing_path.clone(),
            delay: self.inner.config.login_failure_redirect_delay,
        }
    }

    /// Wait out the failure message, then go to the landing path.
    pub async fn redirect_after_failure(&self, failure: &LoginFailure) {
        tokio::time::sleep(failure.delay).await;
        self.inner.host.navigator.navigate(&failure.landing_path);
    }
}
