//! # plume
//!
//! Session and publishing layer for an atproto client.
//!
//! A [`SessionManager`] drives an OAuth SDK (or a direct server login), keeps
//! the one current [`IdentitySession`] in a [`SessionStore`], and hands out a
//! [`ContentPublisher`] that writes posts and blobs to the user's PDS. Every
//! PDS call goes through the [`AuthenticatedFetcher`], which sends a bearer
//! token for server-issued sessions and the SDK's DPoP-bound fetch otherwise.
//!
//! ```no_run
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> miette::Result<()> {
//! # fn sdk() -> std::sync::Arc<dyn plume::oauth::OAuthSdk> { unimplemented!() }
//! # fn host() -> plume::host::Host { unimplemented!() }
//! use plume::publisher::NewPost;
//! use plume::{ClientConfig, SessionManager, detect_facets};
//!
//! let manager = SessionManager::with_public_network(ClientConfig::default(), sdk(), host());
//! manager.init().await.map_err(|e| miette::miette!("{e}"))?;
//!
//! let text = "hello from @alice.example.com";
//! let post = NewPost::new(text).facets(detect_facets(text)).build();
//! let created = manager.publisher().publish(post).await?;
//! println!("{}", created.uri);
//! # Ok(())
//! # }
//! ```
//!
//! Which failures abort and which degrade is listed in [`policy`].

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod facets;
pub mod fetcher;
pub mod host;
pub mod manager;
pub mod oauth;
pub mod policy;
pub mod popup;
pub mod profile;
pub mod publisher;
pub mod registration;
pub mod reply;
pub mod store;

pub use plume_common as common;
pub use plume_identity as identity;

pub use config::ClientConfig;
pub use error::{FetchError, PublishError, SessionError};
pub use facets::detect_facets;
pub use fetcher::AuthenticatedFetcher;
pub use manager::{InitOutcome, LoginFailure, SessionManager};
pub use plume_common::session::IdentitySession;
pub use publisher::ContentPublisher;
pub use store::SessionStore;
