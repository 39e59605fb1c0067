//! # Stateless XRPC request building and response mapping
//!
//! Mapping overview:
//! - Success (2xx): parse body as JSON into the caller's output type.
//! - Anything else: [`HttpError`] with the status and the raw body, which may
//!   not be JSON.

use crate::AuthorizationToken;
use crate::error::{HttpError, TransportError, XrpcResult};
use crate::http_client::HttpClient;
use bytes::Bytes;
use http::{HeaderValue, Method, Request, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

/// NSID of `com.atproto.repo.getRecord`.
pub const GET_RECORD: &str = "com.atproto.repo.getRecord";
/// NSID of `com.atproto.repo.createRecord`.
pub const CREATE_RECORD: &str = "com.atproto.repo.createRecord";
/// NSID of `com.atproto.repo.uploadBlob`.
pub const UPLOAD_BLOB: &str = "com.atproto.repo.uploadBlob";
/// NSID of `com.atproto.identity.resolveHandle`.
pub const RESOLVE_HANDLE: &str = "com.atproto.identity.resolveHandle";
/// NSID of `app.bsky.actor.getProfile`.
pub const GET_PROFILE: &str = "app.bsky.actor.getProfile";
/// NSID of `com.atproto.server.createSession`.
pub const CREATE_SESSION: &str = "com.atproto.server.createSession";
/// NSID of `com.atproto.sync.getBlob`.
pub const GET_BLOB: &str = "com.atproto.sync.getBlob";

/// Per-request options.
#[derive(Debug, Default, Clone)]
pub struct CallOptions {
    /// Optional Authorization to apply
    pub auth: Option<AuthorizationToken>,
}

/// `<base>/xrpc/<nsid>`, keeping any path prefix on `base`.
pub fn xrpc_url(base: &Url, nsid: &str) -> Url {
    let mut url = base.clone();
    let mut path = url.path().trim_end_matches('/').to_owned();
    path.push_str("/xrpc/");
    path.push_str(nsid);
    url.set_path(&path);
    url.set_query(None);
    url
}

fn apply_options(
    mut builder: http::request::Builder,
    opts: &CallOptions,
) -> Result<http::request::Builder, TransportError> {
    if let Some(token) = &opts.auth {
        let hv = HeaderValue::try_from(token).map_err(|e| {
            TransportError::InvalidRequest(format!("Invalid authorization token: {}", e))
        })?;
        builder = builder.header(header::AUTHORIZATION, hv);
    }
    Ok(builder)
}

/// Build a GET request for a query, encoding `params` as the query string.
pub fn query_request<Q: Serialize + ?Sized>(
    base: &Url,
    nsid: &str,
    params: &Q,
    opts: &CallOptions,
) -> Result<Request<Vec<u8>>, TransportError> {
    let mut url = xrpc_url(base, nsid);
    let qs = serde_html_form::to_string(params)
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    if !qs.is_empty() {
        url.set_query(Some(&qs));
    }
    let builder = Request::builder()
        .method(Method::GET)
        .uri(url.as_str())
        .header(header::ACCEPT, "application/json");
    apply_options(builder, opts)?
        .body(Vec::new())
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))
}

/// Build a POST request for a procedure with a JSON body.
pub fn procedure_request<B: Serialize + ?Sized>(
    base: &Url,
    nsid: &str,
    body: &B,
    opts: &CallOptions,
) -> Result<Request<Vec<u8>>, TransportError> {
    let body =
        serde_json::to_vec(body).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    let builder = Request::builder()
        .method(Method::POST)
        .uri(xrpc_url(base, nsid).as_str())
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json");
    apply_options(builder, opts)?
        .body(body)
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))
}

/// Build a POST request carrying raw bytes with the given MIME type.
pub fn blob_request(
    base: &Url,
    nsid: &str,
    bytes: Vec<u8>,
    mime_type: &str,
    opts: &CallOptions,
) -> Result<Request<Vec<u8>>, TransportError> {
    let builder = Request::builder()
        .method(Method::POST)
        .uri(xrpc_url(base, nsid).as_str())
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::ACCEPT, "application/json");
    apply_options(builder, opts)?
        .body(bytes)
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))
}

/// Fail on non-2xx, keeping the body bytes.
pub fn check_status(response: http::Response<Vec<u8>>) -> Result<Bytes, HttpError> {
    let status = response.status();
    let body = Bytes::from(response.into_body());
    if status.is_success() {
        Ok(body)
    } else {
        Err(HttpError {
            status,
            body: (!body.is_empty()).then_some(body),
        })
    }
}

/// Decode a JSON response body, mapping non-2xx to [`HttpError`].
pub fn decode_response<T: DeserializeOwned>(response: http::Response<Vec<u8>>) -> XrpcResult<T> {
    let body = check_status(response)?;
    Ok(serde_json::from_slice(&body)?)
}

/// Extension for stateless XRPC calls on any `HttpClient`.
///
/// ```no_run
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use plume_common::xrpc::{XrpcExt, GET_PROFILE};
///
/// let http = reqwest::Client::new();
/// let base = url::Url::parse("https://public.api.bsky.app")?;
/// let profile: serde_json::Value = http
///     .xrpc(base)
///     .query(GET_PROFILE, &[("actor", "alice.example")])
///     .await?;
/// # Ok(())
/// # }
/// ```
pub trait XrpcExt: HttpClient {
    /// Start building an XRPC call for the given base URL.
    fn xrpc(&self, base: Url) -> XrpcCall<'_, Self>
    where
        Self: Sized,
    {
        XrpcCall {
            client: self,
            base,
            opts: CallOptions::default(),
        }
    }
}

impl<T: HttpClient> XrpcExt for T {}

/// Stateless XRPC call builder.
pub struct XrpcCall<'a, C: HttpClient> {
    client: &'a C,
    base: Url,
    opts: CallOptions,
}

impl<'a, C: HttpClient> XrpcCall<'a, C> {
    async fn send<T: DeserializeOwned>(&self, request: Request<Vec<u8>>) -> XrpcResult<T> {
        let response = self
            .client
            .send_http(request)
            .await
            .map_err(|e| TransportError::Other(Box::new(e)))?;
        decode_response(response)
    }

    /// Send a query (GET) and decode the JSON output.
    pub async fn query<Q, T>(self, nsid: &str, params: &Q) -> XrpcResult<T>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = query_request(&self.base, nsid, params, &self.opts)?;
        self.send(request).await
    }

    /// Send a procedure (POST, JSON body) and decode the JSON output.
    pub async fn procedure<B, T>(self, nsid: &str, body: &B) -> XrpcResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = procedure_request(&self.base, nsid, body, &self.opts)?;
        self.send(request).await
    }
}
