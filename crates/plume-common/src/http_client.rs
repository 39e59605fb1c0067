//! Minimal HTTP client abstraction shared across crates.

use std::fmt::Display;
use std::future::Future;

/// Sends one buffered HTTP request.
///
/// Plume only ever exchanges small JSON bodies and blobs it already holds in
/// memory, so both directions are `Vec<u8>`.
#[trait_variant::make(Send)]
pub trait HttpClient {
    /// Error type returned by the HTTP client
    type Error: std::error::Error + Display + Send + Sync + 'static;

    /// Send an HTTP request and return the response.
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = Result<http::Response<Vec<u8>>, Self::Error>>;
}

#[cfg(feature = "reqwest-client")]
impl HttpClient for reqwest::Client {
    type Error = crate::error::TransportError;

    async fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, Self::Error> {
        let response = self.execute(reqwest::Request::try_from(request)?).await?;

        let mut out = http::Response::builder()
            .status(response.status())
            .version(response.version());
        if let Some(headers) = out.headers_mut() {
            headers.extend(response.headers().clone());
        }
        let body = response.bytes().await?;
        out.body(body.to_vec())
            .map_err(|e| crate::error::TransportError::Other(Box::new(e)))
    }
}
