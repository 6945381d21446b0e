//! HTTP fetcher: the production network collaborator for the cache
//! controller and lifecycle manager.

use crate::cache::{Request, Response};
use crate::error::CacheError;

/// Thin reqwest wrapper translating cache [`Request`]s into HTTP calls and
/// snapshotting the responses. All failures surface as
/// [`CacheError::Network`] so the strategies can apply their fallbacks.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self, CacheError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("moviebox/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| CacheError::Network {
        url: String::new(),
        reason: format!("failed to build HTTP client: {}", e),
      })?;

    Ok(Self { client })
  }

  /// Perform the request and snapshot the full response body.
  pub async fn fetch(&self, request: &Request) -> Result<Response, CacheError> {
    let method =
      reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| CacheError::Network {
        url: request.url.to_string(),
        reason: format!("invalid method '{}': {}", request.method, e),
      })?;

    let response = self
      .client
      .request(method, request.url.clone())
      .send()
      .await
      .map_err(|e| CacheError::Network {
        url: request.url.to_string(),
        reason: e.to_string(),
      })?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| CacheError::Network {
        url: request.url.to_string(),
        reason: format!("failed to read body: {}", e),
      })?
      .to_vec();

    Ok(Response {
      status,
      headers,
      body,
    })
  }
}
