//! REST clients for the DNS zone and WAF policy APIs.

mod dns_api;
mod waf_api;

pub use dns_api::HttpDnsZoneClient;
pub use waf_api::HttpWafPolicyClient;

use std::fmt;
use std::time::Duration;

use renewer_config::EndpointConfig;
use reqwest::{Client, Method, RequestBuilder, Response};
use tracing::trace;
use url::Url;

use crate::error::{ChallengeError, RenewalError};

/// JSON API endpoint with optional bearer authentication
#[derive(Clone)]
struct RestEndpoint {
    client: Client,
    base: Url,
    auth_token: Option<String>,
}

impl fmt::Debug for RestEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestEndpoint")
            .field("base", &self.base.as_str())
            .field("authenticated", &self.auth_token.is_some())
            .finish()
    }
}

impl RestEndpoint {
    fn from_config(config: &EndpointConfig) -> Result<Self, RenewalError> {
        let base = Url::parse(&config.endpoint).map_err(|e| {
            RenewalError::Configuration(format!("invalid endpoint {}: {}", config.endpoint, e))
        })?;

        if base.cannot_be_a_base() {
            return Err(RenewalError::Configuration(format!(
                "endpoint {} cannot carry a path",
                config.endpoint
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RenewalError::Configuration(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            base,
            auth_token: config.auth_token.clone(),
        })
    }

    /// Endpoint URL extended by `segments`, each percent-encoded
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        trace!(method = %method, url = %url, "Sending API request");
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Turn non-2xx responses into [`ChallengeError::Status`]
    async fn check(response: Response) -> Result<Response, ChallengeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChallengeError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
