//! Issuer chain resolution
//!
//! Builds the PEM chain for a leaf certificate by following the
//! Authority Information Access "CA Issuers" URI of each certificate,
//! starting at the leaf, until a certificate without one is reached.
//!
//! ```text
//! leaf ──AIA──▶ intermediate ──AIA──▶ root (no AIA, stop)
//!               chain[0]              chain[1]
//! ```
//!
//! Failures are never retried. A responder that keeps handing out issuer
//! links is cut off after `max_depth` certificates, and a link pointing back
//! to an already visited URI is rejected outright.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, trace};

use crate::error::ChainError;
use crate::pki::{certificate_der, der_to_pem, CertificateInfo};

/// Default maximum number of issuer certificates to fetch
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Timeout for a single issuer certificate download
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves issuer chains over HTTP
#[derive(Debug, Clone)]
pub struct ChainResolver {
    client: Client,
    max_depth: usize,
}

impl ChainResolver {
    /// Create a resolver with its own HTTP client
    pub fn new(max_depth: usize) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Client(e.to_string()))?;
        Ok(Self::with_client(client, max_depth))
    }

    /// Create a resolver reusing an existing HTTP client
    pub fn with_client(client: Client, max_depth: usize) -> Self {
        Self {
            client,
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolve the issuer chain of a DER encoded certificate
    ///
    /// Returns the PEM encoded issuers, nearest issuer first. The result is
    /// empty when `leaf_der` carries no issuer link.
    pub async fn resolve(&self, leaf_der: &[u8]) -> Result<Vec<String>, ChainError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();

        let mut next_uri = CertificateInfo::from_der(leaf_der)
            .map_err(|e| ChainError::Certificate(e.to_string()))?
            .ca_issuer_uri;

        while let Some(uri) = next_uri {
            if !visited.insert(uri.clone()) {
                return Err(ChainError::Cycle(uri));
            }
            if chain.len() >= self.max_depth {
                return Err(ChainError::DepthExceeded(self.max_depth));
            }

            let der = self.fetch(&uri).await?;
            let info = CertificateInfo::from_der(&der).map_err(|e| ChainError::Parse {
                url: uri.clone(),
                message: e.to_string(),
            })?;

            trace!(
                url = %uri,
                depth = chain.len() + 1,
                has_issuer_link = info.ca_issuer_uri.is_some(),
                "Fetched issuer certificate"
            );

            chain.push(der_to_pem(&der));
            next_uri = info.ca_issuer_uri;
        }

        debug!(chain_length = chain.len(), "Resolved certificate chain");
        Ok(chain)
    }

    /// Download one issuer certificate as DER
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ChainError> {
        let fetch_err = |message: String| ChainError::Fetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("status {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;

        certificate_der(&body).map_err(|e| ChainError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, CustomExtension, KeyPair};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// id-pe-authorityInfoAccess
    const OID_AUTHORITY_INFO_ACCESS: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 1];

    /// DER encoded AuthorityInfoAccessSyntax with a single caIssuers URI
    fn aia_extension(uri: &str) -> CustomExtension {
        let ca_issuers_oid = [0x06, 0x08, 0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x02];

        let mut location = vec![0x86, uri.len() as u8];
        location.extend_from_slice(uri.as_bytes());

        let mut description = vec![0x30, (ca_issuers_oid.len() + location.len()) as u8];
        description.extend_from_slice(&ca_issuers_oid);
        description.extend_from_slice(&location);

        let mut syntax = vec![0x30, description.len() as u8];
        syntax.extend_from_slice(&description);

        CustomExtension::from_oid_content(OID_AUTHORITY_INFO_ACCESS, syntax)
    }

    fn certificate(name: &str, issuer_uri: Option<&str>) -> Vec<u8> {
        let mut params = CertificateParams::new(vec![name.to_string()]).unwrap();
        if let Some(uri) = issuer_uri {
            params.custom_extensions.push(aia_extension(uri));
        }
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().to_vec()
    }

    fn resolver() -> ChainResolver {
        ChainResolver::new(DEFAULT_MAX_DEPTH).unwrap()
    }

    #[test]
    fn test_depth_floor_is_one() {
        assert_eq!(ChainResolver::new(0).unwrap().max_depth(), 1);
    }

    async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_aia_extension_is_parsed() {
        let der = certificate("leaf.example.com", Some("http://ca.example.com/int.der"));
        let info = CertificateInfo::from_der(&der).unwrap();

        assert!(info.has_authority_info_access);
        assert_eq!(
            info.ca_issuer_uri.as_deref(),
            Some("http://ca.example.com/int.der")
        );
    }

    #[tokio::test]
    async fn test_three_certificate_chain() {
        let server = MockServer::start().await;
        let root_uri = format!("{}/root.der", server.uri());
        let intermediate_uri = format!("{}/int.der", server.uri());

        let root = certificate("root.example.com", None);
        let intermediate = certificate("int.example.com", Some(&root_uri));
        let leaf = certificate("leaf.example.com", Some(&intermediate_uri));

        serve(&server, "/root.der", root.clone()).await;
        serve(&server, "/int.der", intermediate.clone()).await;

        let chain = resolver().resolve(&leaf).await.unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], der_to_pem(&intermediate));
        assert_eq!(chain[1], der_to_pem(&root));
    }

    #[tokio::test]
    async fn test_pem_served_issuer() {
        let server = MockServer::start().await;
        let issuer = certificate("int.example.com", None);
        let leaf = certificate("leaf.example.com", Some(&format!("{}/int.pem", server.uri())));

        serve(&server, "/int.pem", der_to_pem(&issuer).into_bytes()).await;

        let chain = resolver().resolve(&leaf).await.unwrap();
        assert_eq!(chain, vec![der_to_pem(&issuer)]);
    }

    #[tokio::test]
    async fn test_leaf_without_issuer_link() {
        let leaf = certificate("leaf.example.com", None);
        let chain = resolver().resolve(&leaf).await.unwrap();
        assert!(chain.is_empty());
    }

    #[tokio::test]
    async fn test_self_referential_issuer_rejected() {
        let server = MockServer::start().await;
        let uri = format!("{}/loop.der", server.uri());

        serve(&server, "/loop.der", certificate("loop.example.com", Some(&uri))).await;
        let leaf = certificate("leaf.example.com", Some(&uri));

        let err = resolver().resolve(&leaf).await.unwrap_err();
        assert!(matches!(err, ChainError::Cycle(_)));
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let server = MockServer::start().await;

        // a0 -> a1 -> a2 -> a3 -> ... never terminates
        for i in 0..5 {
            let next = format!("{}/a{}.der", server.uri(), i + 1);
            serve(
                &server,
                &format!("/a{}.der", i),
                certificate("chain.example.com", Some(&next)),
            )
            .await;
        }
        let leaf = certificate("leaf.example.com", Some(&format!("{}/a0.der", server.uri())));

        let err = ChainResolver::new(3).unwrap().resolve(&leaf).await.unwrap_err();
        assert!(matches!(err, ChainError::DepthExceeded(3)));
    }

    #[tokio::test]
    async fn test_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.der"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let leaf = certificate(
            "leaf.example.com",
            Some(&format!("{}/missing.der", server.uri())),
        );

        let err = resolver().resolve(&leaf).await.unwrap_err();
        assert!(matches!(err, ChainError::Fetch { .. }));
    }

    #[tokio::test]
    async fn test_garbage_issuer() {
        let server = MockServer::start().await;
        serve(&server, "/junk.der", b"definitely not a certificate".to_vec()).await;

        let leaf = certificate("leaf.example.com", Some(&format!("{}/junk.der", server.uri())));

        let err = resolver().resolve(&leaf).await.unwrap_err();
        assert!(matches!(err, ChainError::Parse { .. }));
    }
}
