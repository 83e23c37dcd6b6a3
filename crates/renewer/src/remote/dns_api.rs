//! DNS zone REST client.
//!
//! ```text
//! GET   {endpoint}/zones/{zone}/records            -> {"items": [record...]}
//! PATCH {endpoint}/zones/{zone}/records/{domain}   <- {"items": [operation...]}
//! ```

use async_trait::async_trait;
use renewer_config::EndpointConfig;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::RestEndpoint;
use crate::challenge::{DnsRecord, DnsZoneClient, RecordOperation};
use crate::error::{ChallengeError, RenewalError};

#[derive(Debug, Deserialize)]
struct RecordCollection {
    #[serde(default)]
    items: Vec<DnsRecord>,
}

#[derive(Debug, Serialize)]
struct PatchRecords<'a> {
    items: &'a [RecordOperation],
}

/// [`DnsZoneClient`] over the zone REST API
#[derive(Debug, Clone)]
pub struct HttpDnsZoneClient {
    endpoint: RestEndpoint,
}

impl HttpDnsZoneClient {
    pub fn from_config(config: &EndpointConfig) -> Result<Self, RenewalError> {
        Ok(Self {
            endpoint: RestEndpoint::from_config(config)?,
        })
    }
}

#[async_trait]
impl DnsZoneClient for HttpDnsZoneClient {
    async fn list_records(&self, zone: &str) -> Result<Vec<DnsRecord>, ChallengeError> {
        let url = self.endpoint.url(&["zones", zone, "records"]);
        let response = self.endpoint.request(Method::GET, url).send().await?;
        let collection: RecordCollection = RestEndpoint::check(response).await?.json().await?;

        debug!(zone = %zone, records = collection.items.len(), "Listed zone records");
        Ok(collection.items)
    }

    async fn patch_records(
        &self,
        zone: &str,
        domain: &str,
        operations: &[RecordOperation],
    ) -> Result<(), ChallengeError> {
        let url = self.endpoint.url(&["zones", zone, "records", domain]);
        let response = self
            .endpoint
            .request(Method::PATCH, url)
            .json(&PatchRecords { items: operations })
            .send()
            .await?;
        RestEndpoint::check(response).await?;

        debug!(
            zone = %zone,
            domain = %domain,
            operations = operations.len(),
            "Patched zone records"
        );
        Ok(())
    }
}
