//! DNS-01 challenge publication.

use std::sync::Arc;

use async_trait::async_trait;
use renewer_common::RetryPolicy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ChallengeProvider;
use crate::acme::{Challenge, ChallengeKind};
use crate::error::ChallengeError;
use crate::subject::base_domain;

/// TTL of published challenge records, in seconds
pub const CHALLENGE_RECORD_TTL: u32 = 30;

/// A record of a managed DNS zone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub domain: String,
    pub rtype: String,
    #[serde(default)]
    pub rdata: String,
    #[serde(default)]
    pub ttl: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordOperationKind {
    Add,
    Remove,
}

/// One staged change of a zone patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOperation {
    pub operation: RecordOperationKind,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

impl RecordOperation {
    /// Remove every record at `domain`
    pub fn remove(domain: impl Into<String>) -> Self {
        Self {
            operation: RecordOperationKind::Remove,
            domain: domain.into(),
            rtype: None,
            rdata: None,
            ttl: None,
        }
    }

    pub fn add(
        domain: impl Into<String>,
        rtype: impl Into<String>,
        rdata: impl Into<String>,
        ttl: u32,
    ) -> Self {
        Self {
            operation: RecordOperationKind::Add,
            domain: domain.into(),
            rtype: Some(rtype.into()),
            rdata: Some(rdata.into()),
            ttl: Some(ttl),
        }
    }
}

/// Managed DNS zone API
#[async_trait]
pub trait DnsZoneClient: Send + Sync {
    /// Every record of `zone`
    async fn list_records(&self, zone: &str) -> Result<Vec<DnsRecord>, ChallengeError>;

    /// Apply `operations` to the records at `domain`, atomically
    async fn patch_records(
        &self,
        zone: &str,
        domain: &str,
        operations: &[RecordOperation],
    ) -> Result<(), ChallengeError>;
}

/// Publishes DNS-01 TXT records into one zone
pub struct DnsChallengeProvider {
    client: Arc<dyn DnsZoneClient>,
    zone: String,
    retry: RetryPolicy,
}

impl DnsChallengeProvider {
    pub fn new(
        client: Arc<dyn DnsZoneClient>,
        zone: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            zone: zone.into(),
            retry,
        }
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Fully qualified name of the challenge record for `subject_name`
    pub fn record_domain(subject_name: &str, challenge: &Challenge) -> String {
        format!("{}.{}", challenge.record_name(), base_domain(subject_name))
    }

    async fn replace_record(
        &self,
        domain: &str,
        challenge: &Challenge,
    ) -> Result<(), ChallengeError> {
        let records = self.client.list_records(&self.zone).await?;

        let mut operations = Vec::with_capacity(2);
        if records.iter().any(|r| r.domain == domain) {
            debug!(zone = %self.zone, record = %domain, "Replacing existing challenge record");
            operations.push(RecordOperation::remove(domain));
        }
        operations.push(RecordOperation::add(
            domain,
            challenge.record_type(),
            challenge.record_content(),
            CHALLENGE_RECORD_TTL,
        ));

        self.client.patch_records(&self.zone, domain, &operations).await
    }
}

#[async_trait]
impl ChallengeProvider for DnsChallengeProvider {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Dns01
    }

    async fn publish(
        &self,
        subject_name: &str,
        challenge: &Challenge,
    ) -> Result<(), ChallengeError> {
        let domain = Self::record_domain(subject_name, challenge);

        self.retry
            .run(subject_name, "DNS update", || self.replace_record(&domain, challenge))
            .await?;

        info!(
            domain = %subject_name,
            zone = %self.zone,
            record = %domain,
            "Published DNS challenge record"
        );
        Ok(())
    }
}
