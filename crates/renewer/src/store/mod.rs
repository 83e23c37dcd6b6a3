//! Secret store, certificate store and audit log
//!
//! The renewer owns none of these; it consumes them through the traits below.
//! File-backed and log-backed implementations are provided for standalone
//! deployments and tests.
//!
//! # Directory Structure
//!
//! ```text
//! secrets/
//! └── acme-account-key          # serialized ACME account credentials (0600)
//! certificates/
//! └── example.com/
//!     ├── meta.json             # CertificateRef
//!     └── versions/
//!         └── 1/
//!             ├── cert.pem
//!             ├── chain.pem
//!             ├── key.pem       # 0600
//!             └── version.json  # CertificateVersion
//! ```

mod audit;
mod certificates;
mod secrets;

pub use audit::{AuditEntry, JsonLinesAuditLog, TracingAuditLog};
pub use certificates::FileCertificateStore;
pub use secrets::FileSecretStore;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acme::IssuedCertificate;
use crate::error::StoreError;

/// Deployment stage of a certificate version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Served to clients
    Current,
    /// Stored, waiting for a manual promotion
    Pending,
    /// Superseded by a newer current version
    Previous,
}

impl Stage {
    /// Stage a freshly issued version is stored under
    pub fn for_new_version(auto_deploy: bool) -> Self {
        if auto_deploy {
            Stage::Current
        } else {
            Stage::Pending
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Current => "CURRENT",
            Stage::Pending => "PENDING",
            Stage::Previous => "PREVIOUS",
        };
        f.write_str(s)
    }
}

/// A certificate known to the certificate store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRef {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One stored version of a certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateVersion {
    pub version_number: u64,
    /// Unix timestamp of creation, as a string
    pub name: String,
    pub stage: Stage,
    pub not_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Named binary secrets
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put_secret(&self, name: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// Versioned certificate storage
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<CertificateRef>, StoreError>;

    /// Versions of `certificate`, newest first
    async fn list_versions(
        &self,
        certificate: &CertificateRef,
    ) -> Result<Vec<CertificateVersion>, StoreError>;

    /// Create a certificate with `issued` as its first version
    async fn create_certificate(
        &self,
        name: &str,
        issued: &IssuedCertificate,
        stage: Stage,
    ) -> Result<CertificateRef, StoreError>;

    /// Add `issued` as a new version of an existing certificate
    async fn create_version(
        &self,
        certificate: &CertificateRef,
        issued: &IssuedCertificate,
        stage: Stage,
    ) -> Result<CertificateVersion, StoreError>;
}

/// Append-only record of renewal decisions
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(
        &self,
        certificate: &CertificateRef,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// Reject names that would escape a file store's base directory
pub(crate) fn check_entry_name(name: &str) -> Result<(), StoreError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);

    if invalid {
        return Err(StoreError::Backend(format!("invalid entry name: {:?}", name)));
    }
    Ok(())
}
