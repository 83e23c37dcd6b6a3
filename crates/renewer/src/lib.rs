//! ACME Renewer Library
//!
//! Automated issuance and renewal of publicly trusted TLS certificates
//! through the ACME protocol.
//!
//! This library provides:
//!
//! - **Renewal decision**: renew when no certificate exists or the latest
//!   version expires within the configured threshold
//! - **ACME session driving**: account key lifecycle, orders, challenge
//!   validation polling, finalization and certificate download
//! - **Challenge fulfillment**: DNS-01 through a managed DNS zone, HTTP-01
//!   through a web application firewall policy
//! - **Chain resolution**: issuer chains assembled from Authority Information
//!   Access links
//! - **Storage**: versioned certificate store, secret store and audit log
//!
//! # Example
//!
//! ```ignore
//! use renewer::Renewer;
//! use renewer_config::{RenewalRequest, RenewerConfig};
//!
//! let config = RenewerConfig::from_file("renewer.toml")?;
//! let renewer = Renewer::from_config(&config).await?;
//!
//! let request = RenewalRequest::from_json_str(
//!     r#"{"cn_name": "app.example.com", "dns_zone_name": "example.com"}"#,
//! )?;
//! println!("{}", renewer.renew(&request).await?);
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod acme;
pub mod chain;
pub mod challenge;
pub mod error;
pub mod orchestrator;
pub mod pki;
pub mod remote;
pub mod service;
pub mod store;
pub mod subject;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Errors
pub use error::{
    AcmeError, ChainError, ChallengeError, PkiError, RemoteError, RenewalError, RenewalResult,
    StoreError,
};

// Subjects
pub use subject::CertificateSubject;

// Orchestration
pub use orchestrator::{needs_renewal, RenewalOrchestrator, RenewalOutcome};
pub use service::{Collaborators, Renewer};

// ACME
pub use acme::{
    AcmeSessionDriver, DriverSettings, HttpAcmeDirectory, IssuedCertificate, RsaAccountKey,
};

// Chain resolution
pub use chain::ChainResolver;

// Challenges
pub use challenge::{ChallengeProvider, ChallengeTarget, DnsZoneClient, WafPolicyClient};

// Storage
pub use store::{AuditLog, CertificateStore, SecretStore, Stage};
