//! ACME protocol seam and session driver
//!
//! # Architecture
//!
//! - [`AcmeDirectory`], [`AcmeAccount`], [`AcmeOrder`] - the protocol operations
//!   the driver needs, one trait per ACME resource
//! - [`HttpAcmeDirectory`] - RFC 8555 client signing with RSA account keys
//! - [`AcmeSessionDriver`] - runs one order from account resolution to the
//!   downloaded certificate and its chain
//!
//! The driver never pushes state changes: challenge and order status only
//! move through explicit "request validation" and "reload" calls.

mod client;
mod driver;
mod jws;

pub use client::HttpAcmeDirectory;
pub use driver::{AcmeSessionDriver, DriverSettings};
pub use jws::{RsaAccountKey, ACCOUNT_KEY_BITS};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AcmeError;

/// DNS label the DNS-01 TXT record is published under
pub const DNS_CHALLENGE_RECORD_NAME: &str = "_acme-challenge";

/// Record type of DNS-01 challenge records
pub const DNS_CHALLENGE_RECORD_TYPE: &str = "TXT";

/// HTTP-01 challenge path prefix
pub const HTTP_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Content type of HTTP-01 challenge responses
pub const HTTP_CHALLENGE_CONTENT_TYPE: &str = "text/plain";

// ============================================================================
// Protocol model
// ============================================================================

/// Supported challenge types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    Dns01,
    Http01,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeKind::Dns01 => f.write_str("dns-01"),
            ChallengeKind::Http01 => f.write_str("http-01"),
        }
    }
}

/// Challenge status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

impl ChallengeStatus {
    /// Whether the CA has reached a final verdict
    pub fn is_settled(self) -> bool {
        matches!(self, ChallengeStatus::Valid | ChallengeStatus::Invalid)
    }
}

/// Authorization status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Ready => "ready",
            OrderStatus::Processing => "processing",
            OrderStatus::Valid => "valid",
            OrderStatus::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// One challenge offered for an authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub kind: ChallengeKind,
    /// Challenge resource URL
    pub url: String,
    pub token: String,
    pub status: ChallengeStatus,
    /// `token.thumbprint`, served verbatim for HTTP-01
    pub key_authorization: String,
    /// Base64url SHA-256 digest of the key authorization, published for DNS-01
    pub dns_value: String,
}

impl Challenge {
    /// Leftmost label of the DNS-01 record
    pub fn record_name(&self) -> &str {
        DNS_CHALLENGE_RECORD_NAME
    }

    pub fn record_type(&self) -> &str {
        DNS_CHALLENGE_RECORD_TYPE
    }

    pub fn record_content(&self) -> &str {
        &self.dns_value
    }

    pub fn content_type(&self) -> &str {
        HTTP_CHALLENGE_CONTENT_TYPE
    }

    pub fn file_content(&self) -> &str {
        &self.key_authorization
    }

    /// Request path the CA fetches for HTTP-01
    pub fn well_known_path(&self) -> String {
        format!("{}{}", HTTP_CHALLENGE_PREFIX, self.token)
    }
}

/// Proof obligation for one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub identifier: String,
    pub status: AuthorizationStatus,
    pub challenges: Vec<Challenge>,
}

impl Authorization {
    /// Take the challenge of the requested type
    pub fn take_challenge(self, kind: ChallengeKind) -> Option<Challenge> {
        self.challenges.into_iter().find(|c| c.kind == kind)
    }
}

/// Stored ACME account key, PEM encoded
///
/// The only durable copy lives in the secret store.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountKey(Vec<u8>);

impl AccountKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountKey")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

/// Result of a successful run
#[derive(Clone)]
pub struct IssuedCertificate {
    pub leaf_pem: String,
    /// Issuer certificates, nearest issuer first
    pub chain: Vec<String>,
    pub private_key_pem: String,
    pub not_after: DateTime<Utc>,
}

impl IssuedCertificate {
    /// The chain as one concatenated PEM bundle
    pub fn chain_pem(&self) -> String {
        self.chain.concat()
    }
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("chain_length", &self.chain.len())
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Protocol traits
// ============================================================================

/// Entry point of an ACME server
#[async_trait]
pub trait AcmeDirectory: Send + Sync {
    /// Generate a new account key without registering it
    async fn generate_key(&self) -> Result<AccountKey, AcmeError>;

    /// Register the account bound to `key`, or re-attach if the server
    /// already knows the key
    async fn account(
        &self,
        key: &AccountKey,
        contact: &str,
    ) -> Result<Box<dyn AcmeAccount>, AcmeError>;
}

/// A registered ACME account
#[async_trait]
pub trait AcmeAccount: Send + Sync {
    /// Place an order for `identifiers`
    async fn new_order(&self, identifiers: &[String]) -> Result<Box<dyn AcmeOrder>, AcmeError>;
}

/// An order in flight
#[async_trait]
pub trait AcmeOrder: Send {
    /// Last known order status
    fn status(&mut self) -> OrderStatus;

    /// Authorizations, in the order the server lists them
    async fn authorizations(&mut self) -> Result<Vec<Authorization>, AcmeError>;

    /// Tell the server the challenge response is in place
    async fn request_validation(&mut self, challenge: &Challenge) -> Result<(), AcmeError>;

    /// Fetch the current status of a challenge
    async fn reload_challenge(&mut self, challenge: &Challenge)
        -> Result<ChallengeStatus, AcmeError>;

    /// Submit the DER encoded CSR
    async fn finalize(&mut self, csr_der: &[u8]) -> Result<(), AcmeError>;

    /// Fetch the current order status
    async fn reload(&mut self) -> Result<OrderStatus, AcmeError>;

    /// Download the issued certificate chain (PEM), if the order is valid
    async fn certificate(&mut self) -> Result<Option<String>, AcmeError>;
}
