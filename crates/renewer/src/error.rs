//! Error types for the renewer.
//!
//! [`RenewalError`] is the top-level taxonomy returned by a renewal run. The
//! narrower enums belong to the collaborators and are folded into it.

use thiserror::Error;

/// Result type for renewal runs
pub type RenewalResult<T> = Result<T, RenewalError>;

/// Errors that end a renewal run
#[derive(Debug, Error)]
pub enum RenewalError {
    /// Invalid subject or collaborator selection; never retried
    #[error("configuration error: {0}")]
    Configuration(String),

    /// DNS, WAF, secret or certificate store failure (after retries where retried)
    #[error("remote operation failed: {0}")]
    TransientRemote(#[source] RemoteError),

    /// ACME account, order, validation or finalization failure
    #[error("ACME protocol error: {0}")]
    Protocol(#[from] AcmeError),

    /// Walking the issuer chain failed
    #[error("certificate chain resolution failed: {0}")]
    ChainResolution(#[from] ChainError),
}

/// Failures of externally owned, read-modify-write collaborators
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ChallengeError> for RenewalError {
    fn from(err: ChallengeError) -> Self {
        RenewalError::TransientRemote(RemoteError::Challenge(err))
    }
}

impl From<StoreError> for RenewalError {
    fn from(err: StoreError) -> Self {
        RenewalError::TransientRemote(RemoteError::Store(err))
    }
}

/// ACME protocol errors
#[derive(Debug, Error)]
pub enum AcmeError {
    #[error("ACME directory error: {0}")]
    Directory(String),

    #[error("account error: {0}")]
    Account(String),

    #[error("invalid account key: {0}")]
    AccountKey(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("order error: {0}")]
    Order(String),

    #[error("no {kind} challenge offered for {identifier}")]
    MissingChallenge { identifier: String, kind: String },

    #[error("challenge error: {0}")]
    Challenge(String),

    #[error("gave up waiting for {stage} after {polls} status checks")]
    PollLimit { stage: &'static str, polls: u32 },

    #[error("failed to build certificate request: {0}")]
    Csr(String),

    #[error("finalization error: {0}")]
    Finalize(String),

    #[error("certificate error: {0}")]
    Certificate(String),
}

/// Challenge publication errors
#[derive(Debug, Error)]
pub enum ChallengeError {
    #[error("DNS zone update failed: {0}")]
    Dns(String),

    #[error("WAF policy update failed: {0}")]
    Waf(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Secret store, certificate store and audit log errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("certificate not found: {0}")]
    NotFound(String),

    #[error("certificate already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid certificate material: {0}")]
    InvalidCertificate(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Chain resolution errors
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("failed to fetch issuer certificate from {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("invalid issuer certificate from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("invalid certificate: {0}")]
    Certificate(String),

    #[error("issuer chain loops back to {0}")]
    Cycle(String),

    #[error("issuer chain longer than {0} certificates")]
    DepthExceeded(usize),
}

/// PEM, X.509 and key generation errors
#[derive(Debug, Error)]
pub enum PkiError {
    #[error("invalid PEM: {0}")]
    Pem(String),

    #[error("invalid X.509 certificate: {0}")]
    X509(String),

    #[error("no certificate found in input")]
    Empty,

    #[error("key or CSR generation failed: {0}")]
    Generation(#[from] rcgen::Error),
}
