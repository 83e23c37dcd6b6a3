//! Configuration for the ACME certificate renewer.
//!
//! Two inputs drive a renewal run:
//!
//! - [`RenewerConfig`] - service configuration (TOML), shared by every run:
//!   ACME directory, account contact, collaborator endpoints and timing.
//! - [`RenewalRequest`] - per-invocation request (JSON) naming the certificate
//!   subject and which challenge target to use.
//!
//! # Example
//!
//! ```toml
//! [acme]
//! directory_url = "https://acme-v02.api.letsencrypt.org/directory"
//! contact = "admin@example.com"
//! account_key_secret = "acme-account-key"
//!
//! [secrets]
//! path = "/var/lib/acme-renewer/secrets"
//!
//! [certificates]
//! path = "/var/lib/acme-renewer/certificates"
//!
//! [dns]
//! endpoint = "https://dns.example.net/v1"
//!
//! [timing]
//! propagation_delay_secs = 90
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};
use validator::Validate;

mod request;
mod timing;
pub mod validate;

pub use request::{RenewalRequest, MAX_RENEW_DAYS};
pub use timing::TimingConfig;

/// Let's Encrypt production directory URL
pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";

/// Let's Encrypt staging directory URL
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid renewal request: {0}")]
    Request(#[from] serde_json::Error),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

// ============================================================================
// Service Configuration
// ============================================================================

/// Root service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RenewerConfig {
    /// ACME account and directory settings
    #[validate(nested)]
    pub acme: AcmeConfig,

    /// Account key secret store
    pub secrets: FileStoreConfig,

    /// Issued certificate store
    pub certificates: FileStoreConfig,

    /// DNS zone API used for DNS-01 challenges
    #[serde(default)]
    #[validate(nested)]
    pub dns: Option<EndpointConfig>,

    /// WAF policy API used for HTTP-01 challenges
    #[serde(default)]
    #[validate(nested)]
    pub waf: Option<EndpointConfig>,

    /// Audit log sink
    #[serde(default)]
    pub audit: AuditConfig,

    /// Poll intervals, delays and retry limits
    #[serde(default)]
    #[validate(nested)]
    pub timing: TimingConfig,
}

impl RenewerConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        trace!(path = %path.display(), "Reading renewer configuration");

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::from_toml_str(&content)?;
        debug!(
            path = %path.display(),
            directory = %config.acme.directory_url,
            dns = config.dns.is_some(),
            waf = config.waf.is_some(),
            "Loaded renewer configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the ACME directory and contact, then re-validate
    pub fn apply_overrides(
        &mut self,
        directory_url: Option<String>,
        contact: Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = directory_url {
            debug!(directory = %url, "Overriding ACME directory URL");
            self.acme.directory_url = url;
        }
        if let Some(contact) = contact {
            debug!(contact = %contact, "Overriding ACME contact");
            self.acme.contact = contact;
        }
        self.validate()?;
        Ok(())
    }
}

/// ACME account and directory settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AcmeConfig {
    /// ACME directory URL
    #[serde(default = "default_directory_url")]
    #[validate(url)]
    pub directory_url: String,

    /// Account contact email (without `mailto:`)
    #[validate(email)]
    pub contact: String,

    /// Name of the secret holding the account key
    #[serde(default = "default_account_key_secret")]
    #[validate(length(min = 1, max = 255))]
    pub account_key_secret: String,
}

fn default_directory_url() -> String {
    LETS_ENCRYPT_PRODUCTION.to_string()
}

fn default_account_key_secret() -> String {
    "acme-account-key".to_string()
}

/// File-backed store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    /// Base directory
    pub path: PathBuf,
}

/// Remote REST API endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EndpointConfig {
    /// Base URL of the API
    #[validate(url)]
    pub endpoint: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1, max = 600))]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

/// Audit log sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Append audit entries as JSON lines to this file.
    /// When unset, audit entries are emitted as tracing events.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Source label recorded with every entry
    #[serde(default = "default_audit_source")]
    pub source: String,
}

fn default_audit_source() -> String {
    "acme-renewer".to_string()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            source: default_audit_source(),
        }
    }
}
