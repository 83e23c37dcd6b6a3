//! Certificate subjects and name normalization.

use renewer_config::RenewalRequest;
use tracing::error;

use crate::error::RenewalError;

/// Wildcard label prefix
const WILDCARD_PREFIX: &str = "*.";

/// Store-side name prefix for wildcard certificates
const WILDCARD_STORE_PREFIX: &str = "wildcard-";

/// The certificate a renewal run is about
///
/// A subject is either a wildcard name or a name with alternates, never both.
/// [`CertificateSubject::validate`] enforces that before anything remote is
/// touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSubject {
    common_name: String,
    alt_names: Vec<String>,
    renew_days_before_expiry: u32,
    auto_deploy: bool,
}

impl CertificateSubject {
    pub fn new(
        common_name: impl Into<String>,
        alt_names: Vec<String>,
        renew_days_before_expiry: u32,
    ) -> Self {
        Self {
            common_name: common_name.into(),
            alt_names,
            renew_days_before_expiry,
            auto_deploy: false,
        }
    }

    /// Store new versions as CURRENT instead of PENDING
    pub fn with_auto_deploy(mut self, auto_deploy: bool) -> Self {
        self.auto_deploy = auto_deploy;
        self
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn alt_names(&self) -> &[String] {
        &self.alt_names
    }

    pub fn renew_days_before_expiry(&self) -> u32 {
        self.renew_days_before_expiry
    }

    pub fn auto_deploy(&self) -> bool {
        self.auto_deploy
    }

    pub fn is_wildcard(&self) -> bool {
        self.common_name.starts_with(WILDCARD_PREFIX)
    }

    /// Reject subjects that cannot be issued
    pub fn validate(&self) -> Result<(), RenewalError> {
        if self.common_name.trim().is_empty() {
            error!("Certificate request has an empty common name");
            return Err(RenewalError::Configuration(
                "Certificate common name is empty.".to_string(),
            ));
        }

        if self.is_wildcard() && !self.alt_names.is_empty() {
            error!(
                domain = %self.common_name,
                "Certificate {} can be only type wildcard or SAN",
                self.common_name
            );
            return Err(RenewalError::Configuration(
                "Certificate has both wildcard and SAN configured.".to_string(),
            ));
        }

        Ok(())
    }

    /// Common name with any wildcard label removed
    pub fn base_domain(&self) -> &str {
        base_domain(&self.common_name)
    }

    /// Name the certificate is filed under in the certificate store
    pub fn store_name(&self) -> String {
        if self.is_wildcard() {
            format!("{}{}", WILDCARD_STORE_PREFIX, self.base_domain())
        } else {
            self.common_name.clone()
        }
    }

    /// Every name to be certified: the common name first, then alternates
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers = Vec::with_capacity(1 + self.alt_names.len());
        identifiers.push(self.common_name.clone());
        for name in &self.alt_names {
            if !identifiers.contains(name) {
                identifiers.push(name.clone());
            }
        }
        identifiers
    }
}

impl From<&RenewalRequest> for CertificateSubject {
    fn from(request: &RenewalRequest) -> Self {
        Self::new(
            request.cn_name.clone(),
            request.alt_names.clone(),
            request.renew_days_before_expiry,
        )
        .with_auto_deploy(request.auto_deploy)
    }
}

/// Strip a leading `*.` from a DNS name
pub fn base_domain(name: &str) -> &str {
    name.strip_prefix(WILDCARD_PREFIX).unwrap_or(name)
}
