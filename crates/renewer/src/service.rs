//! Wiring of a renewer from its configuration.

use std::sync::Arc;

use renewer_common::RetryPolicy;
use renewer_config::{RenewalRequest, RenewerConfig};
use tracing::{debug, info};

use crate::acme::{AcmeDirectory, AcmeSessionDriver, DriverSettings, HttpAcmeDirectory};
use crate::chain::ChainResolver;
use crate::challenge::{select_provider, ChallengeTarget, DnsZoneClient, WafPolicyClient};
use crate::error::{RenewalError, RenewalResult};
use crate::orchestrator::{RenewalOrchestrator, RenewalOutcome};
use crate::remote::{HttpDnsZoneClient, HttpWafPolicyClient};
use crate::store::{
    AuditLog, CertificateStore, FileCertificateStore, FileSecretStore, JsonLinesAuditLog,
    SecretStore, TracingAuditLog,
};
use crate::subject::CertificateSubject;

/// External systems a renewer talks to
pub struct Collaborators {
    pub directory: Arc<dyn AcmeDirectory>,
    pub secrets: Arc<dyn SecretStore>,
    pub certificates: Arc<dyn CertificateStore>,
    pub audit: Arc<dyn AuditLog>,
    pub dns: Option<Arc<dyn DnsZoneClient>>,
    pub waf: Option<Arc<dyn WafPolicyClient>>,
}

/// Handles renewal requests against one set of collaborators
pub struct Renewer {
    orchestrator: RenewalOrchestrator,
    dns: Option<Arc<dyn DnsZoneClient>>,
    waf: Option<Arc<dyn WafPolicyClient>>,
    retry: RetryPolicy,
}

impl Renewer {
    pub fn new(
        collaborators: Collaborators,
        chain: ChainResolver,
        settings: DriverSettings,
        retry: RetryPolicy,
    ) -> Self {
        let driver = AcmeSessionDriver::new(
            collaborators.directory,
            collaborators.secrets,
            chain,
            settings,
        );

        Self {
            orchestrator: RenewalOrchestrator::new(
                driver,
                collaborators.certificates,
                collaborators.audit,
                retry,
            ),
            dns: collaborators.dns,
            waf: collaborators.waf,
            retry,
        }
    }

    /// Build the production collaborators described by `config`
    pub async fn from_config(config: &RenewerConfig) -> RenewalResult<Self> {
        let secrets = FileSecretStore::open(&config.secrets.path).await?;
        let certificates = FileCertificateStore::open(&config.certificates.path).await?;

        let audit: Arc<dyn AuditLog> = match &config.audit.log_file {
            Some(path) => Arc::new(JsonLinesAuditLog::new(path, config.audit.source.clone())),
            None => Arc::new(TracingAuditLog::new(config.audit.source.clone())),
        };

        let dns: Option<Arc<dyn DnsZoneClient>> = match &config.dns {
            Some(endpoint) => Some(Arc::new(HttpDnsZoneClient::from_config(endpoint)?)),
            None => None,
        };
        let waf: Option<Arc<dyn WafPolicyClient>> = match &config.waf {
            Some(endpoint) => Some(Arc::new(HttpWafPolicyClient::from_config(endpoint)?)),
            None => None,
        };

        let directory = HttpAcmeDirectory::new(config.acme.directory_url.clone())
            .map_err(|e| RenewalError::Configuration(e.to_string()))?;
        let chain = ChainResolver::new(config.timing.chain_max_depth)
            .map_err(|e| RenewalError::Configuration(e.to_string()))?;

        let retry = RetryPolicy::new(config.timing.retry_attempts, config.timing.retry_delay());

        info!(
            directory = %config.acme.directory_url,
            dns = dns.is_some(),
            waf = waf.is_some(),
            retry_attempts = retry.max_attempts(),
            "Renewer configured"
        );

        Ok(Self::new(
            Collaborators {
                directory: Arc::new(directory),
                secrets: Arc::new(secrets),
                certificates: Arc::new(certificates),
                audit,
                dns,
                waf,
            },
            chain,
            DriverSettings::from_config(config),
            retry,
        ))
    }

    /// Handle one renewal request
    pub async fn renew(&self, request: &RenewalRequest) -> RenewalResult<RenewalOutcome> {
        let subject = CertificateSubject::from(request);
        subject.validate()?;

        let target = ChallengeTarget::from_request(request)?;
        debug!(domain = %subject.common_name(), target = ?target, "Selected challenge target");

        let provider = select_provider(&target, self.dns.clone(), self.waf.clone(), self.retry)?;
        self.orchestrator.run(&subject, provider.as_ref()).await
    }
}
