//! Challenge fulfillment
//!
//! A [`ChallengeProvider`] makes a challenge response visible to the CA
//! through one external system:
//!
//! - [`DnsChallengeProvider`] - DNS-01, a TXT record in a managed zone
//! - [`WafChallengeProvider`] - HTTP-01, a static response rule in a WAF policy
//!
//! The provider is chosen once per run by [`select_provider`]. Providers only
//! publish; they never look at challenge status.

mod dns;
mod waf;

pub use dns::{
    DnsChallengeProvider, DnsRecord, DnsZoneClient, RecordOperation, RecordOperationKind,
};
pub use waf::{
    AccessControlRule, RequestAccessControl, ResponseBody, ResponseHeader, WafAction,
    WafChallengeProvider, WafPolicy, WafPolicyClient,
};

use std::sync::Arc;

use async_trait::async_trait;
use renewer_common::RetryPolicy;
use renewer_config::RenewalRequest;
use tracing::{debug, error};

use crate::acme::{Challenge, ChallengeKind};
use crate::error::{ChallengeError, RenewalError};

/// Publishes challenge responses
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    /// Challenge type this provider can fulfill
    fn kind(&self) -> ChallengeKind;

    /// Make the response for `challenge` on `subject_name` visible to the CA
    async fn publish(
        &self,
        subject_name: &str,
        challenge: &Challenge,
    ) -> Result<(), ChallengeError>;
}

/// Where challenge responses are published for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeTarget {
    /// DNS-01 records in the named zone
    DnsZone(String),
    /// HTTP-01 responses through the identified WAF policy
    WafPolicy(String),
}

impl ChallengeTarget {
    /// DNS when a zone is named, otherwise WAF when a policy is named
    pub fn from_request(request: &RenewalRequest) -> Result<Self, RenewalError> {
        if let Some(zone) = non_empty(request.dns_zone_name.as_deref()) {
            return Ok(ChallengeTarget::DnsZone(zone.to_string()));
        }
        if let Some(policy) = non_empty(request.waf_policy_id.as_deref()) {
            return Ok(ChallengeTarget::WafPolicy(policy.to_string()));
        }

        error!(domain = %request.cn_name, "Request names neither a DNS zone nor a WAF policy");
        Err(RenewalError::Configuration(
            "Either dns_zone_name or waf_policy_id must be set.".to_string(),
        ))
    }

    pub fn kind(&self) -> ChallengeKind {
        match self {
            ChallengeTarget::DnsZone(_) => ChallengeKind::Dns01,
            ChallengeTarget::WafPolicy(_) => ChallengeKind::Http01,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Build the provider for `target` from the configured clients
pub fn select_provider(
    target: &ChallengeTarget,
    dns: Option<Arc<dyn DnsZoneClient>>,
    waf: Option<Arc<dyn WafPolicyClient>>,
    retry: RetryPolicy,
) -> Result<Box<dyn ChallengeProvider>, RenewalError> {
    match target {
        ChallengeTarget::DnsZone(zone) => {
            let client = dns.ok_or_else(|| {
                RenewalError::Configuration("No DNS zone client is configured.".to_string())
            })?;
            debug!(zone = %zone, "Using DNS-01 challenges");
            Ok(Box::new(DnsChallengeProvider::new(client, zone.clone(), retry)))
        }
        ChallengeTarget::WafPolicy(policy) => {
            let client = waf.ok_or_else(|| {
                RenewalError::Configuration("No WAF policy client is configured.".to_string())
            })?;
            debug!(policy = %policy, "Using HTTP-01 challenges");
            Ok(Box::new(WafChallengeProvider::new(client, policy.clone(), retry)))
        }
    }
}

/// Make a name usable as a WAF object identifier (`.` becomes `-`)
pub fn slug(name: &str) -> String {
    name.replace('.', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(zone: Option<&str>, policy: Option<&str>) -> RenewalRequest {
        RenewalRequest {
            cn_name: "app.example.com".into(),
            alt_names: vec![],
            renew_days_before_expiry: 30,
            auto_deploy: false,
            dns_zone_name: zone.map(String::from),
            waf_policy_id: policy.map(String::from),
        }
    }

    #[test]
    fn test_dns_preferred_over_waf() {
        let target =
            ChallengeTarget::from_request(&request(Some("example.com"), Some("p1"))).unwrap();
        assert_eq!(target, ChallengeTarget::DnsZone("example.com".into()));
        assert_eq!(target.kind(), ChallengeKind::Dns01);
    }

    #[test]
    fn test_waf_when_no_zone() {
        let target = ChallengeTarget::from_request(&request(Some(" "), Some("p1"))).unwrap();
        assert_eq!(target, ChallengeTarget::WafPolicy("p1".into()));
        assert_eq!(target.kind(), ChallengeKind::Http01);
    }

    #[test]
    fn test_neither_is_configuration_error() {
        assert!(matches!(
            ChallengeTarget::from_request(&request(None, None)),
            Err(RenewalError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_client_is_configuration_error() {
        let target = ChallengeTarget::DnsZone("example.com".into());
        let result = select_provider(&target, None, None, RetryPolicy::default());
        assert!(matches!(result, Err(RenewalError::Configuration(_))));
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("app.example.com"), "app-example-com");
    }
}
