//! Renewal orchestration
//!
//! One run handles one certificate subject:
//!
//! ```text
//! validate subject ─▶ look up stored certificate ─▶ due? ──no──▶ audit, "Nothing to do"
//!                                                     │
//!                                                    yes
//!                                                     ▼
//!              ACME session (publish, validate, finalize, chain)
//!                                                     ▼
//!              create certificate / create version ─▶ audit, "Completed Successfully"
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use renewer_common::RetryPolicy;
use tracing::{debug, error, info, warn};

use crate::acme::{AcmeSessionDriver, IssuedCertificate};
use crate::challenge::ChallengeProvider;
use crate::error::{RenewalError, RenewalResult};
use crate::store::{AuditLog, CertificateRef, CertificateStore, CertificateVersion, Stage};
use crate::subject::CertificateSubject;

/// Outcome of a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// The stored certificate is not due yet
    NothingToDo,
    /// A new certificate or version was stored
    Completed,
}

impl fmt::Display for RenewalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenewalOutcome::NothingToDo => f.write_str("Nothing to do"),
            RenewalOutcome::Completed => f.write_str("Completed Successfully"),
        }
    }
}

/// Whether a certificate expiring at `not_after` is due at `now`
///
/// Due once `now + threshold_days` reaches the expiry; equality counts. A
/// threshold reaching past the representable range is always due.
pub fn needs_renewal(now: DateTime<Utc>, threshold_days: u32, not_after: DateTime<Utc>) -> bool {
    Duration::try_days(i64::from(threshold_days))
        .and_then(|threshold| now.checked_add_signed(threshold))
        .map_or(true, |due_at| due_at >= not_after)
}

/// Sequences one renewal run
pub struct RenewalOrchestrator {
    driver: AcmeSessionDriver,
    certificates: Arc<dyn CertificateStore>,
    audit: Arc<dyn AuditLog>,
    retry: RetryPolicy,
}

impl RenewalOrchestrator {
    pub fn new(
        driver: AcmeSessionDriver,
        certificates: Arc<dyn CertificateStore>,
        audit: Arc<dyn AuditLog>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            driver,
            certificates,
            audit,
            retry,
        }
    }

    /// Renew `subject` if it is due, publishing challenges through `provider`
    pub async fn run(
        &self,
        subject: &CertificateSubject,
        provider: &dyn ChallengeProvider,
    ) -> RenewalResult<RenewalOutcome> {
        subject.validate()?;

        let domain = subject.common_name();
        let store_name = subject.store_name();
        let now = Utc::now();

        let existing = self.lookup(domain, &store_name).await?;

        if let Some((certificate, Some(latest))) = &existing {
            if !needs_renewal(now, subject.renew_days_before_expiry(), latest.not_after) {
                info!(
                    domain = %domain,
                    expires = %latest.not_after,
                    threshold_days = subject.renew_days_before_expiry(),
                    "Certificate does not need to be renewed"
                );
                self.audit(
                    certificate,
                    &format!(
                        "[domain: {}] Certificate does not need to be renewed, expires on {}",
                        domain, latest.not_after
                    ),
                )
                .await;
                return Ok(RenewalOutcome::NothingToDo);
            }
            info!(
                domain = %domain,
                expires = %latest.not_after,
                "Certificate is due for renewal"
            );
        } else if existing.is_some() {
            info!(domain = %domain, "Stored certificate has no versions, issuing a new one");
        } else {
            info!(domain = %domain, "No stored certificate, issuing a new one");
        }

        let issued = self.driver.issue(subject, provider).await?;
        let stage = Stage::for_new_version(subject.auto_deploy());

        match existing {
            None => {
                let certificate = self.store_new(domain, &store_name, &issued, stage).await?;
                self.audit(
                    &certificate,
                    &format!(
                        "[domain: {}] Creating new cert, valid to {}",
                        domain,
                        issued.not_after.format("%Y-%m-%d")
                    ),
                )
                .await;
            }
            Some((certificate, _)) => {
                self.store_version(domain, &certificate, &issued, stage).await?;
                self.audit(
                    &certificate,
                    &format!(
                        "[domain: {}] Updating cert, valid to {}",
                        domain,
                        issued.not_after.format("%Y-%m-%d")
                    ),
                )
                .await;
            }
        }

        info!(
            domain = %domain,
            stage = %stage,
            expires = %issued.not_after,
            "Renewal completed"
        );
        Ok(RenewalOutcome::Completed)
    }

    /// Stored certificate and its newest version, if any
    async fn lookup(
        &self,
        domain: &str,
        store_name: &str,
    ) -> RenewalResult<Option<(CertificateRef, Option<CertificateVersion>)>> {
        let certificate = self
            .retry
            .run(domain, "certificate lookup", || {
                self.certificates.find_by_name(store_name)
            })
            .await?;

        let Some(certificate) = certificate else {
            debug!(domain = %domain, name = %store_name, "Certificate not found in store");
            return Ok(None);
        };

        let versions = self
            .retry
            .run(domain, "version listing", || {
                self.certificates.list_versions(&certificate)
            })
            .await?;

        Ok(Some((certificate, versions.into_iter().next())))
    }

    async fn store_new(
        &self,
        domain: &str,
        store_name: &str,
        issued: &IssuedCertificate,
        stage: Stage,
    ) -> RenewalResult<CertificateRef> {
        info!(
            domain = %domain,
            name = %store_name,
            stage = %stage,
            "Creating certificate in store"
        );
        self.retry
            .run(domain, "certificate creation", || {
                self.certificates.create_certificate(store_name, issued, stage)
            })
            .await
            .map_err(|e| {
                error!(domain = %domain, error = %e, "Failed to store new certificate");
                RenewalError::from(e)
            })
    }

    async fn store_version(
        &self,
        domain: &str,
        certificate: &CertificateRef,
        issued: &IssuedCertificate,
        stage: Stage,
    ) -> RenewalResult<CertificateVersion> {
        info!(
            domain = %domain,
            name = %certificate.name,
            stage = %stage,
            "Adding certificate version"
        );
        self.retry
            .run(domain, "version creation", || {
                self.certificates.create_version(certificate, issued, stage)
            })
            .await
            .map_err(|e| {
                error!(domain = %domain, error = %e, "Failed to store certificate version");
                RenewalError::from(e)
            })
    }

    async fn audit(&self, certificate: &CertificateRef, message: &str) {
        if let Err(e) = self.audit.append(certificate, message, Utc::now()).await {
            warn!(certificate = %certificate.name, error = %e, "Failed to write audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_decision_boundary() {
        let now = at(1_700_000_000);
        let threshold = 30;
        let boundary = now + Duration::days(30);

        assert!(needs_renewal(now, threshold, boundary));
        assert!(needs_renewal(now, threshold, boundary - Duration::seconds(1)));
        assert!(!needs_renewal(now, threshold, boundary + Duration::seconds(1)));
    }

    #[test]
    fn test_expired_certificate_is_due() {
        let now = at(1_700_000_000);
        assert!(needs_renewal(now, 0, now - Duration::days(1)));
    }

    #[test]
    fn test_threshold_beyond_calendar_is_due() {
        let now = at(1_700_000_000);
        assert!(needs_renewal(now, u32::MAX, now + Duration::days(90)));
        assert!(needs_renewal(now, u32::MAX, DateTime::<Utc>::MAX_UTC));
        assert!(needs_renewal(DateTime::<Utc>::MAX_UTC, 1, now));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(RenewalOutcome::NothingToDo.to_string(), "Nothing to do");
        assert_eq!(RenewalOutcome::Completed.to_string(), "Completed Successfully");
    }

    proptest! {
        #[test]
        fn prop_due_iff_within_threshold(
            now in 0i64..4_000_000_000,
            threshold in 0u32..400,
            offset in -100_000_000i64..100_000_000,
        ) {
            let now = at(now);
            let not_after = now + Duration::seconds(offset);
            let due = needs_renewal(now, threshold, not_after);
            prop_assert_eq!(due, offset <= i64::from(threshold) * 86_400);
        }

        #[test]
        fn prop_larger_threshold_never_undoes_renewal(
            offset in -10_000_000i64..100_000_000,
            threshold in 0u32..365,
            extra in 0u32..365,
        ) {
            let now = at(1_700_000_000);
            let not_after = now + Duration::seconds(offset);
            if needs_renewal(now, threshold, not_after) {
                prop_assert!(needs_renewal(now, threshold + extra, not_after));
            }
        }
    }
}
