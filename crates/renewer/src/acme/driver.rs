//! ACME session driver
//!
//! Runs one order against the configured directory: resolves the account,
//! publishes a challenge response for every pending authorization, waits for
//! the CA's verdict, finalizes with a fresh key and downloads the certificate
//! together with its issuer chain.

use std::sync::Arc;
use std::time::Duration;

use renewer_config::RenewerConfig;
use tracing::{debug, error, info, warn};

use super::{
    AccountKey, AcmeAccount, AcmeDirectory, AcmeOrder, AuthorizationStatus, Challenge,
    ChallengeStatus, IssuedCertificate, OrderStatus,
};
use crate::chain::ChainResolver;
use crate::challenge::ChallengeProvider;
use crate::error::{AcmeError, RenewalResult};
use crate::pki::{self, CertificateInfo};
use crate::store::SecretStore;
use crate::subject::CertificateSubject;

/// Default settle time between publishing challenges and requesting validation
pub const DEFAULT_PROPAGATION_DELAY: Duration = Duration::from_secs(90);

/// Default interval between challenge status checks
pub const DEFAULT_VALIDATION_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Default interval between order status checks after finalization
pub const DEFAULT_ORDER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Knobs of one ACME session
#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Account contact email
    pub contact: String,
    /// Secret store name of the account key
    pub account_key_secret: String,
    pub propagation_delay: Duration,
    pub validation_poll_interval: Duration,
    pub order_poll_interval: Duration,
    /// Give up after this many status checks; unbounded when `None`
    pub max_polls: Option<u32>,
}

impl DriverSettings {
    pub fn new(contact: impl Into<String>, account_key_secret: impl Into<String>) -> Self {
        Self {
            contact: contact.into(),
            account_key_secret: account_key_secret.into(),
            propagation_delay: DEFAULT_PROPAGATION_DELAY,
            validation_poll_interval: DEFAULT_VALIDATION_POLL_INTERVAL,
            order_poll_interval: DEFAULT_ORDER_POLL_INTERVAL,
            max_polls: None,
        }
    }

    pub fn from_config(config: &RenewerConfig) -> Self {
        Self {
            contact: config.acme.contact.clone(),
            account_key_secret: config.acme.account_key_secret.clone(),
            propagation_delay: config.timing.propagation_delay(),
            validation_poll_interval: config.timing.validation_poll_interval(),
            order_poll_interval: config.timing.order_poll_interval(),
            max_polls: config.timing.max_validation_polls,
        }
    }

    /// Zero every wait; used by tests driving in-memory fakes
    pub fn without_delays(mut self) -> Self {
        self.propagation_delay = Duration::ZERO;
        self.validation_poll_interval = Duration::ZERO;
        self.order_poll_interval = Duration::ZERO;
        self
    }
}

/// Drives a single ACME order end to end
pub struct AcmeSessionDriver {
    directory: Arc<dyn AcmeDirectory>,
    secrets: Arc<dyn SecretStore>,
    chain: ChainResolver,
    settings: DriverSettings,
}

impl AcmeSessionDriver {
    pub fn new(
        directory: Arc<dyn AcmeDirectory>,
        secrets: Arc<dyn SecretStore>,
        chain: ChainResolver,
        settings: DriverSettings,
    ) -> Self {
        Self {
            directory,
            secrets,
            chain,
            settings,
        }
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Obtain a certificate for `subject`, proving control through `provider`
    pub async fn issue(
        &self,
        subject: &CertificateSubject,
        provider: &dyn ChallengeProvider,
    ) -> RenewalResult<IssuedCertificate> {
        let domain = subject.common_name();

        let account = self.resolve_account().await.inspect_err(|e| {
            error!(domain = %domain, error = %e, "Failed to resolve ACME account");
        })?;

        let identifiers = subject.identifiers();
        info!(domain = %domain, identifiers = ?identifiers, "Creating ACME order");

        let mut order = account.new_order(&identifiers).await.inspect_err(|e| {
            error!(domain = %domain, error = %e, "Failed to create ACME order");
        })?;

        let challenges = self
            .publish_challenges(order.as_mut(), &identifiers, provider)
            .await
            .inspect_err(|e| {
                error!(domain = %domain, error = %e, "Failed to prepare challenges");
            })?;

        if !challenges.is_empty() {
            info!(
                domain = %domain,
                delay_secs = self.settings.propagation_delay.as_secs(),
                "Waiting {}s while DNS propagates",
                self.settings.propagation_delay.as_secs()
            );
            tokio::time::sleep(self.settings.propagation_delay).await;

            self.await_validation(order.as_mut(), &challenges)
                .await
                .inspect_err(|e| {
                    error!(domain = %domain, error = %e, "Challenge validation failed");
                })?;
        }

        let (certificate_pem, private_key_pem) = self
            .finalize(order.as_mut(), subject, &identifiers)
            .await
            .inspect_err(|e| {
                error!(domain = %domain, error = %e, "Failed to finalize ACME order");
            })?;

        self.assemble(domain, &certificate_pem, private_key_pem)
            .await
            .inspect_err(|e| {
                error!(domain = %domain, error = %e, "Failed to assemble issued certificate");
            })
    }

    /// Attach to the account of the stored key, generating and persisting a
    /// key first if none is stored
    async fn resolve_account(&self) -> RenewalResult<Box<dyn AcmeAccount>> {
        let name = &self.settings.account_key_secret;

        let key = match self.secrets.get_secret(name).await? {
            Some(bytes) => {
                debug!(secret = %name, "Using stored ACME account key");
                AccountKey::new(bytes)
            }
            None => self.create_account_key().await?,
        };

        Ok(self.directory.account(&key, &self.settings.contact).await?)
    }

    /// The key is persisted before any request is signed with it
    async fn create_account_key(&self) -> RenewalResult<AccountKey> {
        let name = &self.settings.account_key_secret;

        info!(secret = %name, "No ACME account key stored, generating one");
        let key = self.directory.generate_key().await?;

        // check-then-set: another writer may have stored a key meanwhile
        if let Some(existing) = self.secrets.get_secret(name).await? {
            warn!(secret = %name, "ACME account key appeared concurrently, using stored key");
            return Ok(AccountKey::new(existing));
        }

        self.secrets.put_secret(name, key.as_bytes()).await?;
        info!(secret = %name, "Stored new ACME account key");

        Ok(key)
    }

    /// Publish a response for every authorization still awaiting proof
    async fn publish_challenges(
        &self,
        order: &mut dyn AcmeOrder,
        identifiers: &[String],
        provider: &dyn ChallengeProvider,
    ) -> RenewalResult<Vec<Challenge>> {
        let authorizations = order.authorizations().await?;

        if authorizations.len() != identifiers.len() {
            return Err(AcmeError::Order(format!(
                "expected {} authorizations, server returned {}",
                identifiers.len(),
                authorizations.len()
            ))
            .into());
        }

        let kind = provider.kind();
        let mut challenges = Vec::with_capacity(authorizations.len());

        for (name, authorization) in identifiers.iter().zip(authorizations) {
            if authorization.status == AuthorizationStatus::Valid {
                debug!(identifier = %name, "Authorization already valid, skipping");
                continue;
            }

            let challenge =
                authorization
                    .take_challenge(kind)
                    .ok_or_else(|| AcmeError::MissingChallenge {
                        identifier: name.clone(),
                        kind: kind.to_string(),
                    })?;

            debug!(
                identifier = %name,
                challenge_type = %kind,
                token = %challenge.token,
                "Publishing challenge"
            );
            provider.publish(name, &challenge).await?;
            challenges.push(challenge);
        }

        Ok(challenges)
    }

    /// Request validation of every challenge and wait until the CA has decided
    async fn await_validation(
        &self,
        order: &mut dyn AcmeOrder,
        challenges: &[Challenge],
    ) -> RenewalResult<()> {
        for challenge in challenges {
            order.request_validation(challenge).await?;
        }

        let mut statuses = vec![ChallengeStatus::Pending; challenges.len()];
        let mut polls = 0u32;

        loop {
            for (challenge, status) in challenges.iter().zip(statuses.iter_mut()) {
                if !status.is_settled() {
                    *status = order.reload_challenge(challenge).await?;
                }
            }
            polls += 1;

            let unsettled = statuses.iter().filter(|s| !s.is_settled()).count();
            if unsettled == 0 {
                break;
            }

            if self.settings.max_polls.is_some_and(|max| polls >= max) {
                return Err(AcmeError::PollLimit {
                    stage: "challenge validation",
                    polls,
                }
                .into());
            }

            debug!(unsettled, polls, "Waiting for challenge validation");
            tokio::time::sleep(self.settings.validation_poll_interval).await;
        }

        let invalid: Vec<&str> = challenges
            .iter()
            .zip(&statuses)
            .filter(|(_, status)| **status == ChallengeStatus::Invalid)
            .map(|(challenge, _)| challenge.url.as_str())
            .collect();

        if invalid.is_empty() {
            info!(challenges = challenges.len(), "All challenges validated");
        } else {
            // finalization reports the actual failure
            warn!(invalid = ?invalid, "One or more DNS challenges failed");
        }

        Ok(())
    }

    /// Submit a CSR under a fresh key and wait for issuance
    async fn finalize(
        &self,
        order: &mut dyn AcmeOrder,
        subject: &CertificateSubject,
        identifiers: &[String],
    ) -> RenewalResult<(String, String)> {
        info!(domain = %subject.common_name(), "Creating certificate request");

        let key_pair = pki::generate_certificate_key().map_err(|e| AcmeError::Csr(e.to_string()))?;
        let csr = pki::certificate_signing_request(&key_pair, subject.common_name(), identifiers)
            .map_err(|e| AcmeError::Csr(e.to_string()))?;

        order.finalize(&csr).await?;

        let mut status = order.status();
        let mut polls = 0u32;
        while status == OrderStatus::Processing {
            if self.settings.max_polls.is_some_and(|max| polls >= max) {
                return Err(AcmeError::PollLimit {
                    stage: "order processing",
                    polls,
                }
                .into());
            }
            tokio::time::sleep(self.settings.order_poll_interval).await;
            status = order.reload().await?;
            polls += 1;
        }

        if status != OrderStatus::Valid {
            return Err(AcmeError::Finalize(format!("order ended in status {}", status)).into());
        }

        let certificate = order
            .certificate()
            .await?
            .ok_or_else(|| AcmeError::Certificate("order valid but no certificate".into()))?;

        Ok((certificate, key_pair.serialize_pem()))
    }

    /// Split the download into leaf and chain
    async fn assemble(
        &self,
        domain: &str,
        certificate_pem: &str,
        private_key_pem: String,
    ) -> RenewalResult<IssuedCertificate> {
        let mut certificates = pki::parse_pem_certificates(certificate_pem.as_bytes())
            .map_err(|e| AcmeError::Certificate(e.to_string()))?;
        let leaf = certificates.remove(0);

        let info =
            CertificateInfo::from_der(&leaf).map_err(|e| AcmeError::Certificate(e.to_string()))?;

        let chain = if info.has_authority_info_access {
            info!(domain = %domain, "Retrieving certificate chain");
            self.chain.resolve(&leaf).await?
        } else {
            certificates.iter().map(|der| pki::der_to_pem(der)).collect()
        };

        info!(
            domain = %domain,
            not_after = %info.not_after,
            chain_length = chain.len(),
            "Certificate issued"
        );

        Ok(IssuedCertificate {
            leaf_pem: pki::der_to_pem(&leaf),
            chain,
            private_key_pem,
            not_after: info.not_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acme::{Authorization, ChallengeKind};
    use crate::error::{ChallengeError, RenewalError, StoreError};
    use async_trait::async_trait;
    use rcgen::{CertificateParams, KeyPair};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySecrets {
        values: Mutex<HashMap<String, Vec<u8>>>,
        puts: Mutex<u32>,
        /// Stored by "another writer" on the second read
        racing_value: Mutex<Option<Vec<u8>>>,
        reads: Mutex<u32>,
    }

    #[async_trait]
    impl SecretStore for MemorySecrets {
        async fn get_secret(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
            let mut reads = self.reads.lock().unwrap();
            *reads += 1;
            if *reads == 2 {
                if let Some(value) = self.racing_value.lock().unwrap().take() {
                    self.values.lock().unwrap().insert(name.to_string(), value);
                }
            }
            Ok(self.values.lock().unwrap().get(name).cloned())
        }

        async fn put_secret(&self, name: &str, value: &[u8]) -> Result<(), StoreError> {
            *self.puts.lock().unwrap() += 1;
            self.values
                .lock()
                .unwrap()
                .insert(name.to_string(), value.to_vec());
            Ok(())
        }
    }

    struct FakeDirectory {
        order: Mutex<Option<FakeOrder>>,
        attached_with: Mutex<Vec<Vec<u8>>>,
        generated: Mutex<u32>,
        reject_registration: bool,
    }

    impl FakeDirectory {
        fn new(order: FakeOrder) -> Self {
            Self {
                order: Mutex::new(Some(order)),
                attached_with: Mutex::new(Vec::new()),
                generated: Mutex::new(0),
                reject_registration: false,
            }
        }
    }

    struct FakeAccount {
        order: Mutex<Option<FakeOrder>>,
    }

    #[async_trait]
    impl AcmeDirectory for FakeDirectory {
        async fn generate_key(&self) -> Result<AccountKey, AcmeError> {
            *self.generated.lock().unwrap() += 1;
            Ok(AccountKey::new(b"fresh-key".to_vec()))
        }

        async fn account(
            &self,
            key: &AccountKey,
            _contact: &str,
        ) -> Result<Box<dyn AcmeAccount>, AcmeError> {
            self.attached_with.lock().unwrap().push(key.as_bytes().to_vec());
            if self.reject_registration {
                return Err(AcmeError::Account("registration refused".into()));
            }
            Ok(Box::new(FakeAccount {
                order: Mutex::new(self.order.lock().unwrap().take()),
            }))
        }
    }

    #[async_trait]
    impl AcmeAccount for FakeAccount {
        async fn new_order(
            &self,
            _identifiers: &[String],
        ) -> Result<Box<dyn AcmeOrder>, AcmeError> {
            self.order
                .lock()
                .unwrap()
                .take()
                .map(|o| Box::new(o) as Box<dyn AcmeOrder>)
                .ok_or_else(|| AcmeError::Order("no order".into()))
        }
    }

    struct FakeOrder {
        authorizations: Vec<Authorization>,
        challenge_statuses: VecDeque<ChallengeStatus>,
        order_statuses: VecDeque<OrderStatus>,
        status: OrderStatus,
        certificate: String,
    }

    #[async_trait]
    impl AcmeOrder for FakeOrder {
        fn status(&mut self) -> OrderStatus {
            self.status
        }

        async fn authorizations(&mut self) -> Result<Vec<Authorization>, AcmeError> {
            Ok(self.authorizations.clone())
        }

        async fn request_validation(&mut self, _challenge: &Challenge) -> Result<(), AcmeError> {
            Ok(())
        }

        async fn reload_challenge(
            &mut self,
            _challenge: &Challenge,
        ) -> Result<ChallengeStatus, AcmeError> {
            Ok(self
                .challenge_statuses
                .pop_front()
                .unwrap_or(ChallengeStatus::Valid))
        }

        async fn finalize(&mut self, _csr_der: &[u8]) -> Result<(), AcmeError> {
            self.status = self.order_statuses.pop_front().unwrap_or(OrderStatus::Valid);
            Ok(())
        }

        async fn reload(&mut self) -> Result<OrderStatus, AcmeError> {
            self.status = self.order_statuses.pop_front().unwrap_or(OrderStatus::Valid);
            Ok(self.status)
        }

        async fn certificate(&mut self) -> Result<Option<String>, AcmeError> {
            Ok(Some(self.certificate.clone()))
        }
    }

    #[derive(Default)]
    struct RecordingProvider {
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChallengeProvider for RecordingProvider {
        fn kind(&self) -> ChallengeKind {
            ChallengeKind::Dns01
        }

        async fn publish(
            &self,
            subject_name: &str,
            challenge: &Challenge,
        ) -> Result<(), ChallengeError> {
            self.published
                .lock()
                .unwrap()
                .push((subject_name.to_string(), challenge.token.clone()));
            Ok(())
        }
    }

    fn pending_authorization(identifier: &str, kind: ChallengeKind) -> Authorization {
        Authorization {
            identifier: identifier.to_string(),
            status: AuthorizationStatus::Pending,
            challenges: vec![Challenge {
                kind,
                url: format!("https://ca.test/chall/{}", identifier),
                token: format!("token-{}", identifier),
                status: ChallengeStatus::Pending,
                key_authorization: "tok.thumb".into(),
                dns_value: "digest".into(),
            }],
        }
    }

    fn issued_pem(name: &str) -> String {
        let params = CertificateParams::new(vec![name.to_string()]).unwrap();
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().pem()
    }

    fn order(authorizations: Vec<Authorization>) -> FakeOrder {
        FakeOrder {
            authorizations,
            challenge_statuses: VecDeque::new(),
            order_statuses: VecDeque::new(),
            status: OrderStatus::Pending,
            certificate: issued_pem("app.example.com"),
        }
    }

    fn driver(directory: Arc<FakeDirectory>, secrets: Arc<MemorySecrets>) -> AcmeSessionDriver {
        AcmeSessionDriver::new(
            directory,
            secrets,
            ChainResolver::new(crate::chain::DEFAULT_MAX_DEPTH).unwrap(),
            DriverSettings::new("admin@example.com", "acme-account-key").without_delays(),
        )
    }

    #[tokio::test]
    async fn test_issue_creates_and_persists_account_key() {
        let directory = Arc::new(FakeDirectory::new(order(vec![pending_authorization(
            "app.example.com",
            ChallengeKind::Dns01,
        )])));
        let secrets = Arc::new(MemorySecrets::default());
        let provider = RecordingProvider::default();
        let subject = CertificateSubject::new("app.example.com", vec![], 30);

        let issued = driver(directory.clone(), secrets.clone())
            .issue(&subject, &provider)
            .await
            .unwrap();

        assert_eq!(*directory.generated.lock().unwrap(), 1);
        assert_eq!(*secrets.puts.lock().unwrap(), 1);
        assert_eq!(
            secrets.values.lock().unwrap().get("acme-account-key").cloned(),
            Some(b"fresh-key".to_vec())
        );
        assert_eq!(*directory.attached_with.lock().unwrap(), vec![b"fresh-key".to_vec()]);
        assert_eq!(provider.published.lock().unwrap().len(), 1);
        assert!(issued.chain.is_empty());
        assert!(issued.private_key_pem.contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn test_issue_reuses_stored_account_key() {
        let directory = Arc::new(FakeDirectory::new(order(vec![pending_authorization(
            "app.example.com",
            ChallengeKind::Dns01,
        )])));
        let secrets = Arc::new(MemorySecrets::default());
        secrets
            .values
            .lock()
            .unwrap()
            .insert("acme-account-key".into(), b"stored".to_vec());

        let subject = CertificateSubject::new("app.example.com", vec![], 30);
        driver(directory.clone(), secrets.clone())
            .issue(&subject, &RecordingProvider::default())
            .await
            .unwrap();

        assert_eq!(*directory.generated.lock().unwrap(), 0);
        assert_eq!(*secrets.puts.lock().unwrap(), 0);
        assert_eq!(*directory.attached_with.lock().unwrap(), vec![b"stored".to_vec()]);
    }

    #[tokio::test]
    async fn test_generated_key_survives_refused_registration() {
        let mut directory = FakeDirectory::new(order(vec![]));
        directory.reject_registration = true;
        let directory = Arc::new(directory);
        let secrets = Arc::new(MemorySecrets::default());

        let account = driver(directory.clone(), secrets.clone())
            .resolve_account()
            .await;

        assert!(matches!(account, Err(RenewalError::Protocol(AcmeError::Account(_)))));
        assert_eq!(
            secrets.values.lock().unwrap().get("acme-account-key").cloned(),
            Some(b"fresh-key".to_vec())
        );
    }

    #[tokio::test]
    async fn test_concurrently_stored_account_key_wins() {
        let directory = Arc::new(FakeDirectory::new(order(vec![])));
        let secrets = Arc::new(MemorySecrets::default());
        *secrets.racing_value.lock().unwrap() = Some(b"winner".to_vec());

        let account = driver(directory.clone(), secrets.clone())
            .resolve_account()
            .await;

        assert!(account.is_ok());
        assert_eq!(*directory.generated.lock().unwrap(), 1);
        assert_eq!(*secrets.puts.lock().unwrap(), 0);
        assert_eq!(*directory.attached_with.lock().unwrap(), vec![b"winner".to_vec()]);
    }

    #[tokio::test]
    async fn test_authorization_count_mismatch() {
        let directory = Arc::new(FakeDirectory::new(order(vec![pending_authorization(
            "example.com",
            ChallengeKind::Dns01,
        )])));
        let subject = CertificateSubject::new("example.com", vec!["www.example.com".into()], 30);

        let err = driver(directory, Arc::new(MemorySecrets::default()))
            .issue(&subject, &RecordingProvider::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RenewalError::Protocol(AcmeError::Order(_))));
    }

    #[tokio::test]
    async fn test_missing_challenge_type() {
        let directory = Arc::new(FakeDirectory::new(order(vec![pending_authorization(
            "app.example.com",
            ChallengeKind::Http01,
        )])));
        let subject = CertificateSubject::new("app.example.com", vec![], 30);

        let err = driver(directory, Arc::new(MemorySecrets::default()))
            .issue(&subject, &RecordingProvider::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RenewalError::Protocol(AcmeError::MissingChallenge { .. })
        ));
    }

    #[tokio::test]
    async fn test_valid_authorizations_are_skipped() {
        let mut reused = pending_authorization("example.com", ChallengeKind::Dns01);
        reused.status = AuthorizationStatus::Valid;
        let fresh = pending_authorization("www.example.com", ChallengeKind::Dns01);

        let directory = Arc::new(FakeDirectory::new(order(vec![reused, fresh])));
        let provider = RecordingProvider::default();
        let subject = CertificateSubject::new("example.com", vec!["www.example.com".into()], 30);

        driver(directory, Arc::new(MemorySecrets::default()))
            .issue(&subject, &provider)
            .await
            .unwrap();

        let published = provider.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "www.example.com");
    }

    #[tokio::test]
    async fn test_polls_until_settled_and_invalid_surfaces_at_finalize() {
        let mut fake = order(vec![pending_authorization("app.example.com", ChallengeKind::Dns01)]);
        fake.challenge_statuses = VecDeque::from(vec![
            ChallengeStatus::Pending,
            ChallengeStatus::Processing,
            ChallengeStatus::Invalid,
        ]);
        fake.order_statuses = VecDeque::from(vec![OrderStatus::Invalid]);

        let directory = Arc::new(FakeDirectory::new(fake));
        let subject = CertificateSubject::new("app.example.com", vec![], 30);

        let err = driver(directory, Arc::new(MemorySecrets::default()))
            .issue(&subject, &RecordingProvider::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RenewalError::Protocol(AcmeError::Finalize(_))));
    }

    #[tokio::test]
    async fn test_poll_cap() {
        let mut fake = order(vec![pending_authorization("app.example.com", ChallengeKind::Dns01)]);
        fake.challenge_statuses = VecDeque::from(vec![ChallengeStatus::Pending; 10]);

        let directory = Arc::new(FakeDirectory::new(fake));
        let mut driver = driver(directory, Arc::new(MemorySecrets::default()));
        driver.settings.max_polls = Some(3);

        let subject = CertificateSubject::new("app.example.com", vec![], 30);
        let err = driver
            .issue(&subject, &RecordingProvider::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RenewalError::Protocol(AcmeError::PollLimit { polls: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_order_processing_is_polled() {
        let mut fake = order(vec![pending_authorization("app.example.com", ChallengeKind::Dns01)]);
        fake.order_statuses = VecDeque::from(vec![
            OrderStatus::Processing,
            OrderStatus::Processing,
            OrderStatus::Valid,
        ]);

        let directory = Arc::new(FakeDirectory::new(fake));
        let subject = CertificateSubject::new("app.example.com", vec![], 30);

        let issued = driver(directory, Arc::new(MemorySecrets::default()))
            .issue(&subject, &RecordingProvider::default())
            .await
            .unwrap();

        assert!(issued.leaf_pem.starts_with("-----BEGIN CERTIFICATE-----"));
    }

    #[tokio::test]
    async fn test_extra_certificates_used_without_issuer_link() {
        let mut fake = order(vec![pending_authorization("app.example.com", ChallengeKind::Dns01)]);
        let intermediate = issued_pem("int.example.com");
        fake.certificate = format!("{}{}", issued_pem("app.example.com"), intermediate);

        let directory = Arc::new(FakeDirectory::new(fake));
        let subject = CertificateSubject::new("app.example.com", vec![], 30);

        let issued = driver(directory, Arc::new(MemorySecrets::default()))
            .issue(&subject, &RecordingProvider::default())
            .await
            .unwrap();

        assert_eq!(issued.chain.len(), 1);
        assert_eq!(
            pki::certificate_der(issued.chain[0].as_bytes()).unwrap(),
            pki::certificate_der(intermediate.as_bytes()).unwrap()
        );
    }
}
