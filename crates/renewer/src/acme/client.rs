//! RFC 8555 client over `reqwest`, signing with an RSA account key.
//!
//! Resource bodies use the wire types `instant-acme` publishes; the transport
//! and JWS layer live in this crate so accounts can hold RSA keys.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::{Engine, BASE64_URL_SAFE_NO_PAD};
use instant_acme::{Identifier, NewAccount, NewOrder, OrderState, Problem};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::jws::{dns_value, RsaAccountKey};
use super::{
    AccountKey, AcmeAccount, AcmeDirectory, AcmeOrder, Authorization, AuthorizationStatus,
    Challenge, ChallengeKind, ChallengeStatus, OrderStatus,
};
use crate::error::AcmeError;

const JOSE_JSON: &str = "application/jose+json";
const REPLAY_NONCE: &str = "replay-nonce";
const BAD_NONCE: &str = "urn:ietf:params:acme:error:badNonce";

/// Attempts per request when the server keeps rejecting the nonce
const NONCE_ATTEMPTS: u32 = 3;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectoryUrls {
    new_nonce: String,
    new_account: String,
    new_order: String,
}

/// ACME server reached over HTTPS
#[derive(Debug, Clone)]
pub struct HttpAcmeDirectory {
    client: Client,
    directory_url: String,
}

impl HttpAcmeDirectory {
    pub fn new(directory_url: impl Into<String>) -> Result<Self, AcmeError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AcmeError::Directory(e.to_string()))?;
        Ok(Self::with_client(client, directory_url))
    }

    pub fn with_client(client: Client, directory_url: impl Into<String>) -> Self {
        Self {
            client,
            directory_url: directory_url.into(),
        }
    }

    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    async fn directory(&self) -> Result<DirectoryUrls, AcmeError> {
        let response = self
            .client
            .get(&self.directory_url)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| AcmeError::Directory(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| AcmeError::Directory(e.to_string()))
    }
}

/// `mailto:` URI for a contact address
fn contact_uri(contact: &str) -> String {
    if contact.starts_with("mailto:") {
        contact.to_string()
    } else {
        format!("mailto:{}", contact)
    }
}

#[async_trait]
impl AcmeDirectory for HttpAcmeDirectory {
    async fn generate_key(&self) -> Result<AccountKey, AcmeError> {
        let key = tokio::task::spawn_blocking(RsaAccountKey::generate)
            .await
            .map_err(|e| AcmeError::AccountKey(e.to_string()))??;
        info!(bits = key.bits(), "Generated ACME account key");
        key.to_account_key()
    }

    async fn account(
        &self,
        key: &AccountKey,
        contact: &str,
    ) -> Result<Box<dyn AcmeAccount>, AcmeError> {
        let key = RsaAccountKey::from_account_key(key)?;
        let transport = Transport {
            client: self.client.clone(),
            urls: self.directory().await?,
            key,
            nonce: Mutex::new(None),
        };

        let contact = contact_uri(contact);
        let contacts = [contact.as_str()];
        let payload = encode(&NewAccount {
            contact: &contacts,
            terms_of_service_agreed: true,
            only_return_existing: false,
        })
        .map_err(AcmeError::Account)?;

        let response = transport
            .post(&transport.urls.new_account, None, Some(&payload))
            .await
            .map_err(AcmeError::Account)?;
        let existing = response.status() == StatusCode::OK;
        let key_id = location(&response).map_err(AcmeError::Account)?;

        debug!(
            directory = %self.directory_url,
            account = %key_id,
            existing,
            "Attached to ACME account"
        );

        Ok(Box::new(HttpAcmeAccount {
            session: Arc::new(Session { transport, key_id }),
        }))
    }
}

/// Signed request plumbing shared by an account's orders
struct Transport {
    client: Client,
    urls: DirectoryUrls,
    key: RsaAccountKey,
    nonce: Mutex<Option<String>>,
}

impl Transport {
    async fn take_nonce(&self) -> Result<String, String> {
        if let Some(nonce) = self.nonce.lock().await.take() {
            return Ok(nonce);
        }

        let response = self
            .client
            .head(&self.urls.new_nonce)
            .send()
            .await
            .map_err(|e| format!("nonce request failed: {}", e))?;
        replay_nonce(&response).ok_or_else(|| "server issued no nonce".to_string())
    }

    async fn post(
        &self,
        url: &str,
        key_id: Option<&str>,
        payload: Option<&[u8]>,
    ) -> Result<Response, String> {
        let mut attempt = 1;
        loop {
            let nonce = self.take_nonce().await?;
            let body = self
                .key
                .sign(url, &nonce, key_id, payload)
                .map_err(|e| e.to_string())?;
            let body = serde_json::to_vec(&body).map_err(|e| e.to_string())?;

            let response = self
                .client
                .post(url)
                .header(CONTENT_TYPE, JOSE_JSON)
                .body(body)
                .send()
                .await
                .map_err(|e| format!("request to {} failed: {}", url, e))?;

            if let Some(nonce) = replay_nonce(&response) {
                *self.nonce.lock().await = Some(nonce);
            }

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let body = response.bytes().await.map_err(|e| e.to_string())?;
            let problem = serde_json::from_slice::<Problem>(&body).ok();
            let bad_nonce = problem.as_ref().and_then(|p| p.r#type.as_deref()) == Some(BAD_NONCE);

            if bad_nonce && attempt < NONCE_ATTEMPTS {
                warn!(url, attempt, "Server rejected nonce, retrying");
                attempt += 1;
                continue;
            }

            return Err(match problem {
                Some(problem) => format!("{} returned {}: {}", url, status, problem),
                None => format!(
                    "{} returned {}: {}",
                    url,
                    status,
                    String::from_utf8_lossy(&body)
                ),
            });
        }
    }
}

/// A registered account: the transport plus the account URL (`kid`)
struct Session {
    transport: Transport,
    key_id: String,
}

impl Session {
    async fn post(&self, url: &str, payload: Option<&[u8]>) -> Result<Response, String> {
        self.transport.post(url, Some(&self.key_id), payload).await
    }

    /// POST-as-GET
    async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T, String> {
        let response = self.post(url, None).await?;
        read_json(response).await
    }
}

fn replay_nonce(response: &Response) -> Option<String> {
    response
        .headers()
        .get(REPLAY_NONCE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn location(response: &Response) -> Result<String, String> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| format!("{} response carries no Location", response.url()))
}

fn encode(payload: &impl Serialize) -> Result<Vec<u8>, String> {
    serde_json::to_vec(payload).map_err(|e| e.to_string())
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, String> {
    let url = response.url().to_string();
    response
        .json()
        .await
        .map_err(|e| format!("unreadable response from {}: {}", url, e))
}

struct HttpAcmeAccount {
    session: Arc<Session>,
}

#[async_trait]
impl AcmeAccount for HttpAcmeAccount {
    async fn new_order(&self, identifiers: &[String]) -> Result<Box<dyn AcmeOrder>, AcmeError> {
        let identifiers: Vec<Identifier> = identifiers
            .iter()
            .map(|name| Identifier::Dns(name.clone()))
            .collect();
        let payload = encode(&NewOrder {
            identifiers: &identifiers,
        })
        .map_err(AcmeError::Order)?;

        let response = self
            .session
            .post(&self.session.transport.urls.new_order, Some(&payload))
            .await
            .map_err(AcmeError::Order)?;
        let url = location(&response).map_err(AcmeError::Order)?;
        let state: OrderState = read_json(response).await.map_err(AcmeError::Order)?;

        debug!(order = %url, "Placed ACME order");
        Ok(Box::new(HttpAcmeOrder {
            session: Arc::clone(&self.session),
            url,
            state,
        }))
    }
}

struct HttpAcmeOrder {
    session: Arc<Session>,
    url: String,
    state: OrderState,
}

impl HttpAcmeOrder {
    fn convert_challenge(
        &self,
        challenge: &instant_acme::Challenge,
    ) -> Result<Option<Challenge>, AcmeError> {
        let kind = match challenge.r#type {
            instant_acme::ChallengeType::Dns01 => ChallengeKind::Dns01,
            instant_acme::ChallengeType::Http01 => ChallengeKind::Http01,
            _ => return Ok(None),
        };

        let key_authorization = self.session.transport.key.key_authorization(&challenge.token);

        Ok(Some(Challenge {
            kind,
            url: challenge.url.clone(),
            token: challenge.token.clone(),
            status: challenge_status(challenge)?,
            dns_value: dns_value(&key_authorization),
            key_authorization,
        }))
    }
}

/// `instant-acme` does not export its challenge status type; its `Debug`
/// form is the variant name.
fn challenge_status(challenge: &instant_acme::Challenge) -> Result<ChallengeStatus, AcmeError> {
    match format!("{:?}", challenge.status).as_str() {
        "Pending" => Ok(ChallengeStatus::Pending),
        "Processing" => Ok(ChallengeStatus::Processing),
        "Valid" => Ok(ChallengeStatus::Valid),
        "Invalid" => Ok(ChallengeStatus::Invalid),
        other => Err(AcmeError::Challenge(format!(
            "challenge {} has unknown status {}",
            challenge.url, other
        ))),
    }
}

fn convert_authorization_status(status: instant_acme::AuthorizationStatus) -> AuthorizationStatus {
    match status {
        instant_acme::AuthorizationStatus::Pending => AuthorizationStatus::Pending,
        instant_acme::AuthorizationStatus::Valid => AuthorizationStatus::Valid,
        instant_acme::AuthorizationStatus::Invalid => AuthorizationStatus::Invalid,
        instant_acme::AuthorizationStatus::Revoked => AuthorizationStatus::Revoked,
        instant_acme::AuthorizationStatus::Expired => AuthorizationStatus::Expired,
    }
}

fn convert_order_status(status: instant_acme::OrderStatus) -> OrderStatus {
    match status {
        instant_acme::OrderStatus::Pending => OrderStatus::Pending,
        instant_acme::OrderStatus::Ready => OrderStatus::Ready,
        instant_acme::OrderStatus::Processing => OrderStatus::Processing,
        instant_acme::OrderStatus::Valid => OrderStatus::Valid,
        instant_acme::OrderStatus::Invalid => OrderStatus::Invalid,
    }
}

fn identifier_name(identifier: &Identifier) -> String {
    match identifier {
        Identifier::Dns(name) => name.clone(),
    }
}

#[async_trait]
impl AcmeOrder for HttpAcmeOrder {
    fn status(&mut self) -> OrderStatus {
        convert_order_status(self.state.status)
    }

    async fn authorizations(&mut self) -> Result<Vec<Authorization>, AcmeError> {
        let mut authorizations = Vec::with_capacity(self.state.authorizations.len());

        for url in &self.state.authorizations {
            let authz: instant_acme::Authorization =
                self.session.fetch(url).await.map_err(AcmeError::Order)?;

            let mut challenges = Vec::with_capacity(authz.challenges.len());
            for challenge in &authz.challenges {
                if let Some(challenge) = self.convert_challenge(challenge)? {
                    challenges.push(challenge);
                }
            }

            authorizations.push(Authorization {
                identifier: identifier_name(&authz.identifier),
                status: convert_authorization_status(authz.status),
                challenges,
            });
        }

        Ok(authorizations)
    }

    async fn request_validation(&mut self, challenge: &Challenge) -> Result<(), AcmeError> {
        self.session
            .post(&challenge.url, Some(b"{}"))
            .await
            .map(|_| ())
            .map_err(AcmeError::Challenge)
    }

    async fn reload_challenge(
        &mut self,
        challenge: &Challenge,
    ) -> Result<ChallengeStatus, AcmeError> {
        let current: instant_acme::Challenge = self
            .session
            .fetch(&challenge.url)
            .await
            .map_err(AcmeError::Challenge)?;
        challenge_status(&current)
    }

    async fn finalize(&mut self, csr_der: &[u8]) -> Result<(), AcmeError> {
        let payload = encode(&json!({ "csr": BASE64_URL_SAFE_NO_PAD.encode(csr_der) }))
            .map_err(AcmeError::Finalize)?;
        let response = self
            .session
            .post(&self.state.finalize, Some(&payload))
            .await
            .map_err(AcmeError::Finalize)?;
        self.state = read_json(response).await.map_err(AcmeError::Finalize)?;
        Ok(())
    }

    async fn reload(&mut self) -> Result<OrderStatus, AcmeError> {
        self.state = self.session.fetch(&self.url).await.map_err(AcmeError::Order)?;
        Ok(convert_order_status(self.state.status))
    }

    async fn certificate(&mut self) -> Result<Option<String>, AcmeError> {
        let Some(url) = self.state.certificate.as_deref() else {
            return Ok(None);
        };

        let response = self
            .session
            .post(url, None)
            .await
            .map_err(AcmeError::Certificate)?;
        let pem = response
            .text()
            .await
            .map_err(|e| AcmeError::Certificate(e.to_string()))?;
        Ok(Some(pem))
    }
}
