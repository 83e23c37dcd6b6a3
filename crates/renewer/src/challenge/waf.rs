//! HTTP-01 challenge publication through a web application firewall policy.
//!
//! The WAF answers `/.well-known/acme-challenge/{token}` for the challenged
//! host itself: a static 200 response action plus an access control rule
//! routing matching requests to it. The policy is read, extended and written
//! back as a whole; fields the renewer does not model are carried through
//! untouched.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use renewer_common::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{slug, ChallengeProvider};
use crate::acme::{Challenge, ChallengeKind};
use crate::error::ChallengeError;
use crate::subject::base_domain;

const RETURN_HTTP_RESPONSE: &str = "RETURN_HTTP_RESPONSE";
const STATIC_TEXT: &str = "STATIC_TEXT";
const ACCESS_CONTROL: &str = "ACCESS_CONTROL";
const JMESPATH: &str = "JMESPATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(rename = "type")]
    pub body_type: String,
    pub text: String,
}

/// A named policy action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WafAction {
    pub name: String,
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<ResponseHeader>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WafAction {
    /// Static `200` response with the given content type and body
    pub fn static_response(name: String, content_type: &str, text: &str) -> Self {
        Self {
            name,
            action_type: RETURN_HTTP_RESPONSE.to_string(),
            code: Some(200),
            headers: vec![ResponseHeader {
                name: "Content-Type".to_string(),
                value: content_type.to_string(),
            }],
            body: Some(ResponseBody {
                body_type: STATIC_TEXT.to_string(),
                text: text.to_string(),
            }),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub name: String,
    pub action_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccessControl {
    pub default_action_name: String,
    #[serde(default)]
    pub rules: Vec<AccessControlRule>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Web application firewall policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WafPolicy {
    #[serde(default)]
    pub actions: Vec<WafAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_access_control: Option<RequestAccessControl>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// WAF policy API
#[async_trait]
pub trait WafPolicyClient: Send + Sync {
    async fn get_policy(&self, policy_id: &str) -> Result<WafPolicy, ChallengeError>;

    /// Replace the policy's actions and access control
    async fn update_policy(
        &self,
        policy_id: &str,
        policy: &WafPolicy,
    ) -> Result<(), ChallengeError>;
}

/// Publishes HTTP-01 responses as WAF policy rules
pub struct WafChallengeProvider {
    client: Arc<dyn WafPolicyClient>,
    policy_id: String,
    retry: RetryPolicy,
}

impl WafChallengeProvider {
    pub fn new(
        client: Arc<dyn WafPolicyClient>,
        policy_id: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            policy_id: policy_id.into(),
            retry,
        }
    }

    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    async fn install(&self, base: &str, challenge: &Challenge) -> Result<(), ChallengeError> {
        let mut policy = self.client.get_policy(&self.policy_id).await?;
        add_challenge_rule(&mut policy, base, challenge, Utc::now().timestamp());
        self.client.update_policy(&self.policy_id, &policy).await
    }
}

/// Extend `policy` with a response action and a rule routing the challenge path to it
///
/// All object names derived here share `timestamp`.
pub fn add_challenge_rule(
    policy: &mut WafPolicy,
    base: &str,
    challenge: &Challenge,
    timestamp: i64,
) {
    let action_name = slug(&format!("challenge-le-action-{}-{}", base, timestamp));

    policy.actions.push(WafAction::static_response(
        action_name.clone(),
        challenge.content_type(),
        challenge.file_content(),
    ));

    let access_control = policy
        .request_access_control
        .get_or_insert_with(|| RequestAccessControl {
            default_action_name: slug(&format!("le-challenge-action-{}-{}", base, timestamp)),
            rules: Vec::new(),
            extra: Map::new(),
        });

    access_control.rules.push(AccessControlRule {
        rule_type: ACCESS_CONTROL.to_string(),
        name: slug(&format!("le-challenge-rule-{}-{}", base, timestamp)),
        action_name,
        condition_language: Some(JMESPATH.to_string()),
        condition: Some(format!(
            "i_equals(http.request.host, '{}') && i_equals(http.request.url.path, '{}')",
            base,
            challenge.well_known_path()
        )),
        extra: Map::new(),
    });
}

#[async_trait]
impl ChallengeProvider for WafChallengeProvider {
    fn kind(&self) -> ChallengeKind {
        ChallengeKind::Http01
    }

    async fn publish(
        &self,
        subject_name: &str,
        challenge: &Challenge,
    ) -> Result<(), ChallengeError> {
        let base = base_domain(subject_name);
        debug!(
            domain = %subject_name,
            policy = %self.policy_id,
            token = %challenge.token,
            "Adding WAF challenge rule"
        );

        self.retry
            .run(subject_name, "WAF update", || self.install(base, challenge))
            .await?;

        info!(domain = %subject_name, policy = %self.policy_id, "Published WAF challenge response");
        Ok(())
    }
}
