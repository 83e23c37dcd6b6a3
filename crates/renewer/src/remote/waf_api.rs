//! WAF policy REST client.
//!
//! ```text
//! GET {endpoint}/web-app-firewall-policies/{id} -> policy
//! PUT {endpoint}/web-app-firewall-policies/{id} <- {"actions", "requestAccessControl"}
//! ```

use async_trait::async_trait;
use renewer_config::EndpointConfig;
use reqwest::Method;
use serde::Serialize;
use tracing::debug;

use super::RestEndpoint;
use crate::challenge::{RequestAccessControl, WafAction, WafPolicy, WafPolicyClient};
use crate::error::{ChallengeError, RenewalError};

const POLICIES: &str = "web-app-firewall-policies";

/// Update body: only the parts of the policy the renewer changes
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePolicy<'a> {
    actions: &'a [WafAction],
    #[serde(skip_serializing_if = "Option::is_none")]
    request_access_control: Option<&'a RequestAccessControl>,
}

/// [`WafPolicyClient`] over the WAF REST API
#[derive(Debug, Clone)]
pub struct HttpWafPolicyClient {
    endpoint: RestEndpoint,
}

impl HttpWafPolicyClient {
    pub fn from_config(config: &EndpointConfig) -> Result<Self, RenewalError> {
        Ok(Self {
            endpoint: RestEndpoint::from_config(config)?,
        })
    }
}

#[async_trait]
impl WafPolicyClient for HttpWafPolicyClient {
    async fn get_policy(&self, policy_id: &str) -> Result<WafPolicy, ChallengeError> {
        let url = self.endpoint.url(&[POLICIES, policy_id]);
        let response = self.endpoint.request(Method::GET, url).send().await?;
        let policy: WafPolicy = RestEndpoint::check(response).await?.json().await?;

        debug!(policy = %policy_id, actions = policy.actions.len(), "Fetched WAF policy");
        Ok(policy)
    }

    async fn update_policy(
        &self,
        policy_id: &str,
        policy: &WafPolicy,
    ) -> Result<(), ChallengeError> {
        let url = self.endpoint.url(&[POLICIES, policy_id]);
        let body = UpdatePolicy {
            actions: &policy.actions,
            request_access_control: policy.request_access_control.as_ref(),
        };

        let response = self
            .endpoint
            .request(Method::PUT, url)
            .json(&body)
            .send()
            .await?;
        RestEndpoint::check(response).await?;

        debug!(policy = %policy_id, "Updated WAF policy");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpWafPolicyClient {
        HttpWafPolicyClient::from_config(&EndpointConfig {
            endpoint: server.uri(),
            auth_token: Some("t0ken".into()),
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/web-app-firewall-policies/ocid1.policy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ocid1.policy",
                "displayName": "prod",
                "actions": [{"name": "allow", "type": "ALLOW"}]
            })))
            .mount(&server)
            .await;

        let policy = client(&server).get_policy("ocid1.policy").await.unwrap();
        assert_eq!(policy.actions.len(), 1);
        assert!(policy.request_access_control.is_none());
        assert_eq!(policy.extra["displayName"], "prod");
    }

    #[tokio::test]
    async fn test_update_sends_actions_and_access_control() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/web-app-firewall-policies/ocid1.policy"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut policy = WafPolicy::default();
        policy.extra.insert("displayName".into(), json!("prod"));
        policy.actions.push(WafAction::static_response(
            "challenge-le-action-example-com-1".into(),
            "text/plain",
            "tok.thumb",
        ));

        client(&server)
            .update_policy("ocid1.policy", &policy)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["actions"][0]["code"], 200);
        assert!(body.get("displayName").is_none());
        assert!(body.get("requestAccessControl").is_none());
        assert_eq!(
            requests[0].headers.get("authorization").unwrap(),
            "Bearer t0ken"
        );
    }
}
