use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;
use anyhow::{Result, anyhow};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::WorkflowConfig;

type HmacSha256 = Hmac<Sha256>;

pub const REMINDER_WORKFLOW_PATH: &str = "/api/v1/workflows/subscription/reminder";

/// Client for the external queue that runs the deferred reminder workflow.
#[derive(Clone)]
pub struct WorkflowClient {
    client: Client,
    config: WorkflowConfig,
    server_url: String,
}

impl WorkflowClient {
    pub fn new(config: WorkflowConfig, server_url: String) -> Self {
        Self {
            client: Client::new(),
            config,
            server_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.token.is_some()
    }

    fn trigger_url(&self) -> String {
        format!(
            "{}/v2/trigger/{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.server_url,
            REMINDER_WORKFLOW_PATH
        )
    }

    /// Schedules the reminder workflow for a subscription and returns the run
    /// id, or `None` when no queue token is configured.
    pub async fn trigger_reminder(&self, subscription_id: &Uuid) -> Result<Option<String>> {
        let token = match &self.config.token {
            Some(token) => token,
            None => {
                log::debug!("Workflow token not configured, skipping reminder trigger");
                return Ok(None);
            }
        };

        let payload = json!({ "subscriptionId": subscription_id });

        log::info!("Triggering reminder workflow for subscription {}", subscription_id);

        let response = self.client
            .post(self.trigger_url())
            .bearer_auth(token)
            .header("content-type", "application/json")
            .header("Upstash-Retries", "0")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Workflow trigger failed: {}", error_text));
        }

        let body: Value = response.json().await?;
        let run_id = body["workflowRunId"]
            .as_str()
            .ok_or_else(|| anyhow!("No workflowRunId in response"))?;

        Ok(Some(run_id.to_string()))
    }

    /// Checks the `X-Workflow-Signature` header of a workflow callback. Without
    /// a signing key every callback is accepted.
    pub fn validate_signature(&self, payload: &[u8], signature: Option<&str>) -> bool {
        let key = match &self.config.signing_key {
            Some(key) => key,
            None => return true,
        };
        let signature = match signature {
            Some(signature) => signature,
            None => return false,
        };

        let expected = match hex::decode(signature.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let mut mac = match HmacSha256::new_from_slice(key.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };

        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }
}

#[cfg(test)]
pub fn sign_payload(key: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
