use crate::config::{CallConfig, CALL_SOURCE};
use crate::error::{CallError, CallResult};
use crate::services::actions::ActionEnvelope;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Per-call context sent with every request. Carries no conversation history;
/// the reasoning service owns memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    pub call_id: Uuid,
    pub apps_blocked: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest<'a> {
    pub content: &'a str,
    pub source: &'static str,
    pub apps_blocked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(rename = "reply")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionEnvelope>,
}

/// Adapter to the remote reasoning service. One call, one utterance.
#[async_trait]
pub trait ConversationClient: Send + Sync {
    async fn send(&self, content: &str, metadata: &SessionMetadata) -> CallResult<Reply>;
}

#[derive(Clone)]
pub struct HttpConversationClient {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpConversationClient {
    pub fn new(config: &CallConfig) -> CallResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CallError::Config(e.to_string()))?;

        Ok(Self {
            client,
            url: config.service_url.clone(),
            token: config.service_token.clone(),
        })
    }
}

#[async_trait]
impl ConversationClient for HttpConversationClient {
    async fn send(&self, content: &str, metadata: &SessionMetadata) -> CallResult<Reply> {
        let body = ServiceRequest {
            content,
            source: CALL_SOURCE,
            apps_blocked: metadata.apps_blocked,
        };

        let mut request = self
            .client
            .post(&self.url)
            .header("X-Call-Id", metadata.call_id.to_string())
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(%status, "reasoning service responded");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CallError::Auth(format!("reasoning service returned {}", status)));
        }
        if !status.is_success() {
            return Err(CallError::Network(format!("reasoning service returned {}", status)));
        }

        let reply: Reply = response
            .json()
            .await
            .map_err(|e| CallError::Network(format!("malformed reply: {}", e)))?;
        Ok(Reply {
            text: reply.text.trim().to_string(),
            action: reply.action,
        })
    }
}
