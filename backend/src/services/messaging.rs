// Messaging - SMS sender port and its HTTP provider binding

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::config::SmsConfig;

/// What a provider call returned. Senders never fail with `Err`; a provider
/// or transport failure is reported through `success: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub id: Option<String>,
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn sent(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(error.into()),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, to: &str, from: &str, body: &str) -> SendOutcome;
}

/// Posts messages to a Twilio-style `Accounts/{sid}/Messages.json` endpoint.
#[derive(Debug, Clone)]
pub struct HttpSmsSender {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
}

#[derive(Debug, Deserialize)]
struct ProviderMessage {
    sid: Option<String>,
    message: Option<String>,
}

impl HttpSmsSender {
    pub fn new(config: &SmsConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages.json", self.api_base, self.account_sid)
    }
}

#[async_trait]
impl MessageSender for HttpSmsSender {
    async fn send_message(&self, to: &str, from: &str, body: &str) -> SendOutcome {
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                error!("SMS request to {} failed: {}", to, e);
                return SendOutcome::failed(format!("SMS provider unreachable: {}", e));
            }
        };

        let status = response.status();
        let parsed = response.json::<ProviderMessage>().await.ok();

        if !status.is_success() {
            let detail = parsed
                .and_then(|p| p.message)
                .unwrap_or_else(|| status.to_string());
            error!("SMS provider rejected message to {}: {}", to, detail);
            return SendOutcome::failed(format!("SMS provider error: {}", detail));
        }

        match parsed.and_then(|p| p.sid) {
            Some(sid) => {
                info!("SMS sent to {} ({})", to, sid);
                SendOutcome::sent(sid)
            }
            None => SendOutcome::failed("SMS provider response did not include a message id"),
        }
    }
}

/// Fallback used when no provider is configured: logs and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlySender;

#[async_trait]
impl MessageSender for LogOnlySender {
    async fn send_message(&self, to: &str, from: &str, body: &str) -> SendOutcome {
        info!("SMS (not sent, no provider configured) {} -> {}: {}", from, to, body);
        SendOutcome::sent(format!("log-{}", uuid::Uuid::new_v4()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender_for(server: &MockServer) -> HttpSmsSender {
        HttpSmsSender::new(&SmsConfig {
            api_base: server.uri(),
            account_sid: "AC123".to_string(),
            auth_token: "secret".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_sms_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Accounts/AC123/Messages.json"))
            .and(body_string_contains("Body=Hello+Ana"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "sid": "SM42",
                "status": "queued"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = sender_for(&server)
            .send_message("+15550001111", "+15559990000", "Hello Ana")
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.id.as_deref(), Some("SM42"));
    }

    #[tokio::test]
    async fn test_sms_provider_error_is_an_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 21211,
                "message": "The 'To' number is not a valid phone number."
            })))
            .mount(&server)
            .await;

        let outcome = sender_for(&server).send_message("bogus", "+15559990000", "Hi").await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not a valid phone number"));
    }

    #[tokio::test]
    async fn test_log_only_sender() {
        let outcome = LogOnlySender.send_message("+1", "+2", "hi").await;
        assert!(outcome.success);
        assert!(outcome.id.unwrap().starts_with("log-"));
    }
}
