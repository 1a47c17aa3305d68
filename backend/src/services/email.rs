use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use leadflow_shared::EmailAccount;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use super::messaging::SendOutcome;
use crate::config::SmtpConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub to: String,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, account: &EmailAccount, email: &OutgoingEmail) -> SendOutcome;
}

/// Sends workflow email through the platform SMTP relay, using the tenant's
/// connected account as the sender.
#[derive(Debug, Clone)]
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpEmailSender {
    pub fn new(smtp_config: &SmtpConfig) -> Result<Self, lettre::transport::smtp::Error> {
        let creds = Credentials::new(
            smtp_config.username.clone(),
            smtp_config.password.clone(),
        );

        let builder = if smtp_config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp_config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
        };

        let transport = builder
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self { transport })
    }

    fn build_message(account: &EmailAccount, email: &OutgoingEmail) -> Result<Message, String> {
        let from = match &account.display_name {
            Some(name) => format!("{} <{}>", name, account.email_address),
            None => account.email_address.clone(),
        };
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| format!("Invalid sender address '{}': {}", account.email_address, e))?;
        let to = email
            .to
            .parse::<Mailbox>()
            .map_err(|e| format!("Invalid recipient address '{}': {}", email.to, e))?;

        let mut builder = Message::builder()
            .from(from)
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_HTML);

        for cc in &email.cc {
            let mailbox = cc
                .parse::<Mailbox>()
                .map_err(|e| format!("Invalid cc address '{}': {}", cc, e))?;
            builder = builder.cc(mailbox);
        }
        for bcc in &email.bcc {
            let mailbox = bcc
                .parse::<Mailbox>()
                .map_err(|e| format!("Invalid bcc address '{}': {}", bcc, e))?;
            builder = builder.bcc(mailbox);
        }

        builder
            .body(email.body.clone())
            .map_err(|e| format!("Failed to build email: {}", e))
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_email(&self, account: &EmailAccount, email: &OutgoingEmail) -> SendOutcome {
        let message = match Self::build_message(account, email) {
            Ok(m) => m,
            Err(e) => return SendOutcome::failed(e),
        };

        match self.transport.send(message).await {
            Ok(response) => {
                info!("Email sent successfully to {}", email.to);
                let id = response
                    .message()
                    .next()
                    .map(|line| line.to_string())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                SendOutcome::sent(id)
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", email.to, e);
                SendOutcome::failed(format!("SMTP error: {}", e))
            }
        }
    }
}

/// Fallback used when SMTP is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyEmailSender;

#[async_trait]
impl EmailSender for LogOnlyEmailSender {
    async fn send_email(&self, account: &EmailAccount, email: &OutgoingEmail) -> SendOutcome {
        info!(
            "Email (not sent, SMTP not configured) {} -> {}: {}",
            account.email_address, email.to, email.subject
        );
        SendOutcome::sent(format!("log-{}", uuid::Uuid::new_v4()))
    }
}
