//! SMTP email channel driver (spec.md §4.7 C7: "SMTP server from global
//! settings; subject template per route; CC list; must not fail the whole
//! dispatch when a single recipient bounces — aggregate errors").

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::domain::models::config::SmtpConfig;
use crate::domain::models::ChannelKind;
use crate::domain::ports::channel::{Channel, SendParams};

pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl EmailChannel {
    /// # Errors
    /// Returns an error if the SMTP relay cannot be reached or its
    /// hostname cannot be resolved into a transport builder.
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.host).port(cfg.port);
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self { transport: builder.build(), from: cfg.from.clone() })
    }

    fn subject(params: &SendParams) -> String {
        if params.is_recovered {
            format!("[RECOVERED][{:?}] {}", params.severity, params.rule_name)
        } else {
            format!("[FIRING][{:?}] {}", params.severity, params.rule_name)
        }
    }
}

#[async_trait]
impl Channel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn validate(&self, params: &SendParams) -> anyhow::Result<()> {
        if params.to.is_empty() {
            anyhow::bail!(crate::domain::errors::DomainError::EmptyRecipients);
        }
        Ok(())
    }

    async fn send(&self, params: &SendParams) -> anyhow::Result<()> {
        let subject = Self::subject(params);
        let mut errors = Vec::new();
        let mut any_sent = false;

        for recipient in params.to.iter().chain(params.cc.iter()) {
            let Ok(to_mailbox) = recipient.parse::<Mailbox>() else {
                errors.push(format!("{recipient}: not a valid email address"));
                continue;
            };
            let Ok(from_mailbox) = self.from.parse::<Mailbox>() else {
                anyhow::bail!("configured SMTP from address {:?} is invalid", self.from);
            };
            let message = match Message::builder().from(from_mailbox).to(to_mailbox).subject(&subject).body(params.content.clone()) {
                Ok(m) => m,
                Err(err) => {
                    errors.push(format!("{recipient}: {err}"));
                    continue;
                }
            };

            match self.transport.send(message).await {
                Ok(_) => any_sent = true,
                Err(err) => errors.push(format!("{recipient}: {err}")),
            }
        }

        // A bounced recipient doesn't fail the whole send as long as at
        // least one recipient accepted the message (spec §4.7).
        if any_sent || errors.is_empty() {
            if !errors.is_empty() {
                tracing::warn!(event_id = %params.event_id, bounces = ?errors, "email partially delivered");
            }
            return Ok(());
        }
        anyhow::bail!("email delivery failed for all recipients: {}", errors.join("; "))
    }

    async fn test(&self, params: &SendParams) -> anyhow::Result<()> {
        self.send(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Severity;

    fn cfg() -> SmtpConfig {
        SmtpConfig { host: "localhost".into(), port: 2525, username: None, password: None, from: "alerts@example.com".into() }
    }

    fn params(to: Vec<String>) -> SendParams {
        SendParams {
            tenant_id: "t1".into(),
            event_id: "e1".into(),
            rule_name: "cpu_high".into(),
            severity: Severity::P1,
            notice_id: "n1".into(),
            notice_name: "oncall".into(),
            is_recovered: false,
            hook: None,
            content: "cpu above threshold".into(),
            to,
            cc: vec![],
            signature: None,
            provider_config: None,
        }
    }

    #[test]
    fn refuses_send_with_no_recipients() {
        let channel = EmailChannel::new(&cfg()).unwrap();
        assert!(channel.validate(&params(vec![])).is_err());
    }

    #[test]
    fn accepts_send_with_recipients() {
        let channel = EmailChannel::new(&cfg()).unwrap();
        assert!(channel.validate(&params(vec!["oncall@example.com".into()])).is_ok());
    }

    #[test]
    fn recovered_subject_differs_from_firing() {
        let mut p = params(vec!["a@example.com".into()]);
        let firing = EmailChannel::subject(&p);
        p.is_recovered = true;
        let recovered = EmailChannel::subject(&p);
        assert_ne!(firing, recovered);
        assert!(recovered.starts_with("[RECOVERED]"));
    }
}
