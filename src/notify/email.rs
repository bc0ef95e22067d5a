// src/notify/email.rs
use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use metrics::counter;

use super::{render_digest, DeliveryFailure, Notifier};
use crate::process::FilteredResult;

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailSender {
    /// Build from SMTP_HOST / SMTP_USER / SMTP_PASS / NOTIFY_EMAIL_FROM.
    /// The recipient comes per send, from the subscription.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SMTP_HOST").context("SMTP_HOST missing")?;
        let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
        let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;
        let from_addr = std::env::var("NOTIFY_EMAIL_FROM").context("NOTIFY_EMAIL_FROM missing")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();
        let from = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;

        Ok(Self { mailer, from })
    }
}

#[async_trait::async_trait]
impl Notifier for EmailSender {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &FilteredResult,
    ) -> Result<(), DeliveryFailure> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| DeliveryFailure(format!("invalid recipient `{recipient}`: {e}")))?;

        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(render_digest(body))
            .map_err(|e| DeliveryFailure(format!("build email: {e}")))?;

        self.mailer.send(msg).await.map_err(|e| {
            counter!("notify_failures_total").increment(1);
            DeliveryFailure(format!("smtp send: {e}"))
        })?;
        counter!("notify_sent_total").increment(1);
        Ok(())
    }
}
