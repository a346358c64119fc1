use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use super::templates::{self, EmailLinks, RenderedEmail};
use super::Notifier;
use crate::config::Config;
use crate::db::{Post, Subscriber};

/// Sends notifications over SMTP.
///
/// Without an SMTP host the notifier runs in log-only mode: every send
/// succeeds and is only traced.
#[derive(Clone)]
pub struct MailNotifier {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
    links: EmailLinks,
}

impl MailNotifier {
    /// Build a notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender mailbox is invalid or the SMTP relay
    /// cannot be configured.
    pub fn new(config: &Config) -> Result<Self> {
        let mail = &config.mail;
        let from = mail
            .from
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid EMAIL_FROM mailbox '{}'", mail.from))?;

        let transport = match mail.smtp_host.as_deref().map(str::trim) {
            None | Some("") => {
                warn!("SMTP host not configured; notifications will be logged only");
                None
            }
            Some(host) => {
                let builder = if mail.smtp_starttls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                }
                .with_context(|| format!("Failed to configure SMTP relay {host}"))?
                .port(mail.smtp_port);

                let builder = match (&mail.smtp_username, &mail.smtp_password) {
                    (Some(username), Some(password)) => {
                        builder.credentials(Credentials::new(username.clone(), password.clone()))
                    }
                    _ => builder,
                };

                info!(host, port = mail.smtp_port, "SMTP notifications enabled");
                Some(Arc::new(builder.build()))
            }
        };

        Ok(Self {
            transport,
            from,
            links: EmailLinks::new(&config.public_base_url, &config.blog_title),
        })
    }

    /// Whether messages actually leave the process.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    async fn deliver(&self, recipient: &str, email: RenderedEmail) -> Result<()> {
        let Some(transport) = &self.transport else {
            info!(
                recipient,
                subject = %email.subject,
                "Mail transport disabled; skipping send"
            );
            return Ok(());
        };

        let to = recipient
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid recipient address '{recipient}'"))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&email.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(email.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(email.html),
                    ),
            )
            .context("Failed to build email message")?;

        transport
            .send(message)
            .await
            .with_context(|| format!("SMTP send to {recipient} failed"))?;
        info!(recipient, subject = %email.subject, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn send_new_posts(&self, subscriber: &Subscriber, posts: &[Post]) -> Result<String> {
        let email = templates::new_posts(&self.links, subscriber, posts);
        let subject = email.subject.clone();
        self.deliver(&subscriber.email, email).await?;
        Ok(subject)
    }

    async fn send_post(&self, subscriber: &Subscriber, post: &Post) -> Result<String> {
        let email = templates::single_post(&self.links, subscriber, post);
        let subject = email.subject.clone();
        self.deliver(&subscriber.email, email).await?;
        Ok(subject)
    }

    async fn send_welcome(&self, subscriber: &Subscriber) -> Result<()> {
        let email = templates::welcome(&self.links, subscriber);
        self.deliver(&subscriber.email, email).await
    }
}
