//! Summary delivery by mail.
//!
//! Messages are `multipart/alternative` with the Markdown source as the
//! plain-text part and its HTML rendering as the rich part. The sender is
//! always in `Cc`. Delivery is retried until it succeeds, sleeping a fixed
//! interval between attempts.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::config::{MailConfig, MailServer};

pub const RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Hands a finished message to a mail server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, message: &Message) -> Result<()>;
}

/// SMTP delivery; `None` in preview mode, where nothing is ever sent.
pub struct SmtpTransport {
    inner: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpTransport {
    /// Implicit TLS on port 465, STARTTLS everywhere else.
    pub fn new(server: &MailServer) -> Result<Self> {
        let builder = if server.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&server.address)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&server.address)
        }
        .with_context(|| format!("Invalid SMTP server: {}", server.address))?;

        let mut builder = builder.port(server.port);
        if !server.user_name.is_empty() {
            builder = builder.credentials(Credentials::new(
                server.user_name.clone(),
                server.password.clone(),
            ));
        }

        Ok(Self {
            inner: Some(builder.build()),
        })
    }

    pub fn preview() -> Self {
        Self { inner: None }
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn deliver(&self, message: &Message) -> Result<()> {
        let Some(inner) = &self.inner else {
            anyhow::bail!("no SMTP server configured");
        };
        inner.send(message.clone()).await?;
        Ok(())
    }
}

pub struct Mailer<T> {
    config: MailConfig,
    transport: T,
    retry_interval: Duration,
}

impl Mailer<SmtpTransport> {
    pub fn smtp(config: &MailConfig) -> Result<Self> {
        let transport = if config.preview {
            SmtpTransport::preview()
        } else {
            SmtpTransport::new(&config.server)?
        };
        Ok(Self::new(config.clone(), transport))
    }
}

impl<T: Transport> Mailer<T> {
    pub fn new(config: MailConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            retry_interval: RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn build_message(
        &self,
        addresses: &[String],
        subject: &str,
        plain: &str,
        html: &str,
    ) -> Result<Message> {
        let from_address: Address = self
            .config
            .from
            .address
            .parse()
            .with_context(|| format!("Invalid sender address: {}", self.config.from.address))?;
        let from_name = normalize_string(&self.config.from.name);
        let from_name = Some(from_name).filter(|n| !n.is_empty());

        let mut builder = Message::builder()
            .from(Mailbox::new(from_name, from_address.clone()))
            .cc(Mailbox::new(None, from_address))
            .subject(subject);

        for address in addresses {
            let mailbox: Mailbox = normalize_string(address)
                .parse()
                .with_context(|| format!("Invalid recipient: {}", address))?;
            builder = builder.to(mailbox);
        }

        if let Some(bcc) = self.config.bcc.as_deref().filter(|b| !b.is_empty()) {
            let mailbox: Mailbox = bcc
                .parse()
                .with_context(|| format!("Invalid bcc address: {}", bcc))?;
            builder = builder.bcc(mailbox);
        }

        let message = builder
            .multipart(MultiPart::alternative_plain_html(
                plain.to_string(),
                html.to_string(),
            ))
            .context("Failed to build mail message")?;
        Ok(message)
    }

    /// Send the message, or print the plain body when `preview` is on.
    ///
    /// Does not give up: every failed attempt is logged and retried after
    /// the retry interval.
    pub async fn send(&self, addresses: &[String], subject: &str, plain: &str, html: &str) -> Result<()> {
        let recipients: Vec<String> = addresses.iter().map(|a| normalize_string(a)).collect();
        tracing::info!(to = ?recipients, subject, "sending mail");

        if self.config.preview {
            println!("{}", plain);
            return Ok(());
        }

        let message = self.build_message(&recipients, subject, plain, html)?;

        let mut attempt = 1u64;
        loop {
            match self.transport.deliver(&message).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::error!(to = ?recipients, attempt, error = %e, "error sending mail");
                    tracing::info!(wait = ?self.retry_interval, "waiting before retry");
                    tokio::time::sleep(self.retry_interval).await;
                    attempt += 1;
                }
            }
        }

        tracing::info!(to = ?recipients, "mail sent");
        Ok(())
    }
}

/// Strip diacritics: decompose, drop combining marks, recompose.
pub fn normalize_string(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}
