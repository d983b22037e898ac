use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment as MimeAttachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::error::TransmissionError;
use crate::models::{Attachment, SendJob};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers a finished job, or checks credentials without sending.
#[async_trait]
pub trait Transmitter: Send + Sync {
    async fn send(&self, job: &SendJob, credentials: &SmtpConfig) -> Result<(), TransmissionError>;

    /// Connect, STARTTLS, authenticate, then quit without sending.
    async fn verify(&self, credentials: &SmtpConfig) -> Result<(), TransmissionError>;
}

fn parse_mailbox(address: &str) -> Result<Mailbox, TransmissionError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| TransmissionError::Address {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Assemble the outgoing message: one HTML part followed by one base64
/// `application/octet-stream` part per attachment, in order.
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    html_body: &str,
    attachments: &[Attachment],
) -> Result<Message, TransmissionError> {
    let octet_stream = ContentType::parse("application/octet-stream")
        .map_err(|e| TransmissionError::Build(e.to_string()))?;
    let mut multipart = MultiPart::mixed().singlepart(SinglePart::html(html_body.to_string()));

    for att in attachments {
        log::debug!("Attaching {} ({} bytes)", att.filename, att.size_bytes);
        let body = Body::new_with_encoding(att.data.clone(), ContentTransferEncoding::Base64)
            .map_err(|_| TransmissionError::Build(format!("cannot encode {}", att.filename)))?;
        let part = MimeAttachment::new(att.filename.clone()).body(body, octet_stream.clone());
        multipart = multipart.singlepart(part);
    }

    Message::builder()
        .from(parse_mailbox(from)?)
        .to(parse_mailbox(to)?)
        .subject(subject)
        .multipart(multipart)
        .map_err(|e| TransmissionError::Build(e.to_string()))
}

/// Production transmitter: STARTTLS submission with username/password auth.
#[derive(Debug, Clone)]
pub struct SmtpTransmitter {
    timeout: Duration,
}

impl Default for SmtpTransmitter {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SmtpTransmitter {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn transport(&self, config: &SmtpConfig) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransmissionError> {
        let creds = Credentials::new(config.sender_email.clone(), config.password.clone());
        Ok(AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
            .map_err(|e| TransmissionError::Smtp(format!("relay {}: {e}", config.server)))?
            .port(config.port)
            .credentials(creds)
            .authentication(vec![Mechanism::Plain, Mechanism::Login])
            .timeout(Some(self.timeout))
            .build())
    }
}

#[async_trait]
impl Transmitter for SmtpTransmitter {
    async fn send(&self, job: &SendJob, credentials: &SmtpConfig) -> Result<(), TransmissionError> {
        let message = build_message(
            &credentials.sender_email,
            &job.recipient,
            &job.subject,
            &job.rendered_body,
            &job.attachments,
        )?;

        let transport = self.transport(credentials)?;
        transport
            .send(message)
            .await
            .map_err(|e| TransmissionError::Smtp(format!("send failed: {e}")))?;

        log::info!("Email sent to {}", job.recipient);
        Ok(())
    }

    async fn verify(&self, credentials: &SmtpConfig) -> Result<(), TransmissionError> {
        log::debug!("Testing SMTP connection to {}:{}", credentials.server, credentials.port);
        let transport = self.transport(credentials)?;
        let connected = transport
            .test_connection()
            .await
            .map_err(|e| TransmissionError::Smtp(format!("connection test failed: {e}")))?;
        if !connected {
            return Err(TransmissionError::NotConnected);
        }
        Ok(())
    }
}
