//! Per-session context: prefs, in-memory credentials, the current draft,
//! queued attachments and the send workflow.
//!
//! Front ends own one [`ComposeSession`] per user session and pass it to
//! every operation. The SMTP password only ever lives in this struct.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::attachments::{self, IntakeReport};
use crate::config::{sanitize, SessionPrefs, SmtpConfig};
use crate::error::{AgentError, ConfigError, SendError, ValidationError};
use crate::gemini::GeminiClient;
use crate::generator::{ContentGenerator, TextGenerator};
use crate::mime;
use crate::models::{Attachment, Draft};
use crate::smtp::Transmitter;
use crate::workflow::{CountdownOutcome, CountdownStatus, SendReport, SendRequest, SendWorkflow};

pub struct ComposeSession {
    prefs: SessionPrefs,
    smtp_password: Option<String>,
    generator: Option<ContentGenerator>,
    /// Set when the backend was supplied by the caller rather than built
    /// from `prefs.api_key`.
    injected_backend: bool,
    transmitter: Arc<dyn Transmitter>,
    draft: Option<Draft>,
    attachments: Vec<Attachment>,
    workflow: SendWorkflow,
    /// Credentials captured when the current job was queued.
    job_credentials: Option<SmtpConfig>,
}

impl ComposeSession {
    /// Session backed by Gemini when `prefs` carries an API key.
    pub fn new(prefs: SessionPrefs, transmitter: Arc<dyn Transmitter>) -> Self {
        let generator = gemini_generator(&prefs.api_key);
        Self::build(prefs, generator, false, transmitter)
    }

    /// Session for headless use: prefs from the config dir with the
    /// environment overlaid, and the SMTP password from
    /// `DRAFTMAIL_SMTP_PASSWORD` when set.
    pub fn from_environment(transmitter: Arc<dyn Transmitter>) -> Result<Self, ConfigError> {
        let mut session = Self::new(SessionPrefs::load()?, transmitter);
        if let Some(password) = SessionPrefs::env_password() {
            session.set_smtp_password(&password);
        }
        Ok(session)
    }

    /// Session with an explicit generation backend.
    pub fn with_generator(
        prefs: SessionPrefs,
        backend: Arc<dyn TextGenerator>,
        transmitter: Arc<dyn Transmitter>,
    ) -> Self {
        Self::build(prefs, Some(ContentGenerator::new(backend)), true, transmitter)
    }

    fn build(
        prefs: SessionPrefs,
        generator: Option<ContentGenerator>,
        injected_backend: bool,
        transmitter: Arc<dyn Transmitter>,
    ) -> Self {
        Self {
            prefs,
            smtp_password: None,
            generator,
            injected_backend,
            transmitter,
            draft: None,
            attachments: Vec::new(),
            workflow: SendWorkflow::new(),
            job_credentials: None,
        }
    }

    // -- settings ------------------------------------------------------------

    pub fn prefs(&self) -> &SessionPrefs {
        &self.prefs
    }

    /// Replace prefs. A changed API key rebuilds the Gemini client unless
    /// the backend was injected.
    pub fn set_prefs(&mut self, prefs: SessionPrefs) {
        if !self.injected_backend && prefs.api_key != self.prefs.api_key {
            self.generator = gemini_generator(&prefs.api_key);
        }
        self.prefs = prefs;
    }

    pub fn set_recipient(&mut self, recipient: &str) {
        self.prefs.to_email = recipient.trim().to_string();
    }

    pub fn set_smtp_password(&mut self, password: &str) {
        let password = sanitize(password);
        self.smtp_password = (!password.is_empty()).then_some(password);
    }

    pub fn credentials(&self) -> Result<SmtpConfig, ConfigError> {
        SmtpConfig::from_prefs(&self.prefs, self.smtp_password.as_deref().unwrap_or_default())
    }

    /// Every configuration gap, for a blocking warning in the UI.
    pub fn readiness(&self) -> Vec<ConfigError> {
        let mut issues = self.prefs.missing(self.smtp_password.as_deref());
        if self.injected_backend {
            issues.retain(|issue| *issue != ConfigError::MissingApiKey);
        } else if self.generator.is_none() && !issues.contains(&ConfigError::MissingApiKey) {
            issues.insert(0, ConfigError::MissingApiKey);
        }
        issues
    }

    /// Dry test: connect, STARTTLS and authenticate without sending.
    pub async fn check_connection(&self) -> Result<(), AgentError> {
        let credentials = self.credentials()?;
        self.transmitter.verify(&credentials).await?;
        log::info!("SMTP connection to {} verified", credentials.server);
        Ok(())
    }

    // -- drafting ------------------------------------------------------------

    pub fn draft(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    fn generator(&self) -> Result<&ContentGenerator, ConfigError> {
        self.generator.as_ref().ok_or(ConfigError::MissingApiKey)
    }

    /// Generate a fresh draft for `subject`, replacing any previous one.
    pub async fn generate_draft(&mut self, subject: &str) -> Result<&Draft, AgentError> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(ValidationError::MissingSubject.into());
        }
        let names: Vec<String> = self.attachments.iter().map(|a| a.filename.clone()).collect();
        let body = self.generator()?.generate_body(subject, &names).await?;

        let signature = Some(self.prefs.signature.clone()).filter(|s| !s.trim().is_empty());
        let body_html = mime::format_for_editor(&body, signature.as_deref());
        Ok(self.draft.insert(Draft {
            subject: subject.to_string(),
            body_html,
            signature,
        }))
    }

    /// Record the user's edits from the rich-text editor.
    pub fn edit_body(&mut self, body_html: &str) -> Result<(), ValidationError> {
        let draft = self.draft.as_mut().ok_or(ValidationError::NoDraft)?;
        draft.body_html = body_html.to_string();
        Ok(())
    }

    pub fn set_subject(&mut self, subject: &str) -> Result<(), ValidationError> {
        let draft = self.draft.as_mut().ok_or(ValidationError::NoDraft)?;
        draft.subject = subject.to_string();
        Ok(())
    }

    /// Ask the generator for a better subject, from the body when there is
    /// one, otherwise from the current rough subject.
    pub async fn optimize_subject(&mut self) -> Result<String, AgentError> {
        let draft = self.draft.as_ref().ok_or(ValidationError::NoDraft)?;
        let source = if draft.body_html.trim().is_empty() {
            draft.subject.clone()
        } else {
            draft.body_html.clone()
        };
        if source.trim().is_empty() {
            return Err(ValidationError::MissingSubject.into());
        }

        let subject = self.generator()?.optimize_subject(&source).await?;
        if let Some(draft) = self.draft.as_mut() {
            draft.subject = subject.clone();
        }
        Ok(subject)
    }

    // -- attachments ---------------------------------------------------------

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Queue files, rejecting oversized ones individually.
    pub fn add_attachments(&mut self, files: impl IntoIterator<Item = Attachment>) -> IntakeReport {
        let report = attachments::intake(files);
        self.attachments.extend(report.accepted.iter().cloned());
        report
    }

    pub fn remove_attachment(&mut self, filename: &str) -> bool {
        let before = self.attachments.len();
        self.attachments.retain(|a| a.filename != filename);
        self.attachments.len() != before
    }

    // -- sending -------------------------------------------------------------

    pub fn workflow(&self) -> &SendWorkflow {
        &self.workflow
    }

    /// Validate the draft and start the undo countdown.
    ///
    /// An unresolved body gets its placeholders highlighted in the draft so
    /// the editor shows what is missing.
    pub fn request_send(&mut self, now: Instant) -> Result<(), AgentError> {
        let credentials = self.credentials()?;
        let draft = self.draft.as_ref().ok_or(ValidationError::NoDraft)?;
        let request = SendRequest {
            recipient: self.prefs.to_email.clone(),
            subject: draft.subject.clone(),
            body_html: draft.body_html.clone(),
            attachments: self.attachments.clone(),
        };

        match self.workflow.begin(request, now) {
            Ok(()) => {
                self.job_credentials = Some(credentials);
                Ok(())
            }
            Err(SendError::Validation(e)) => {
                if let ValidationError::UnresolvedBody {
                    highlighted_body, ..
                } = &e
                {
                    if let Some(draft) = self.draft.as_mut() {
                        draft.body_html = highlighted_body.clone();
                    }
                }
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Undo during the countdown.
    pub fn cancel_send(&mut self) -> bool {
        let cancelled = self.workflow.cancel();
        if cancelled {
            self.job_credentials = None;
        }
        cancelled
    }

    pub fn countdown_status(&self, now: Instant) -> CountdownStatus {
        self.workflow.status(now)
    }

    /// Run the countdown and, unless `cancel_token` fires first, transmit.
    /// The draft is kept whatever the outcome so a failed send can be retried.
    pub async fn deliver<F>(
        &mut self,
        cancel_token: &CancellationToken,
        on_tick: F,
    ) -> Result<SendReport, AgentError>
    where
        F: FnMut(CountdownStatus),
    {
        let outcome = self.workflow.run_countdown(cancel_token, on_tick).await?;
        let credentials = self.job_credentials.take().ok_or(SendError::NotReady)?;
        if outcome == CountdownOutcome::Cancelled {
            return Ok(SendReport::Cancelled);
        }
        let report = self
            .workflow
            .transmit(self.transmitter.as_ref(), &credentials)
            .await?;
        Ok(report)
    }

    /// `request_send` followed by `deliver`.
    pub async fn send<F>(
        &mut self,
        cancel_token: &CancellationToken,
        on_tick: F,
    ) -> Result<SendReport, AgentError>
    where
        F: FnMut(CountdownStatus),
    {
        self.request_send(Instant::now())?;
        self.deliver(cancel_token, on_tick).await
    }

    /// Dismiss the last report and return to drafting.
    pub fn acknowledge(&mut self) {
        self.workflow.acknowledge();
    }
}

fn gemini_generator(api_key: &str) -> Option<ContentGenerator> {
    match GeminiClient::new(api_key) {
        Ok(client) => Some(ContentGenerator::new(Arc::new(client))),
        Err(e) => {
            log::warn!("Generation disabled: {e}");
            None
        }
    }
}
