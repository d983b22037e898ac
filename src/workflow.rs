//! UI-agnostic send state machine.
//!
//! Front ends render [`SendWorkflow::phase`] and [`CountdownStatus`], and map
//! their "Send" / "Undo" controls to [`SendWorkflow::begin`] and
//! [`SendWorkflow::cancel`] (or a [`CancellationToken`] when the countdown is
//! driven by [`SendWorkflow::run_countdown`]).
//!
//! ```text
//! Drafting → Validating → Countdown → Sending → Completed
//!     ↑           │            │          └────→ Failed
//!     └───────────┘            └───────────────→ Cancelled
//! ```

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SmtpConfig;
use crate::error::{SendError, ValidationError};
use crate::mime;
use crate::models::{Attachment, SendJob};
use crate::placeholder;
use crate::smtp::Transmitter;

/// Length of the undo window.
pub const COUNTDOWN_SECS: u64 = 10;
const TICK: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Phase / status / report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    Drafting,
    Validating,
    Countdown,
    Sending,
    Completed,
    Failed,
    Cancelled,
}

impl SendPhase {
    /// Whether a new send may start from here.
    pub fn is_idle(self) -> bool {
        matches!(
            self,
            Self::Drafting | Self::Completed | Self::Failed | Self::Cancelled
        )
    }
}

/// What a countdown tick observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CountdownStatus {
    /// Still counting. `progress` is the elapsed fraction of the window.
    Remaining { secs: u64, progress: f64 },
    /// The window just ran out; the workflow moved to Sending.
    Expired,
    /// Not in the countdown phase.
    Inactive,
}

/// Final word on a job, for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendReport {
    Sent { recipient: String },
    Failed { reason: String },
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    Expired,
    Cancelled,
}

/// Everything the user is about to send.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub recipient: String,
    pub subject: String,
    /// Editor HTML as the user left it.
    pub body_html: String,
    /// Already filtered by attachment intake.
    pub attachments: Vec<Attachment>,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SendWorkflow {
    phase: SendPhase,
    job: Option<SendJob>,
    started: Option<Instant>,
    last_report: Option<SendReport>,
}

impl Default for SendWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole seconds left in the window after `elapsed`: `10 - floor(elapsed)`.
pub fn remaining_secs(elapsed: Duration) -> u64 {
    COUNTDOWN_SECS.saturating_sub(elapsed.as_secs())
}

/// Elapsed fraction of the window, clamped to `0.0..=1.0`.
pub fn progress(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() / COUNTDOWN_SECS as f64).min(1.0)
}

impl SendWorkflow {
    pub fn new() -> Self {
        Self {
            phase: SendPhase::Drafting,
            job: None,
            started: None,
            last_report: None,
        }
    }

    pub fn phase(&self) -> SendPhase {
        self.phase
    }

    pub fn job(&self) -> Option<&SendJob> {
        self.job.as_ref()
    }

    pub fn last_report(&self) -> Option<&SendReport> {
        self.last_report.as_ref()
    }

    fn set_phase(&mut self, phase: SendPhase) {
        log::debug!("send phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Validate `request` and, if clean, start the countdown at `now`.
    ///
    /// On a validation failure the workflow is back in Drafting and the
    /// error says what to fix.
    pub fn begin(&mut self, request: SendRequest, now: Instant) -> Result<(), SendError> {
        if !self.phase.is_idle() {
            return Err(SendError::InProgress);
        }
        self.last_report = None;
        self.set_phase(SendPhase::Validating);

        match Self::validate(&request) {
            Ok(rendered_body) => {
                let job = SendJob {
                    id: Uuid::new_v4(),
                    recipient: request.recipient.trim().to_string(),
                    subject: request.subject,
                    rendered_body,
                    attachments: request.attachments,
                };
                log::info!(
                    "Send job {} queued for {} ({} attachments)",
                    job.id,
                    job.recipient,
                    job.attachments.len()
                );
                self.job = Some(job);
                self.started = Some(now);
                self.set_phase(SendPhase::Countdown);
                Ok(())
            }
            Err(e) => {
                log::warn!("Send blocked: {e}");
                self.set_phase(SendPhase::Drafting);
                Err(e.into())
            }
        }
    }

    /// Gate subject and body, returning the cleaned, styled body.
    fn validate(request: &SendRequest) -> Result<String, ValidationError> {
        if request.recipient.trim().is_empty() {
            return Err(ValidationError::MissingRecipient);
        }

        let in_subject = placeholder::find_placeholders(&request.subject);
        if !in_subject.is_empty() {
            return Err(ValidationError::SubjectPlaceholders(in_subject));
        }

        let unresolved = placeholder::find_unresolved(&request.body_html);
        if !unresolved.is_empty() {
            let highlighted_body = placeholder::highlight(&request.body_html, &unresolved);
            return Err(ValidationError::UnresolvedBody {
                unresolved,
                highlighted_body,
            });
        }

        Ok(mime::wrap_styled(&mime::clean_body_html(&request.body_html)))
    }

    /// Countdown state at `now`, without changing phase.
    pub fn status(&self, now: Instant) -> CountdownStatus {
        match (self.phase, self.started) {
            (SendPhase::Countdown, Some(started)) => {
                let elapsed = now.saturating_duration_since(started);
                match remaining_secs(elapsed) {
                    0 => CountdownStatus::Expired,
                    secs => CountdownStatus::Remaining {
                        secs,
                        progress: progress(elapsed),
                    },
                }
            }
            _ => CountdownStatus::Inactive,
        }
    }

    /// Re-evaluate the countdown at `now`. Moves to Sending the first time
    /// the window has run out; later calls report `Inactive`.
    pub fn tick(&mut self, now: Instant) -> CountdownStatus {
        let status = self.status(now);
        if status == CountdownStatus::Expired {
            self.started = None;
            self.set_phase(SendPhase::Sending);
        }
        status
    }

    /// Undo during the countdown. Returns whether anything was cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.phase != SendPhase::Countdown {
            return false;
        }
        if let Some(job) = self.job.take() {
            log::info!("Send job {} cancelled by user", job.id);
        }
        self.started = None;
        self.last_report = Some(SendReport::Cancelled);
        self.set_phase(SendPhase::Cancelled);
        true
    }

    /// Drive the countdown on a one-second interval until it expires or
    /// `cancel_token` fires. A cancellation requested before a tick is
    /// always seen before that tick's expiry check.
    pub async fn run_countdown<F>(
        &mut self,
        cancel_token: &CancellationToken,
        mut on_tick: F,
    ) -> Result<CountdownOutcome, SendError>
    where
        F: FnMut(CountdownStatus),
    {
        if self.phase != SendPhase::Countdown {
            return Err(SendError::NotReady);
        }

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    self.cancel();
                    return Ok(CountdownOutcome::Cancelled);
                }
                _ = ticker.tick() => {
                    if cancel_token.is_cancelled() {
                        self.cancel();
                        return Ok(CountdownOutcome::Cancelled);
                    }
                    let status = self.tick(Instant::now());
                    on_tick(status);
                    if status == CountdownStatus::Expired {
                        return Ok(CountdownOutcome::Expired);
                    }
                }
            }
        }
    }

    /// Hand the job to `transmitter`. Completed or Failed afterwards; the job
    /// is gone either way.
    pub async fn transmit(
        &mut self,
        transmitter: &dyn Transmitter,
        credentials: &SmtpConfig,
    ) -> Result<SendReport, SendError> {
        if self.phase != SendPhase::Sending {
            return Err(SendError::NotReady);
        }
        let job = self.job.take().ok_or(SendError::NotReady)?;
        for name in job.attachment_names() {
            log::info!("Attaching {name}");
        }

        let report = match transmitter.send(&job, credentials).await {
            Ok(()) => {
                self.set_phase(SendPhase::Completed);
                SendReport::Sent {
                    recipient: job.recipient,
                }
            }
            Err(e) => {
                log::warn!("Send job {} failed: {e}", job.id);
                self.set_phase(SendPhase::Failed);
                SendReport::Failed {
                    reason: e.to_string(),
                }
            }
        };
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Return a finished workflow to Drafting. No-op while a job is live.
    pub fn acknowledge(&mut self) {
        if self.phase.is_idle() {
            self.set_phase(SendPhase::Drafting);
        }
    }
}
