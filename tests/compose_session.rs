use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use draftmail_core::config::{SessionPrefs, SmtpConfig};
use draftmail_core::error::{
    AgentError, ConfigError, GenerationError, TransmissionError, ValidationError,
};
use draftmail_core::generator::TextGenerator;
use draftmail_core::models::{Attachment, SendJob};
use draftmail_core::smtp::Transmitter;
use draftmail_core::workflow::CountdownStatus;
use draftmail_core::{ComposeSession, SendPhase, SendReport};

const MIB: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

struct ScriptedModel {
    answers: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().rev().map(|a| a.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.answers.lock().unwrap().pop().ok_or(GenerationError::Empty)
    }
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(SendJob, SmtpConfig)>>,
    refuse: Option<String>,
}

#[async_trait]
impl Transmitter for Outbox {
    async fn send(&self, job: &SendJob, credentials: &SmtpConfig) -> Result<(), TransmissionError> {
        if let Some(reason) = &self.refuse {
            return Err(TransmissionError::Smtp(reason.clone()));
        }
        self.sent.lock().unwrap().push((job.clone(), credentials.clone()));
        Ok(())
    }

    async fn verify(&self, _: &SmtpConfig) -> Result<(), TransmissionError> {
        match &self.refuse {
            Some(reason) => Err(TransmissionError::Smtp(reason.clone())),
            None => Ok(()),
        }
    }
}

fn prefs() -> SessionPrefs {
    SessionPrefs {
        api_key: "test-key".into(),
        signature: "Best regards,\nAlex".into(),
        smtp_server: "smtp.example.com".into(),
        smtp_email: "alex@example.com".into(),
        to_email: "x@y.com".into(),
        ..Default::default()
    }
}

fn session(model: Arc<ScriptedModel>, outbox: Arc<Outbox>) -> ComposeSession {
    let mut session = ComposeSession::with_generator(prefs(), model, outbox);
    session.set_smtp_password("app-password");
    session
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn project_update_reaches_completed() {
    let model = ScriptedModel::new(&["Hi team,\nThe project is on track for launch."]);
    let outbox = Arc::new(Outbox::default());
    let mut session = session(model, outbox.clone());

    let draft = session.generate_draft("Project Update").await.unwrap();
    assert_eq!(
        draft.body_html,
        "Hi team,<br>The project is on track for launch.<br><br>Best regards,<br>Alex"
    );

    let token = CancellationToken::new();
    let mut remaining = Vec::new();
    let report = session
        .send(&token, |status| {
            if let CountdownStatus::Remaining { secs, .. } = status {
                remaining.push(secs);
            }
        })
        .await
        .unwrap();

    assert_eq!(
        report,
        SendReport::Sent {
            recipient: "x@y.com".into()
        }
    );
    assert_eq!(session.workflow().phase(), SendPhase::Completed);
    assert_eq!(remaining, (1..=10).rev().collect::<Vec<u64>>());

    let sent = outbox.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    let (job, creds) = &sent[0];
    assert_eq!(job.recipient, "x@y.com");
    assert_eq!(job.subject, "Project Update");
    assert!(job.rendered_body.contains("Calibri"));
    assert!(job.rendered_body.contains("The project is on track"));
    assert_eq!(creds.password, "app-password");
    drop(sent);

    session.acknowledge();
    assert_eq!(session.workflow().phase(), SendPhase::Drafting);
    assert!(session.draft().is_some());
}

#[tokio::test]
async fn attachment_names_reach_the_prompt_and_the_job() {
    let model = ScriptedModel::new(&["Please find the report attached."]);
    let outbox = Arc::new(Outbox::default());
    let mut session = session(model.clone(), outbox);

    let report = session.add_attachments(vec![
        Attachment::new("huge.mov", vec![0u8; 11 * MIB]),
        Attachment::new("report.pdf", vec![7u8; MIB]),
    ]);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].filename, "huge.mov");

    session.generate_draft("Quarterly report").await.unwrap();
    assert!(model.prompts.lock().unwrap()[0].contains("report.pdf"));
    assert!(!model.prompts.lock().unwrap()[0].contains("huge.mov"));

    session.request_send(Instant::now()).unwrap();
    let job = session.workflow().job().unwrap();
    assert_eq!(job.attachment_names(), ["report.pdf"]);

    assert!(session.remove_attachment("report.pdf"));
    assert!(!session.remove_attachment("report.pdf"));
    assert!(session.attachments().is_empty());
}

#[tokio::test]
async fn placeholder_body_is_blocked_and_highlighted() {
    let model = ScriptedModel::new(&["Hello [Name], see you on [Date]."]);
    let mut session = session(model, Arc::new(Outbox::default()));
    session.generate_draft("Lunch").await.unwrap();

    let err = session.request_send(Instant::now()).unwrap_err();
    match err {
        AgentError::Validation(ValidationError::UnresolvedBody { unresolved, .. }) => {
            assert_eq!(unresolved, vec!["[Name]", "[Date]"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(session.workflow().phase(), SendPhase::Drafting);
    let body = &session.draft().unwrap().body_html;
    assert!(body.contains("background-color: #ffcccc"));

    // Fixing the text lets the send through.
    session
        .edit_body("Hello Sam, see you on Friday.")
        .unwrap();
    session.request_send(Instant::now()).unwrap();
    assert_eq!(session.workflow().phase(), SendPhase::Countdown);
}

#[tokio::test]
async fn default_signature_placeholder_blocks_sending() {
    let model = ScriptedModel::new(&["Hi Sam,\nSee you soon."]);
    let mut session = ComposeSession::with_generator(
        SessionPrefs {
            signature: SessionPrefs::default().signature,
            ..prefs()
        },
        model,
        Arc::new(Outbox::default()),
    );
    session.set_smtp_password("pw");
    session.generate_draft("Catch up").await.unwrap();

    let err = session.request_send(Instant::now()).unwrap_err();
    assert!(matches!(
        err,
        AgentError::Validation(ValidationError::UnresolvedBody { ref unresolved, .. })
            if unresolved == &vec!["[Your Name]".to_string()]
    ));
}

#[tokio::test]
async fn subject_with_placeholder_stays_drafting() {
    let model = ScriptedModel::new(&["Hi all,\nAgenda to follow."]);
    let mut session = session(model, Arc::new(Outbox::default()));
    session.generate_draft("Meeting on [Date]").await.unwrap();

    let err = session.request_send(Instant::now()).unwrap_err();
    assert!(matches!(
        err,
        AgentError::Validation(ValidationError::SubjectPlaceholders(_))
    ));
    assert_eq!(session.workflow().phase(), SendPhase::Drafting);
}

#[tokio::test(start_paused = true)]
async fn undo_cancels_and_nothing_is_sent() {
    let model = ScriptedModel::new(&["Hi team,\nShort note."]);
    let outbox = Arc::new(Outbox::default());
    let mut session = session(model, outbox.clone());
    session.generate_draft("Status").await.unwrap();

    let token = CancellationToken::new();
    let undo = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        undo.cancel();
    });

    let report = session.send(&token, |_| {}).await.unwrap();
    assert_eq!(report, SendReport::Cancelled);
    assert_eq!(session.workflow().phase(), SendPhase::Cancelled);
    assert!(outbox.sent.lock().unwrap().is_empty());
    assert!(session.draft().is_some());
}

#[tokio::test(start_paused = true)]
async fn transport_failure_keeps_draft_for_retry() {
    let model = ScriptedModel::new(&["Hi team,\nShort note."]);
    let outbox = Arc::new(Outbox {
        refuse: Some("535 5.7.8 Username and Password not accepted".into()),
        ..Default::default()
    });
    let mut session = session(model, outbox);
    session.generate_draft("Status").await.unwrap();

    let report = session.send(&CancellationToken::new(), |_| {}).await.unwrap();
    match report {
        SendReport::Failed { reason } => assert!(reason.contains("535")),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(session.workflow().phase(), SendPhase::Failed);
    assert_eq!(session.draft().unwrap().subject, "Status");

    // The user can go straight back to the countdown.
    session.request_send(Instant::now()).unwrap();
    assert_eq!(session.workflow().phase(), SendPhase::Countdown);
}

#[tokio::test]
async fn missing_password_disables_send() {
    let model = ScriptedModel::new(&["Hi"]);
    let mut session =
        ComposeSession::with_generator(prefs(), model, Arc::new(Outbox::default()));
    session.generate_draft("Hello").await.unwrap();

    assert_eq!(
        session.readiness(),
        vec![ConfigError::IncompleteSmtp(vec!["password"])]
    );
    let err = session.request_send(Instant::now()).unwrap_err();
    assert!(matches!(err, AgentError::Config(ConfigError::IncompleteSmtp(_))));
    assert_eq!(session.workflow().phase(), SendPhase::Drafting);
}

#[tokio::test]
async fn missing_api_key_disables_generation() {
    let mut session = ComposeSession::new(
        SessionPrefs {
            api_key: String::new(),
            ..prefs()
        },
        Arc::new(Outbox::default()),
    );
    assert!(session.readiness().contains(&ConfigError::MissingApiKey));
    let err = session.generate_draft("Hello").await.unwrap_err();
    assert!(matches!(err, AgentError::Config(ConfigError::MissingApiKey)));
    assert!(session.draft().is_none());
}

#[tokio::test]
async fn injected_backend_survives_prefs_changes() {
    let model = ScriptedModel::new(&["Body from the scripted model."]);
    let mut session = ComposeSession::with_generator(
        SessionPrefs {
            api_key: String::new(),
            ..prefs()
        },
        model.clone(),
        Arc::new(Outbox::default()),
    );
    session.set_smtp_password("pw");
    assert!(session.readiness().is_empty());

    session.set_prefs(SessionPrefs {
        api_key: "rotated-key".into(),
        ..prefs()
    });
    session.generate_draft("Hello").await.unwrap();
    assert_eq!(model.prompts.lock().unwrap().len(), 1);
    assert!(session.draft().unwrap().body_html.contains("scripted model"));
}

#[tokio::test]
async fn generation_failure_leaves_previous_draft() {
    let model = ScriptedModel::new(&["First draft body."]);
    let mut session = session(model, Arc::new(Outbox::default()));
    session.generate_draft("First").await.unwrap();

    let err = session.generate_draft("Second").await.unwrap_err();
    assert!(matches!(err, AgentError::Generation(GenerationError::Empty)));
    assert_eq!(session.draft().unwrap().subject, "First");
}

#[tokio::test]
async fn optimize_subject_rewrites_draft_subject() {
    let model = ScriptedModel::new(&["Hi team,\nBudget numbers inside.", "Subject: Q3 Budget Review"]);
    let mut session = session(model.clone(), Arc::new(Outbox::default()));
    session.generate_draft("budget stuff").await.unwrap();

    let subject = session.optimize_subject().await.unwrap();
    assert_eq!(subject, "Q3 Budget Review");
    assert_eq!(session.draft().unwrap().subject, "Q3 Budget Review");
    assert!(model.prompts.lock().unwrap()[1].contains("Budget numbers inside"));
}

#[tokio::test]
async fn connection_check_reports_transport_errors() {
    let ok = session(ScriptedModel::new(&[]), Arc::new(Outbox::default()));
    ok.check_connection().await.unwrap();

    let refused = session(
        ScriptedModel::new(&[]),
        Arc::new(Outbox {
            refuse: Some("connection refused".into()),
            ..Default::default()
        }),
    );
    assert!(matches!(
        refused.check_connection().await,
        Err(AgentError::Transmission(_))
    ));
}
