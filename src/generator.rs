use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::mime;

/// A hosted text-generation backend: prompt in, text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Builds drafting prompts and normalizes what comes back.
#[derive(Clone)]
pub struct ContentGenerator {
    backend: Arc<dyn TextGenerator>,
}

impl ContentGenerator {
    pub fn new(backend: Arc<dyn TextGenerator>) -> Self {
        Self { backend }
    }

    /// Draft an email body for `subject`, mentioning any attachment names.
    pub async fn generate_body(
        &self,
        subject: &str,
        attachment_names: &[String],
    ) -> Result<String, GenerationError> {
        let prompt = body_prompt(subject, attachment_names);
        log::debug!("Generating body ({} prompt chars)", prompt.len());
        let text = self.backend.generate(&prompt).await?;
        let body = strip_subject_line(&text);
        if body.trim().is_empty() {
            return Err(GenerationError::Empty);
        }
        log::info!("Generated body for subject {subject:?}");
        Ok(body)
    }

    /// Suggest a single subject line for `content` (plain text or editor HTML).
    pub async fn optimize_subject(&self, content: &str) -> Result<String, GenerationError> {
        let prompt = subject_prompt(&mime::html_to_plain(content));
        let text = self.backend.generate(&prompt).await?;
        let subject = clean_subject(&text);
        if subject.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(subject)
    }
}

fn body_prompt(subject: &str, attachment_names: &[String]) -> String {
    let attachment_context = if attachment_names.is_empty() {
        String::new()
    } else {
        format!(
            "The following files are attached to this email: {}. \
             Explicitly mention them in the email body (e.g., 'Please find attached...').",
            attachment_names.join(", ")
        )
    };

    format!(
        "Analyze the subject '{subject}' to determine the appropriate tone (Professional vs Personal).\n\
         \n\
         - If the subject suggests a business, work, or formal context (e.g., \"Invoice\", \"Application\", \
         \"Meeting\", \"Resignation\"), use a Professional tone (formal, polite, concise).\n\
         - If the subject suggests a friends, family, or casual context (e.g., \"Party\", \"Catch up\", \
         \"Hello\", \"Trip\"), use a Personal tone (friendly, warm, casual).\n\
         \n\
         Write the email body accordingly.\n\
         \n\
         Context:\n\
         {attachment_context}\n\
         \n\
         Guidelines:\n\
         - Structure: Start directly with a salutation. Use single spacing between paragraphs. \
         Do NOT use excessive newlines.\n\
         - Exclusions: Do NOT include the subject line, a closing (Sincerely), signature placeholders \
         (like [Your Name]), or the detected tone label.\n\
         - Missing Info: If details (dates, names, attachments) are needed, use clear placeholders in \
         square brackets like [Date], [Name], [Insert Attachment].\n\
         \n\
         Return ONLY the email body text. Do not include any remarks about the generation."
    )
}

fn subject_prompt(content: &str) -> String {
    format!(
        "Generate a concise, professional, and attention-grabbing email subject line for the \
         following email content/purpose:\n\n'{content}'\n\nReturn ONLY the subject line, nothing else."
    )
}

/// Drop a leading `Subject:` line the model sometimes echoes back.
fn strip_subject_line(text: &str) -> String {
    let trimmed = text.trim_start();
    if !starts_with_label(trimmed) {
        return text.to_string();
    }
    match trimmed.split_once('\n') {
        Some((_, rest)) => rest.trim().to_string(),
        None => String::new(),
    }
}

fn clean_subject(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let line = if starts_with_label(line) {
        &line["subject:".len()..]
    } else {
        line
    };
    line.trim().to_string()
}

fn starts_with_label(text: &str) -> bool {
    text.get(..8)
        .is_some_and(|head| head.eq_ignore_ascii_case("subject:"))
}
