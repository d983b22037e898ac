use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The in-progress subject/body pair before sending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub subject: String,
    /// Editor HTML (placeholders emphasized, newlines as `<br>`).
    pub body_html: String,
    /// Signature appended at generation time, kept for reference.
    pub signature: Option<String>,
}

/// A file queued for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
    pub size_bytes: u64,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let size_bytes = data.len() as u64;
        Self {
            filename: filename.into(),
            data,
            size_bytes,
        }
    }

    /// Read a file from disk, keeping only its final path component as the name.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Self::new(filename, data))
    }
}

/// The unit of work tracked through the send workflow.
#[derive(Debug, Clone)]
pub struct SendJob {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    /// Cleaned body wrapped in the styled container.
    pub rendered_body: String,
    pub attachments: Vec<Attachment>,
}

impl SendJob {
    pub fn attachment_names(&self) -> Vec<&str> {
        self.attachments.iter().map(|a| a.filename.as_str()).collect()
    }
}

/// UI theme preference. Persisted, but otherwise opaque to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Light => "Light",
            Theme::Dark => "Dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Light" => Some(Theme::Light),
            "Dark" => Some(Theme::Dark),
            _ => None,
        }
    }
}
