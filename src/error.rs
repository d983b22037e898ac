use thiserror::Error;

/// Missing or unusable settings. Generation/send stay disabled until fixed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Gemini API key is missing")]
    MissingApiKey,

    #[error("SMTP settings incomplete: missing {}", .0.join(", "))]
    IncompleteSmtp(Vec<&'static str>),

    #[error("SMTP port must be between 1 and 65535")]
    InvalidPort,

    #[error("config I/O: {0}")]
    Io(String),

    #[error("config parse: {0}")]
    Parse(String),
}

/// Content that must be fixed by the user before it can be sent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter a subject first")]
    MissingSubject,

    #[error("Recipient email is missing")]
    MissingRecipient,

    #[error("No draft to work with; generate one first")]
    NoDraft,

    #[error("Subject line contains placeholders: {}", .0.join(", "))]
    SubjectPlaceholders(Vec<String>),

    #[error("Missing information detected in body: {}", .unresolved.join(", "))]
    UnresolvedBody {
        unresolved: Vec<String>,
        /// Body with every unresolved token wrapped in the attention style.
        highlighted_body: String,
    },
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited by the generation service")]
    RateLimited,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("The generation service returned no usable text")]
    Empty,
}

#[derive(Debug, Error)]
pub enum TransmissionError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("SMTP server did not accept the connection")]
    NotConnected,
}

/// Per-file intake rejection. Never aborts the rest of the upload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("File {filename} is too large ({size_bytes} bytes, limit {limit} bytes)")]
pub struct OversizeAttachment {
    pub filename: String,
    pub size_bytes: u64,
    pub limit: u64,
}

/// Why the send workflow refused to start.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("A send is already in progress")]
    InProgress,

    #[error("No send is ready to transmit")]
    NotReady,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Session-level umbrella over every failure class.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Transmission(#[from] TransmissionError),

    #[error(transparent)]
    Send(#[from] SendError),
}
