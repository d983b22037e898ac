pub mod attachments;
pub mod config;
pub mod error;
pub mod gemini;
pub mod generator;
pub mod mime;
pub mod models;
pub mod placeholder;
pub mod session;
pub mod smtp;
pub mod workflow;

pub use error::AgentError;
pub use session::ComposeSession;
pub use workflow::{SendPhase, SendReport};
