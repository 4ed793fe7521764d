//! The external generative-language service, seen as a port.

pub mod gemini;
pub mod sse;

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::chat::ChatMessage;
use crate::error::AppError;
use crate::state::{McqQuestion, StudyContext, UnitTest};

pub use gemini::GeminiGenerator;

/// Shown when a failure carries no description of its own.
pub const FALLBACK_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// A rejected generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFailure {
    description: Option<String>,
}

impl GenerationFailure {
    pub fn new(description: impl Into<String>) -> Self {
        let description = description.into();
        let description = if description.trim().is_empty() { None } else { Some(description) };
        Self { description }
    }

    /// A failure with nothing useful to say about itself.
    pub fn unexplained() -> Self {
        Self { description: None }
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The text stored on the failed entry.
    pub fn message(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string())
    }
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description().unwrap_or(FALLBACK_ERROR_MESSAGE))
    }
}

impl std::error::Error for GenerationFailure {}

/// Keeps only the error's own description, without the kind prefix that
/// `AppError`'s `Display` adds.
impl From<AppError> for GenerationFailure {
    fn from(err: AppError) -> Self {
        match err {
            AppError::FetchError(msg)
            | AppError::GenerationError(msg)
            | AppError::PreconditionFailed(msg)
            | AppError::StorageError(msg)
            | AppError::QuotaExceeded(msg)
            | AppError::ParseError(msg)
            | AppError::NotFound(msg)
            | AppError::ValidationError(msg)
            | AppError::FeedbackError(msg)
            | AppError::ConfigError(msg) => GenerationFailure::new(msg),
        }
    }
}

impl From<reqwest::Error> for GenerationFailure {
    fn from(err: reqwest::Error) -> Self {
        GenerationFailure::from(AppError::from(err))
    }
}

pub type GenerationResult<T> = std::result::Result<T, GenerationFailure>;

/// Reply fragments in arrival order. Finite; dropping it abandons the reply.
pub type TextStream = BoxStream<'static, GenerationResult<String>>;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn explanation(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<String>;

    async fn visual_prompt(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<String>;

    async fn real_world_example(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<String>;

    async fn mcqs(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<Vec<McqQuestion>>;

    /// A mixed-question test over a whole chapter.
    async fn unit_test(&self, ctx: &StudyContext, chapter: &str) -> GenerationResult<UnitTest>;

    /// Narrates `script`, returning base64 encoded 16-bit mono PCM.
    async fn narration(&self, script: &str) -> GenerationResult<String>;

    /// Further topics for `chapter`, avoiding those in `seen`.
    async fn more_topics(
        &self,
        ctx: &StudyContext,
        chapter: &str,
        seen: &[String],
    ) -> GenerationResult<Vec<String>>;

    /// Starts a tutoring reply to the last user message in `history`.
    async fn chat_stream(&self, ctx: &StudyContext, history: &[ChatMessage]) -> GenerationResult<TextStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_descriptions_fall_back_to_generic_message() {
        assert_eq!(GenerationFailure::new("  ").message(), FALLBACK_ERROR_MESSAGE);
        assert_eq!(GenerationFailure::unexplained().to_string(), FALLBACK_ERROR_MESSAGE);
        assert_eq!(GenerationFailure::new("model overloaded").message(), "model overloaded");
    }

    #[test]
    fn app_errors_convert_without_their_kind_prefix() {
        let failure = GenerationFailure::from(AppError::GenerationError("Resource has been exhausted".into()));
        assert_eq!(failure.message(), "Resource has been exhausted");

        let failure = GenerationFailure::from(AppError::ParseError("Unexpected reply format: eof".into()));
        assert_eq!(failure.description(), Some("Unexpected reply format: eof"));
    }
}
