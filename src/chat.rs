//! Free-form tutoring conversation with streamed replies.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::generator::{Generator, TextStream};
use crate::state::StudyContext;

/// Replaces a reply whose stream failed.
pub const CHAT_FAILURE_REPLY: &str = "Sorry, I ran into a problem answering that. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            sent_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatOutcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub outcome: ChatOutcome,
    pub text: String,
}

/// Ordered conversation. While a reply is being written the last message
/// is the pending model message.
#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    pending: bool,
}

impl ChatSession {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Adds the user's message and an empty model reply. Returns the
    /// history to send, which ends with the user's message.
    pub fn begin_turn(&mut self, text: &str) -> Result<Vec<ChatMessage>> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::ValidationError("Message must not be empty".to_string()));
        }
        if self.pending {
            return Err(AppError::PreconditionFailed("A reply is still being written".to_string()));
        }

        self.messages.push(ChatMessage::new(ChatRole::User, text));
        let history = self.messages.clone();
        self.messages.push(ChatMessage::new(ChatRole::Model, ""));
        self.pending = true;
        Ok(history)
    }

    pub fn append_fragment(&mut self, fragment: &str) {
        if !self.pending {
            return;
        }
        if let Some(last) = self.messages.last_mut() {
            last.text.push_str(fragment);
        }
    }

    /// Settles the pending reply and returns its text.
    fn finish_turn(&mut self, outcome: ChatOutcome) -> String {
        if !self.pending {
            return String::new();
        }
        self.pending = false;

        match outcome {
            ChatOutcome::Completed => {}
            ChatOutcome::Failed => {
                if let Some(last) = self.messages.last_mut() {
                    last.text = CHAT_FAILURE_REPLY.to_string();
                }
            }
            ChatOutcome::Cancelled => {
                // a cancelled reply keeps whatever arrived; nothing arrived means no reply
                if self.messages.last().is_some_and(|m| m.text.is_empty()) {
                    self.messages.pop();
                    return String::new();
                }
            }
        }
        self.messages.last().map(|m| m.text.clone()).unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.pending = false;
    }
}

/// Drains `stream` into the session's pending reply until it ends, fails,
/// or `cancel` fires.
pub async fn stream_reply(session: &Mutex<ChatSession>, mut stream: TextStream, cancel: &CancellationToken) -> ChatOutcome {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ChatOutcome::Cancelled,
            next = stream.next() => next,
        };

        match next {
            Some(Ok(fragment)) => session.lock().await.append_fragment(&fragment),
            Some(Err(e)) => {
                warn!(error = %e, "Tutor reply stream failed");
                return ChatOutcome::Failed;
            }
            None => return ChatOutcome::Completed,
        }
    }
}

/// Tutor chat bound to a generator.
pub struct Tutor {
    generator: Arc<dyn Generator>,
    session: Mutex<ChatSession>,
}

impl Tutor {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            session: Mutex::new(ChatSession::default()),
        }
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.session.lock().await.messages().to_vec()
    }

    pub async fn clear(&self) {
        self.session.lock().await.clear();
    }

    /// Sends `text` and waits for the whole reply. Failures of the reply
    /// become the apology message; only invalid input is an error.
    pub async fn send(&self, ctx: &StudyContext, text: &str, cancel: CancellationToken) -> Result<ChatReply> {
        let history = self.session.lock().await.begin_turn(text)?;
        info!(turns = history.len(), "Tutor message received");

        let outcome = match self.generator.chat_stream(ctx, &history).await {
            Ok(stream) => stream_reply(&self.session, stream, &cancel).await,
            Err(e) => {
                warn!(error = %e, "Failed to open tutor reply stream");
                ChatOutcome::Failed
            }
        };

        let text = self.session.lock().await.finish_turn(outcome);
        debug!(?outcome, chars = text.len(), "Tutor reply finished");
        Ok(ChatReply { outcome, text })
    }
}
