//! Scripted generator for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use crate::chat::ChatMessage;
use crate::generator::{GenerationFailure, GenerationResult, Generator, TextStream};
use crate::state::{McqQuestion, StudyContext, UnitTest, UnitTestQuestion};

/// Counts calls per operation, answers with canned content, and can be
/// told to fail or to hold every call until released.
#[derive(Default)]
pub(crate) struct FakeGenerator {
    calls: Mutex<HashMap<&'static str, usize>>,
    texts: Mutex<HashMap<&'static str, String>>,
    failures: Mutex<HashMap<&'static str, GenerationFailure>>,
    topics: Mutex<Vec<String>>,
    chat_reply: Mutex<Option<TextStream>>,
    chat_lens: Mutex<Vec<usize>>,
    contexts: Mutex<Vec<StudyContext>>,
    scripts: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every call waits for [`release`](Self::release).
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub(crate) fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub(crate) fn set_text(&self, op: &'static str, text: &str) {
        self.texts.lock().unwrap().insert(op, text.to_string());
    }

    /// The next call of `op` fails with `failure`.
    pub(crate) fn fail_next(&self, op: &'static str, failure: GenerationFailure) {
        self.failures.lock().unwrap().insert(op, failure);
    }

    pub(crate) fn set_topics(&self, topics: &[&str]) {
        *self.topics.lock().unwrap() = topics.iter().map(|t| t.to_string()).collect();
    }

    pub(crate) fn set_chat_reply(&self, reply: TextStream) {
        *self.chat_reply.lock().unwrap() = Some(reply);
    }

    pub(crate) fn chat_history_lens(&self) -> Vec<usize> {
        self.chat_lens.lock().unwrap().clone()
    }

    pub(crate) fn last_context(&self) -> Option<StudyContext> {
        self.contexts.lock().unwrap().last().cloned()
    }

    pub(crate) fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }

    async fn enter(&self, op: &'static str, ctx: Option<&StudyContext>) -> GenerationResult<()> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        if let Some(ctx) = ctx {
            self.contexts.lock().unwrap().push(ctx.clone());
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        match self.failures.lock().unwrap().remove(op) {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn text(&self, op: &'static str, default: String) -> String {
        self.texts.lock().unwrap().get(op).cloned().unwrap_or(default)
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn explanation(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<String> {
        self.enter("explanation", Some(ctx)).await?;
        Ok(self.text("explanation", format!("Explanation of {}", topic)))
    }

    async fn visual_prompt(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<String> {
        self.enter("visual_prompt", Some(ctx)).await?;
        Ok(self.text("visual_prompt", format!("Diagram of {}", topic)))
    }

    async fn real_world_example(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<String> {
        self.enter("real_world_example", Some(ctx)).await?;
        Ok(self.text("real_world_example", format!("{} in the kitchen", topic)))
    }

    async fn mcqs(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<Vec<McqQuestion>> {
        self.enter("mcqs", Some(ctx)).await?;
        Ok(vec![McqQuestion {
            question: format!("What is {}?", topic),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answer: "A".into(),
            explanation: "Because A.".into(),
        }])
    }

    async fn unit_test(&self, ctx: &StudyContext, chapter: &str) -> GenerationResult<UnitTest> {
        self.enter("unit_test", Some(ctx)).await?;
        Ok(UnitTest {
            questions: vec![UnitTestQuestion::ShortAnswer {
                question: format!("Summarise {}", chapter),
                answer: "It is about things.".into(),
            }],
        })
    }

    async fn narration(&self, script: &str) -> GenerationResult<String> {
        self.enter("narration", None).await?;
        self.scripts.lock().unwrap().push(script.to_string());
        Ok(self.text("narration", "AAABAAIA".to_string()))
    }

    async fn more_topics(
        &self,
        ctx: &StudyContext,
        _chapter: &str,
        _seen: &[String],
    ) -> GenerationResult<Vec<String>> {
        self.enter("more_topics", Some(ctx)).await?;
        Ok(self.topics.lock().unwrap().clone())
    }

    async fn chat_stream(&self, ctx: &StudyContext, history: &[ChatMessage]) -> GenerationResult<TextStream> {
        self.enter("chat", Some(ctx)).await?;
        self.chat_lens.lock().unwrap().push(history.len());
        let reply = self.chat_reply.lock().unwrap().take();
        Ok(reply.unwrap_or_else(|| stream::empty().boxed()))
    }
}
