//! Runs generation requests against the study state: reuses cached
//! results, lets at most one request per entry run at a time, and
//! persists every change.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::generator::{GenerationResult, Generator};
use crate::persistence::PersistenceGateway;
use crate::state::transitions::{self, Begin};
use crate::state::view::{self, ViewKind};
use crate::state::{Artifact, ArtifactKind, Course, StudyContext, StudyState, TopicContent};

/// What a request ended up doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "camelCase")]
pub enum RequestOutcome {
    /// The generator ran and its result was stored.
    Generated,
    /// The generator ran and failed; the message is on the entry.
    Failed(String),
    /// Data was already there; nothing ran.
    Cached,
    /// A request for the same entry was already running; nothing ran.
    InFlight,
}

impl RequestOutcome {
    fn settled<T>(result: &GenerationResult<T>) -> Self {
        match result {
            Ok(_) => RequestOutcome::Generated,
            Err(e) => RequestOutcome::Failed(e.message()),
        }
    }
}

pub struct Orchestrator {
    state: Mutex<StudyState>,
    generator: Arc<dyn Generator>,
    gateway: PersistenceGateway,
}

impl Orchestrator {
    /// Starts from whatever the gateway restores.
    pub fn new(generator: Arc<dyn Generator>, gateway: PersistenceGateway) -> Self {
        let state = gateway.load();
        Self {
            state: Mutex::new(state),
            generator,
            gateway,
        }
    }

    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    pub fn generator(&self) -> Arc<dyn Generator> {
        self.generator.clone()
    }

    pub async fn snapshot(&self) -> StudyState {
        self.state.lock().await.clone()
    }

    pub async fn topic(&self, topic: &str) -> Option<TopicContent> {
        self.state.lock().await.topic(topic).cloned()
    }

    pub async fn context(&self) -> StudyContext {
        self.state.lock().await.context()
    }

    /// Applies `f` under the lock and saves the result when `persist` says
    /// the returned value means the state changed.
    ///
    /// The write runs on the blocking pool but still under the lock, so
    /// snapshots land in the order the transitions happened.
    async fn transition<R>(
        &self,
        f: impl FnOnce(StudyState) -> (StudyState, R),
        persist: impl FnOnce(&R) -> bool,
    ) -> R {
        let mut guard = self.state.lock().await;
        let current = std::mem::take(&mut *guard);
        let (next, result) = f(current);
        *guard = next;
        if persist(&result) {
            let gateway = self.gateway.clone();
            let snapshot = guard.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || gateway.save(&snapshot)).await {
                error!(error = %e, "State save task failed");
            }
        }
        result
    }

    async fn update(&self, f: impl FnOnce(StudyState) -> StudyState) {
        self.transition(|s| (f(s), ()), |_| true).await
    }

    /// Generates one artifact for `topic` unless it is cached or already
    /// being generated.
    ///
    /// Narration needs the topic's explanation; without it the request is
    /// rejected with [`AppError::PreconditionFailed`] and nothing changes.
    pub async fn request_artifact(&self, topic: &str, kind: ArtifactKind) -> Result<RequestOutcome> {
        let (decision, ctx, script) = self
            .transition(
                |state| {
                    let (state, decision) = transitions::begin_artifact(state, topic, kind);
                    let ctx = state.context();
                    let script = state.topic(topic).and_then(|c| c.answer_text()).map(str::to_string);
                    (state, (decision, ctx, script))
                },
                |(decision, _, _)| decision.is_started(),
            )
            .await;

        match decision {
            Begin::Cached => {
                debug!(topic, %kind, "Cache hit");
                return Ok(RequestOutcome::Cached);
            }
            Begin::InFlight => {
                debug!(topic, %kind, "Request already in flight");
                return Ok(RequestOutcome::InFlight);
            }
            Begin::Rejected(reason) => {
                warn!(topic, %kind, %reason, "Request rejected");
                return Err(AppError::PreconditionFailed(reason));
            }
            Begin::Started => {}
        }

        info!(topic, %kind, "Generating");
        let result = self.fetch_artifact(&ctx, topic, kind, script.as_deref()).await;
        let outcome = RequestOutcome::settled(&result);
        if let RequestOutcome::Failed(message) = &outcome {
            warn!(topic, %kind, error = %message, "Generation failed");
        }

        self.update(|state| transitions::finish_artifact(state, topic, kind, result.map_err(|e| e.message())))
            .await;
        Ok(outcome)
    }

    /// Like [`request_artifact`](Self::request_artifact) but returns at once;
    /// the entry shows progress.
    pub fn spawn_artifact(self: &Arc<Self>, topic: String, kind: ArtifactKind) -> JoinHandle<Result<RequestOutcome>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.request_artifact(&topic, kind).await })
    }

    async fn fetch_artifact(
        &self,
        ctx: &StudyContext,
        topic: &str,
        kind: ArtifactKind,
        script: Option<&str>,
    ) -> GenerationResult<Artifact> {
        let generator = &self.generator;
        let artifact = match kind {
            ArtifactKind::Answer => Artifact::Answer(generator.explanation(ctx, topic).await?),
            ArtifactKind::VisualPrompt => Artifact::VisualPrompt(generator.visual_prompt(ctx, topic).await?),
            ArtifactKind::RealWorldExample => {
                Artifact::RealWorldExample(generator.real_world_example(ctx, topic).await?)
            }
            ArtifactKind::Mcqs => Artifact::Mcqs(generator.mcqs(ctx, topic).await?),
            ArtifactKind::ExplanationAudio => {
                // begin_artifact only starts narration when the explanation exists
                let script = script.unwrap_or_default();
                Artifact::ExplanationAudio(generator.narration(script).await?)
            }
        };
        Ok(artifact)
    }

    /// Generates the unit test for `chapter` unless cached or in flight.
    pub async fn request_unit_test(&self, chapter: &str) -> Result<RequestOutcome> {
        let (decision, ctx) = self
            .transition(
                |state| {
                    let (state, decision) = transitions::begin_unit_test(state, chapter);
                    let ctx = chapter_context(&state, chapter);
                    (state, (decision, ctx))
                },
                |(decision, _)| decision.is_started(),
            )
            .await;

        match decision {
            Begin::Cached => return Ok(RequestOutcome::Cached),
            Begin::InFlight => return Ok(RequestOutcome::InFlight),
            Begin::Rejected(reason) => {
                warn!(chapter, %reason, "Unit test request rejected");
                return Err(AppError::PreconditionFailed(reason));
            }
            Begin::Started => {}
        }

        info!(chapter, "Generating unit test");
        let result = self.generator.unit_test(&ctx, chapter).await;
        let outcome = RequestOutcome::settled(&result);
        self.update(|state| transitions::finish_unit_test(state, chapter, result.map_err(|e| e.message())))
            .await;
        Ok(outcome)
    }

    /// Asks for topics of `chapter` not listed yet and appends them.
    pub async fn load_more_topics(&self, chapter: &str) -> Result<RequestOutcome> {
        let (decision, ctx, seen) = self
            .transition(
                |state| {
                    let (state, decision) = transitions::begin_topic_list(state, chapter);
                    let ctx = chapter_context(&state, chapter);
                    let seen = state.topics.get(chapter).map(|l| l.items.clone()).unwrap_or_default();
                    (state, (decision, ctx, seen))
                },
                |(decision, _, _)| decision.is_started(),
            )
            .await;

        match decision {
            Begin::InFlight => return Ok(RequestOutcome::InFlight),
            Begin::Rejected(reason) => {
                warn!(chapter, %reason, "Topic request rejected");
                return Err(AppError::PreconditionFailed(reason));
            }
            Begin::Cached | Begin::Started => {}
        }

        info!(chapter, seen = seen.len(), "Loading more topics");
        let result = self.generator.more_topics(&ctx, chapter, &seen).await;
        let outcome = RequestOutcome::settled(&result);
        self.update(|state| transitions::finish_topic_list(state, chapter, result.map_err(|e| e.message())))
            .await;
        Ok(outcome)
    }

    pub async fn select_course(&self, course: Course) {
        info!(grade = %course.grade, subject = %course.subject, "Course selected");
        self.update(|state| transitions::select_course(state, course)).await
    }

    pub async fn select_chapter(&self, chapter: Option<String>) {
        self.update(|state| transitions::select_chapter(state, chapter)).await
    }

    pub async fn select_topic(&self, topic: Option<String>) {
        self.update(|state| transitions::select_topic(state, topic)).await
    }

    /// Changes which artifact `topic` shows. Never generates anything.
    pub async fn select_view(&self, topic: &str, view: ViewKind) {
        self.update(|state| view::select_view(state, topic, view)).await
    }

    /// Drops everything, including the saved copy.
    pub async fn reset(&self) {
        info!("Resetting study state");
        let mut guard = self.state.lock().await;
        *guard = StudyState::default();
        let gateway = self.gateway.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || gateway.clear()).await {
            error!(error = %e, "State clear task failed");
        }
    }
}

fn chapter_context(state: &StudyState, chapter: &str) -> StudyContext {
    StudyContext {
        course: state.course.clone(),
        chapter: Some(chapter.to_string()),
    }
}
