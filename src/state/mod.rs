//! Persistent study state: course selection, per-topic generated content,
//! per-chapter topic lists and unit tests, and per-topic view selection.

pub mod entry;
pub mod transitions;
pub mod view;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
pub use entry::{ContentEntry, EntryStatus};
pub use view::ViewKind;

/// Stored on entries that were still loading when the state was last saved.
pub const INTERRUPTED_MESSAGE: &str = "Generation was interrupted. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub grade: String,
    pub subject: String,
}

/// What the generator needs to know about where a request comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudyContext {
    pub course: Option<Course>,
    pub chapter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McqQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum UnitTestQuestion {
    MultipleChoice {
        question: String,
        options: Vec<String>,
        correct_answer: String,
    },
    ShortAnswer {
        question: String,
        answer: String,
    },
    TrueFalse {
        question: String,
        answer: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTest {
    pub questions: Vec<UnitTestQuestion>,
}

/// Topics listed for a chapter. Already listed topics stay visible while
/// more are being generated, so this is not a plain [`ContentEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicList {
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TopicList {
    /// Appends topics not listed yet, ignoring case and surrounding blanks.
    /// Returns how many were added.
    pub fn merge(&mut self, topics: Vec<String>) -> usize {
        let before = self.items.len();
        for topic in topics {
            let topic = topic.trim();
            if topic.is_empty() {
                continue;
            }
            let known = self.items.iter().any(|t| t.eq_ignore_ascii_case(topic));
            if !known {
                self.items.push(topic.to_string());
            }
        }
        self.items.len() - before
    }
}

/// Kinds of per-topic generated artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArtifactKind {
    Answer,
    VisualPrompt,
    RealWorldExample,
    Mcqs,
    ExplanationAudio,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Answer => "answer",
            ArtifactKind::VisualPrompt => "visualPrompt",
            ArtifactKind::RealWorldExample => "realWorldExample",
            ArtifactKind::Mcqs => "mcqs",
            ArtifactKind::ExplanationAudio => "explanationAudio",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "answer" => Ok(ArtifactKind::Answer),
            "visualize" | "visualPrompt" => Ok(ArtifactKind::VisualPrompt),
            "realWorldExample" => Ok(ArtifactKind::RealWorldExample),
            "mcqs" => Ok(ArtifactKind::Mcqs),
            "audio" | "explanationAudio" => Ok(ArtifactKind::ExplanationAudio),
            other => Err(AppError::ValidationError(format!("Unknown artifact kind: {}", other))),
        }
    }
}

/// A generated payload tagged with the kind it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Answer(String),
    VisualPrompt(String),
    RealWorldExample(String),
    Mcqs(Vec<McqQuestion>),
    /// Base64 encoded PCM.
    ExplanationAudio(String),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Answer(_) => ArtifactKind::Answer,
            Artifact::VisualPrompt(_) => ArtifactKind::VisualPrompt,
            Artifact::RealWorldExample(_) => ArtifactKind::RealWorldExample,
            Artifact::Mcqs(_) => ArtifactKind::Mcqs,
            Artifact::ExplanationAudio(_) => ArtifactKind::ExplanationAudio,
        }
    }
}

/// All generated content for one topic. Slots that were never requested
/// are `None` and left out of the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<ContentEntry<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_prompt: Option<ContentEntry<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_world_example: Option<ContentEntry<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcqs: Option<ContentEntry<Vec<McqQuestion>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_audio: Option<ContentEntry<String>>,
}

impl TopicContent {
    pub fn status(&self, kind: ArtifactKind) -> EntryStatus {
        match kind {
            ArtifactKind::Answer => entry::status_of(self.answer.as_ref()),
            ArtifactKind::VisualPrompt => entry::status_of(self.visual_prompt.as_ref()),
            ArtifactKind::RealWorldExample => entry::status_of(self.real_world_example.as_ref()),
            ArtifactKind::Mcqs => entry::status_of(self.mcqs.as_ref()),
            ArtifactKind::ExplanationAudio => entry::status_of(self.explanation_audio.as_ref()),
        }
    }

    pub fn blocks_request(&self, kind: ArtifactKind) -> bool {
        matches!(self.status(kind), EntryStatus::Loading | EntryStatus::Ready)
    }

    /// The explanation text, once generated. Narration is read from it.
    pub fn answer_text(&self) -> Option<&str> {
        self.answer.as_ref().and_then(|e| e.data()).map(String::as_str)
    }

    pub fn mark_loading(&mut self, kind: ArtifactKind) {
        match kind {
            ArtifactKind::Answer => self.answer = Some(ContentEntry::loading()),
            ArtifactKind::VisualPrompt => self.visual_prompt = Some(ContentEntry::loading()),
            ArtifactKind::RealWorldExample => self.real_world_example = Some(ContentEntry::loading()),
            ArtifactKind::Mcqs => self.mcqs = Some(ContentEntry::loading()),
            ArtifactKind::ExplanationAudio => self.explanation_audio = Some(ContentEntry::loading()),
        }
    }

    pub fn mark_failed(&mut self, kind: ArtifactKind, message: &str) {
        match kind {
            ArtifactKind::Answer => self.answer = Some(ContentEntry::failure(message)),
            ArtifactKind::VisualPrompt => self.visual_prompt = Some(ContentEntry::failure(message)),
            ArtifactKind::RealWorldExample => self.real_world_example = Some(ContentEntry::failure(message)),
            ArtifactKind::Mcqs => self.mcqs = Some(ContentEntry::failure(message)),
            ArtifactKind::ExplanationAudio => self.explanation_audio = Some(ContentEntry::failure(message)),
        }
    }

    pub fn store(&mut self, artifact: Artifact) {
        match artifact {
            Artifact::Answer(text) => self.answer = Some(ContentEntry::success(text)),
            Artifact::VisualPrompt(text) => self.visual_prompt = Some(ContentEntry::success(text)),
            Artifact::RealWorldExample(text) => self.real_world_example = Some(ContentEntry::success(text)),
            Artifact::Mcqs(questions) => self.mcqs = Some(ContentEntry::success(questions)),
            Artifact::ExplanationAudio(audio) => self.explanation_audio = Some(ContentEntry::success(audio)),
        }
    }

    pub(crate) fn strip_audio_payload(&mut self) {
        if let Some(audio) = self.explanation_audio.as_mut() {
            audio.strip_data();
        }
    }

    fn interrupt_loading(&mut self, message: &str) -> usize {
        let mut interrupted = 0;
        for entry in [&mut self.answer, &mut self.visual_prompt, &mut self.real_world_example, &mut self.explanation_audio]
            .into_iter()
            .flatten()
        {
            interrupted += usize::from(entry.interrupt(message));
        }
        if let Some(mcqs) = self.mcqs.as_mut() {
            interrupted += usize::from(mcqs.interrupt(message));
        }
        interrupted
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.answer.as_ref().is_none_or(ContentEntry::is_consistent)
            && self.visual_prompt.as_ref().is_none_or(ContentEntry::is_consistent)
            && self.real_world_example.as_ref().is_none_or(ContentEntry::is_consistent)
            && self.mcqs.as_ref().is_none_or(ContentEntry::is_consistent)
            && self.explanation_audio.as_ref().is_none_or(ContentEntry::is_consistent)
    }
}

/// The whole persistent application state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyState {
    pub course: Option<Course>,
    pub selected_chapter: Option<String>,
    pub selected_topic: Option<String>,
    pub topics: BTreeMap<String, TopicList>,
    pub content: BTreeMap<String, TopicContent>,
    pub active_views: BTreeMap<String, ViewKind>,
    #[serde(default)]
    pub unit_tests: BTreeMap<String, ContentEntry<UnitTest>>,
}

impl StudyState {
    pub fn topic(&self, topic: &str) -> Option<&TopicContent> {
        self.content.get(topic)
    }

    pub fn topic_status(&self, topic: &str, kind: ArtifactKind) -> EntryStatus {
        self.content
            .get(topic)
            .map_or(EntryStatus::Idle, |c| c.status(kind))
    }

    /// Context for generator calls about the current selection.
    pub fn context(&self) -> StudyContext {
        StudyContext {
            course: self.course.clone(),
            chapter: self.selected_chapter.clone(),
        }
    }

    /// Copy suitable for persisting: every narration payload removed.
    pub fn without_audio(&self) -> StudyState {
        let mut copy = self.clone();
        for content in copy.content.values_mut() {
            content.strip_audio_payload();
        }
        copy
    }

    /// Fails every entry and topic list left loading by a request that is
    /// no longer running, so it can be requested again. Returns how many
    /// were changed.
    pub fn interrupt_loading(&mut self) -> usize {
        let mut interrupted = 0;
        for content in self.content.values_mut() {
            interrupted += content.interrupt_loading(INTERRUPTED_MESSAGE);
        }
        for entry in self.unit_tests.values_mut() {
            interrupted += usize::from(entry.interrupt(INTERRUPTED_MESSAGE));
        }
        for list in self.topics.values_mut().filter(|l| l.is_loading) {
            list.is_loading = false;
            list.error = Some(INTERRUPTED_MESSAGE.to_string());
            interrupted += 1;
        }
        interrupted
    }
}
