//! State transitions. Each takes the state by value and hands back the
//! updated state, so a caller can apply one under a single lock and
//! install the result.

use super::{Artifact, ArtifactKind, ContentEntry, Course, EntryStatus, StudyState, UnitTest};
use super::entry::blocks_request;

/// What a request should do after its entry was inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// The entry is now loading; the caller must run the fetch.
    Started,
    /// Data is already present.
    Cached,
    /// Another request for the same entry is running.
    InFlight,
    /// A precondition does not hold; nothing changed.
    Rejected(String),
}

impl Begin {
    pub fn is_started(&self) -> bool {
        matches!(self, Begin::Started)
    }
}

pub fn begin_artifact(mut state: StudyState, topic: &str, kind: ArtifactKind) -> (StudyState, Begin) {
    let content = state.content.get(topic);
    match content.map(|c| c.status(kind)) {
        Some(EntryStatus::Loading) => return (state, Begin::InFlight),
        Some(EntryStatus::Ready) => return (state, Begin::Cached),
        _ => {}
    }

    if kind == ArtifactKind::ExplanationAudio && content.and_then(|c| c.answer_text()).is_none() {
        let reason = format!("narration for '{}' needs its explanation first", topic);
        return (state, Begin::Rejected(reason));
    }

    state
        .content
        .entry(topic.to_string())
        .or_default()
        .mark_loading(kind);
    (state, Begin::Started)
}

/// Settles an entry previously moved to loading by [`begin_artifact`].
pub fn finish_artifact(
    mut state: StudyState,
    topic: &str,
    kind: ArtifactKind,
    outcome: Result<Artifact, String>,
) -> StudyState {
    let content = state.content.entry(topic.to_string()).or_default();
    match outcome {
        Ok(artifact) => {
            debug_assert_eq!(artifact.kind(), kind);
            content.store(artifact);
        }
        Err(message) => content.mark_failed(kind, &message),
    }
    state
}

pub fn begin_unit_test(mut state: StudyState, chapter: &str) -> (StudyState, Begin) {
    let entry = state.unit_tests.get(chapter);
    if blocks_request(entry) {
        let decision = if entry.is_some_and(ContentEntry::is_loading) {
            Begin::InFlight
        } else {
            Begin::Cached
        };
        return (state, decision);
    }
    if state.course.is_none() {
        return (state, Begin::Rejected("choose a grade and subject first".to_string()));
    }

    state.unit_tests.insert(chapter.to_string(), ContentEntry::loading());
    (state, Begin::Started)
}

pub fn finish_unit_test(mut state: StudyState, chapter: &str, outcome: Result<UnitTest, String>) -> StudyState {
    let entry = match outcome {
        Ok(test) => ContentEntry::success(test),
        Err(message) => ContentEntry::failure(message),
    };
    state.unit_tests.insert(chapter.to_string(), entry);
    state
}

/// Loading more topics always extends the list, so only a running
/// request blocks a new one.
pub fn begin_topic_list(mut state: StudyState, chapter: &str) -> (StudyState, Begin) {
    if state.topics.get(chapter).is_some_and(|list| list.is_loading) {
        return (state, Begin::InFlight);
    }
    if state.course.is_none() {
        return (state, Begin::Rejected("choose a grade and subject first".to_string()));
    }

    let list = state.topics.entry(chapter.to_string()).or_default();
    list.is_loading = true;
    list.error = None;
    (state, Begin::Started)
}

pub fn finish_topic_list(mut state: StudyState, chapter: &str, outcome: Result<Vec<String>, String>) -> StudyState {
    let list = state.topics.entry(chapter.to_string()).or_default();
    list.is_loading = false;
    match outcome {
        Ok(topics) => {
            list.merge(topics);
        }
        Err(message) => list.error = Some(message),
    }
    state
}

/// Switching course clears the chapter and topic selection. Cached
/// content stays.
pub fn select_course(mut state: StudyState, course: Course) -> StudyState {
    if state.course.as_ref() != Some(&course) {
        state.selected_chapter = None;
        state.selected_topic = None;
    }
    state.course = Some(course);
    state
}

pub fn select_chapter(mut state: StudyState, chapter: Option<String>) -> StudyState {
    if state.selected_chapter != chapter {
        state.selected_topic = None;
    }
    state.selected_chapter = chapter;
    state
}

pub fn select_topic(mut state: StudyState, topic: Option<String>) -> StudyState {
    state.selected_topic = topic;
    state
}
