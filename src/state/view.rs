use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::StudyState;
use crate::error::AppError;

/// Which artifact a topic page is showing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewKind {
    #[default]
    Answer,
    Visualize,
    RealWorldExample,
    Mcqs,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Answer => "answer",
            ViewKind::Visualize => "visualize",
            ViewKind::RealWorldExample => "realWorldExample",
            ViewKind::Mcqs => "mcqs",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "answer" => Ok(ViewKind::Answer),
            "visualize" => Ok(ViewKind::Visualize),
            "realWorldExample" => Ok(ViewKind::RealWorldExample),
            "mcqs" => Ok(ViewKind::Mcqs),
            other => Err(AppError::ValidationError(format!("Unknown view: {}", other))),
        }
    }
}

impl StudyState {
    /// The view last selected for `topic`, or the explanation if none was.
    pub fn active_view(&self, topic: &str) -> ViewKind {
        self.active_views.get(topic).copied().unwrap_or_default()
    }
}

/// Records the view for one topic. Never triggers generation and never
/// touches other topics' selections.
pub fn select_view(mut state: StudyState, topic: &str, view: ViewKind) -> StudyState {
    state.active_views.insert(topic.to_string(), view);
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_topic_keeps_its_own_view() {
        let state = StudyState::default();
        let state = select_view(state, "Cells", ViewKind::Mcqs);
        let state = select_view(state, "Atoms", ViewKind::Visualize);

        assert_eq!(state.active_view("Cells"), ViewKind::Mcqs);
        assert_eq!(state.active_view("Atoms"), ViewKind::Visualize);
        assert_eq!(state.active_view("Gravity"), ViewKind::Answer);
        assert!(state.content.is_empty());
    }

    #[test]
    fn only_the_four_views_parse() {
        assert_eq!("realWorldExample".parse::<ViewKind>().unwrap(), ViewKind::RealWorldExample);
        assert!("audio".parse::<ViewKind>().is_err());
        assert!("Answer".parse::<ViewKind>().is_err());
    }
}
