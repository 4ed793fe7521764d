use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::KeyValueStore;
use crate::error::{AppError, Result};
use crate::state::StudyState;

pub const STATE_KEY: &str = "study-companion-state";
pub const THEME_KEY: &str = "study-companion-theme";

/// Top-level fields a snapshot must carry, and whether each is a map.
const REQUIRED_FIELDS: &[(&str, bool)] = &[
    ("course", false),
    ("selectedChapter", false),
    ("selectedTopic", false),
    ("topics", true),
    ("content", true),
    ("activeViews", true),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(AppError::ValidationError(format!("Unknown theme: {}", other))),
        }
    }
}

/// Writes the study state on every change and reads it back at startup.
///
/// Persistence is best effort: nothing here returns an error to the caller.
/// Failures are logged and the in-memory state carries on.
#[derive(Clone)]
pub struct PersistenceGateway {
    store: Arc<dyn KeyValueStore>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The stored state, or the empty default when there is none. A stored
    /// value that fails validation is deleted. Entries saved while loading
    /// come back as failures that can be requested again.
    pub fn load(&self) -> StudyState {
        let raw = match self.store.get(STATE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No saved study state, starting fresh");
                return StudyState::default();
            }
            Err(e) => {
                error!(error = %e, "Failed to read saved study state");
                return StudyState::default();
            }
        };

        match parse_snapshot(&raw) {
            Ok(mut state) => {
                debug!(topics = state.content.len(), "Restored study state");
                // nothing that was loading at save time is still running
                let interrupted = state.interrupt_loading();
                if interrupted > 0 {
                    warn!(interrupted, "Marked unfinished requests as failed");
                    self.save(&state);
                }
                state
            }
            Err(e) => {
                warn!(error = %e, "Discarding corrupted study state");
                if let Err(e) = self.store.remove(STATE_KEY) {
                    error!(error = %e, "Failed to remove corrupted study state");
                }
                StudyState::default()
            }
        }
    }

    /// Writes `state` without narration payloads. On a quota error the saved
    /// state is dropped entirely.
    pub fn save(&self, state: &StudyState) {
        let json = match serde_json::to_string(&state.without_audio()) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize study state");
                return;
            }
        };

        match self.store.set(STATE_KEY, &json) {
            Ok(()) => {}
            Err(AppError::QuotaExceeded(_)) => {
                warn!(bytes = json.len(), "Storage quota exceeded, clearing saved study state");
                if let Err(e) = self.store.remove(STATE_KEY) {
                    error!(error = %e, "Failed to clear saved study state");
                }
            }
            Err(e) => error!(error = %e, "Failed to save study state"),
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(STATE_KEY) {
            error!(error = %e, "Failed to clear saved study state");
        }
    }

    pub fn load_theme(&self) -> Theme {
        match self.store.get(THEME_KEY) {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|_| {
                debug!(value = %raw, "Ignoring unknown saved theme");
                Theme::default()
            }),
            Ok(None) => Theme::default(),
            Err(e) => {
                error!(error = %e, "Failed to read saved theme");
                Theme::default()
            }
        }
    }

    pub fn save_theme(&self, theme: Theme) {
        if let Err(e) = self.store.set(THEME_KEY, theme.as_str()) {
            error!(error = %e, "Failed to save theme");
        }
    }
}

/// Parses a stored snapshot, rejecting anything that is not JSON, lacks a
/// required top-level field, or holds an entry with both data and error.
pub fn parse_snapshot(raw: &str) -> Result<StudyState> {
    let value: Value = serde_json::from_str(raw)?;
    let object = value
        .as_object()
        .ok_or_else(|| AppError::ParseError("snapshot is not an object".to_string()))?;

    for (field, is_map) in REQUIRED_FIELDS {
        let present = object
            .get(*field)
            .ok_or_else(|| AppError::ParseError(format!("snapshot is missing '{}'", field)))?;
        if *is_map && !present.is_object() {
            return Err(AppError::ParseError(format!("'{}' must be an object", field)));
        }
    }
    if let Some(unit_tests) = object.get("unitTests") {
        if !unit_tests.is_object() {
            return Err(AppError::ParseError("'unitTests' must be an object".to_string()));
        }
    }

    let state: StudyState = serde_json::from_value(value)?;
    let consistent = state.content.values().all(|c| c.is_consistent())
        && state.unit_tests.values().all(|e| e.is_consistent());
    if !consistent {
        return Err(AppError::ParseError("snapshot holds an inconsistent entry".to_string()));
    }
    Ok(state)
}
