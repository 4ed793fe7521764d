use serde::{Deserialize, Serialize};

/// Generation status of one artifact.
///
/// At most one of `data` and `error` is set, and a loading entry carries
/// neither. The only way to build an entry is through the constructors below,
/// which keeps that invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry<T> {
    #[serde(default)]
    is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

impl<T> ContentEntry<T> {
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            data: None,
            error: None,
        }
    }

    pub fn success(data: T) -> Self {
        Self {
            is_loading: false,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_loading: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn status(&self) -> EntryStatus {
        if self.is_loading {
            EntryStatus::Loading
        } else if self.data.is_some() {
            EntryStatus::Ready
        } else if self.error.is_some() {
            EntryStatus::Failed
        } else {
            EntryStatus::Idle
        }
    }

    /// False for shapes the constructors never produce, which can only come
    /// from a hand-edited or foreign snapshot.
    pub fn is_consistent(&self) -> bool {
        let settled = usize::from(self.data.is_some()) + usize::from(self.error.is_some());
        if self.is_loading { settled == 0 } else { settled <= 1 }
    }

    /// Turns a loading entry whose request can no longer finish into a
    /// failure. Returns whether anything changed.
    pub(crate) fn interrupt(&mut self, message: &str) -> bool {
        if !self.is_loading {
            return false;
        }
        *self = Self::failure(message);
        true
    }

    /// Drops the payload but keeps the loading flag and error.
    pub(crate) fn strip_data(&mut self) {
        self.data = None;
    }
}

/// Status of an entry slot that may not exist yet.
pub fn status_of<T>(entry: Option<&ContentEntry<T>>) -> EntryStatus {
    entry.map_or(EntryStatus::Idle, ContentEntry::status)
}

/// True when a new request must not be issued: data is present or a
/// request is already running. A failed entry does not block.
pub fn blocks_request<T>(entry: Option<&ContentEntry<T>>) -> bool {
    matches!(status_of(entry), EntryStatus::Loading | EntryStatus::Ready)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_keep_data_and_error_exclusive() {
        let loading: ContentEntry<String> = ContentEntry::loading();
        assert!(loading.is_loading());
        assert!(loading.data().is_none() && loading.error().is_none());

        let ok = ContentEntry::success("text".to_string());
        assert_eq!(ok.status(), EntryStatus::Ready);
        assert!(ok.error().is_none());

        let failed: ContentEntry<String> = ContentEntry::failure("boom");
        assert_eq!(failed.status(), EntryStatus::Failed);
        assert!(failed.data().is_none());
    }

    #[test]
    fn failed_entries_do_not_block_new_requests() {
        let failed: ContentEntry<String> = ContentEntry::failure("boom");
        assert!(!blocks_request(Some(&failed)));
        assert!(!blocks_request::<String>(None));
        assert!(blocks_request(Some(&ContentEntry::<String>::loading())));
        assert!(blocks_request(Some(&ContentEntry::success("x".to_string()))));
    }

    #[test]
    fn serializes_with_camel_case_and_omits_unset_fields() {
        let entry: ContentEntry<String> = ContentEntry::loading();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json, serde_json::json!({ "isLoading": true }));

        let back: ContentEntry<String> =
            serde_json::from_value(serde_json::json!({ "isLoading": false, "error": "e" })).unwrap();
        assert_eq!(back, ContentEntry::failure("e"));
    }

    #[test]
    fn interrupt_only_touches_loading_entries() {
        let mut loading: ContentEntry<String> = ContentEntry::loading();
        assert!(loading.interrupt("stopped"));
        assert_eq!(loading, ContentEntry::failure("stopped"));

        let mut ready = ContentEntry::success("x".to_string());
        assert!(!ready.interrupt("stopped"));
        assert_eq!(ready.status(), EntryStatus::Ready);
    }

    #[test]
    fn unit_test_entries_round_trip_through_json() {
        use crate::state::{UnitTest, UnitTestQuestion};

        let entry = ContentEntry::success(UnitTest {
            questions: vec![UnitTestQuestion::TrueFalse {
                question: "Light travels in straight lines".into(),
                answer: true,
            }],
        });
        let json = serde_json::to_string(&entry).unwrap();
        let back: ContentEntry<UnitTest> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);

        let loading: ContentEntry<UnitTest> = serde_json::from_str(r#"{"isLoading": true}"#).unwrap();
        assert_eq!(loading.status(), EntryStatus::Loading);
    }
}
