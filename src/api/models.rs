use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::chat::ChatReply;
use crate::orchestrator::RequestOutcome;
use crate::persistence::Theme;
use crate::state::{ContentEntry, TopicContent, TopicList, UnitTest};

#[derive(Deserialize)]
pub struct CourseRequest {
    pub grade: String,
    pub subject: String,
}

#[derive(Deserialize, Default)]
pub struct GenerateQuery {
    /// Return straight away and let the entry show progress.
    #[serde(default)]
    pub background: bool,
}

#[derive(Deserialize)]
pub struct ViewRequest {
    pub view: String,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Deserialize, Serialize)]
pub struct ThemeBody {
    pub theme: Theme,
}

#[derive(Serialize)]
pub struct GenerateResponse {
    pub topic: String,
    pub kind: String,
    /// Absent when the request was left running in the background.
    pub outcome: Option<RequestOutcome>,
    pub content: TopicContent,
}

#[derive(Serialize)]
pub struct UnitTestResponse {
    pub chapter: String,
    pub outcome: RequestOutcome,
    pub unit_test: Option<ContentEntry<UnitTest>>,
}

#[derive(Serialize)]
pub struct TopicsResponse {
    pub chapter: String,
    pub outcome: RequestOutcome,
    pub topics: TopicList,
}

#[derive(Serialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub reply: ChatReply,
    pub replied_at: DateTime<Utc>,
}
