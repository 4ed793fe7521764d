use axum::{
    routing::{get, post, put},
    Router,
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tower_http::cors::{CorsLayer, Any};
use chrono::Utc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::models::{
    ChatRequest, ChatResponse, CourseRequest, GenerateQuery, GenerateResponse, ThemeBody, TopicsResponse,
    UnitTestResponse, ViewRequest,
};
use crate::api::response::{self, Reply};
use crate::audio::{NarrationPlayer, PlaybackState, WavRecorder};
use crate::chat::ChatMessage;
use crate::error::{AppError, Result};
use crate::feedback::{submit_feedback, FeedbackForm};
use crate::state::{ArtifactKind, Course, StudyState, ViewKind};
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/state", get(get_state).delete(reset_state))
        .route("/api/course", post(select_course))
        .route("/api/chapters/:chapter/select", post(select_chapter))
        .route("/api/chapters/:chapter/topics", post(load_more_topics))
        .route("/api/chapters/:chapter/unit-test", post(unit_test))
        .route("/api/topics/:topic/select", post(select_topic))
        .route("/api/topics/:topic/generate/:kind", post(generate))
        .route("/api/topics/:topic/view", put(select_view))
        .route("/api/topics/:topic/audio", get(narration_audio))
        .route("/api/chat", get(chat_history).post(chat).delete(clear_chat))
        .route("/api/feedback", post(feedback))
        .route("/api/theme", get(get_theme).put(set_theme))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::ValidationError(format!("{} must not be empty", field)));
    }
    Ok(value.to_string())
}

async fn get_state(State(state): State<AppState>) -> Reply<StudyState> {
    response::success(state.orchestrator.snapshot().await)
}

async fn reset_state(State(state): State<AppState>) -> Reply<StudyState> {
    state.orchestrator.reset().await;
    response::success(state.orchestrator.snapshot().await)
}

async fn select_course(State(state): State<AppState>, Json(req): Json<CourseRequest>) -> Reply<StudyState> {
    let course = match (required("grade", &req.grade), required("subject", &req.subject)) {
        (Ok(grade), Ok(subject)) => Course { grade, subject },
        (Err(e), _) | (_, Err(e)) => return response::from_error(e),
    };
    state.orchestrator.select_course(course).await;
    response::success(state.orchestrator.snapshot().await)
}

async fn select_chapter(State(state): State<AppState>, Path(chapter): Path<String>) -> Reply<StudyState> {
    state.orchestrator.select_chapter(Some(chapter)).await;
    response::success(state.orchestrator.snapshot().await)
}

async fn select_topic(State(state): State<AppState>, Path(topic): Path<String>) -> Reply<StudyState> {
    state.orchestrator.select_topic(Some(topic)).await;
    response::success(state.orchestrator.snapshot().await)
}

async fn select_view(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Json(req): Json<ViewRequest>,
) -> Reply<StudyState> {
    let view: ViewKind = match req.view.parse() {
        Ok(view) => view,
        Err(e) => return response::from_error(e),
    };
    state.orchestrator.select_view(&topic, view).await;
    response::success(state.orchestrator.snapshot().await)
}

async fn generate(
    State(state): State<AppState>,
    Path((topic, kind)): Path<(String, String)>,
    Query(query): Query<GenerateQuery>,
) -> Reply<GenerateResponse> {
    let kind: ArtifactKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return response::from_error(e),
    };
    let start_time = Instant::now();

    // The request runs on its own task so a timeout or a dropped client
    // never leaves the entry stuck in loading.
    let handle = state.orchestrator.spawn_artifact(topic.clone(), kind);
    let outcome = if query.background {
        None
    } else {
        match tokio::time::timeout(state.config.request_timeout, handle).await {
            Ok(Ok(Ok(outcome))) => Some(outcome),
            Ok(Ok(Err(err))) => return response::from_error(err),
            Ok(Err(join_err)) => return response::from_error(AppError::GenerationError(join_err.to_string())),
            Err(_) => {
                warn!(%topic, %kind, "Generation still running after timeout");
                None
            }
        }
    };
    debug!(%topic, %kind, elapsed = ?start_time.elapsed(), "Generate request handled");

    let status = if outcome.is_some() { StatusCode::OK } else { StatusCode::ACCEPTED };
    let content = state.orchestrator.topic(&topic).await.unwrap_or_default();
    response::with_status(
        status,
        GenerateResponse {
            topic,
            kind: kind.to_string(),
            outcome,
            content,
        },
    )
}

async fn unit_test(State(state): State<AppState>, Path(chapter): Path<String>) -> Reply<UnitTestResponse> {
    let outcome = match state.orchestrator.request_unit_test(&chapter).await {
        Ok(outcome) => outcome,
        Err(e) => return response::from_error(e),
    };
    let unit_test = state.orchestrator.snapshot().await.unit_tests.get(&chapter).cloned();
    response::success(UnitTestResponse {
        chapter,
        outcome,
        unit_test,
    })
}

async fn load_more_topics(State(state): State<AppState>, Path(chapter): Path<String>) -> Reply<TopicsResponse> {
    let outcome = match state.orchestrator.load_more_topics(&chapter).await {
        Ok(outcome) => outcome,
        Err(e) => return response::from_error(e),
    };
    let topics = state
        .orchestrator
        .snapshot()
        .await
        .topics
        .get(&chapter)
        .cloned()
        .unwrap_or_default();
    response::success(TopicsResponse {
        chapter,
        outcome,
        topics,
    })
}

/// The topic's narration as a WAV file. Answers 202 while it is still being
/// generated.
async fn narration_audio(State(state): State<AppState>, Path(topic): Path<String>) -> Response {
    let content = state.orchestrator.topic(&topic).await;
    let entry = content.as_ref().and_then(|c| c.explanation_audio.as_ref());

    let mut player = NarrationPlayer::new(WavRecorder::default());
    match player.toggle(entry) {
        Ok(PlaybackState::Playing) => match player.into_output().into_wav() {
            Some(wav) => ([(header::CONTENT_TYPE, "audio/wav")], wav).into_response(),
            None => AppError::NotFound(format!("no narration for '{}'", topic)).into_response(),
        },
        Ok(PlaybackState::Loading) => StatusCode::ACCEPTED.into_response(),
        Ok(_) => AppError::NotFound(format!("no narration for '{}'", topic)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn chat_history(State(state): State<AppState>) -> Reply<Vec<ChatMessage>> {
    response::success(state.tutor.history().await)
}

async fn clear_chat(State(state): State<AppState>) -> Reply<Vec<ChatMessage>> {
    state.tutor.clear().await;
    response::success(Vec::new())
}

async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Reply<ChatResponse> {
    let cancel = CancellationToken::new();
    // dropping this handler (client went away) cancels the reply
    let _cancel_on_drop = cancel.clone().drop_guard();

    let ctx = state.orchestrator.context().await;
    let tutor = state.tutor.clone();
    let task = tokio::spawn(async move { tutor.send(&ctx, &req.message, cancel).await });

    match task.await {
        Ok(Ok(reply)) => response::success(ChatResponse {
            reply,
            replied_at: Utc::now(),
        }),
        Ok(Err(e)) => response::from_error(e),
        Err(join_err) => response::from_error(AppError::GenerationError(join_err.to_string())),
    }
}

async fn feedback(State(state): State<AppState>, Json(form): Json<FeedbackForm>) -> Reply<&'static str> {
    info!("Processing feedback submission");
    let result = submit_feedback(state.config.feedback_url.as_deref(), form).await;
    response::from_result(result.map(|()| "received"))
}

async fn get_theme(State(state): State<AppState>) -> Reply<ThemeBody> {
    response::success(ThemeBody {
        theme: state.orchestrator.gateway().load_theme(),
    })
}

async fn set_theme(State(state): State<AppState>, Json(body): Json<ThemeBody>) -> Reply<ThemeBody> {
    state.orchestrator.gateway().save_theme(body.theme);
    response::success(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::orchestrator::{Orchestrator, RequestOutcome};
    use crate::persistence::{MemoryStore, PersistenceGateway, Theme};
    use crate::test_support::FakeGenerator;
    use crate::chat::Tutor;
    use std::sync::Arc;
    use std::time::Duration;

    fn app_state() -> (Arc<FakeGenerator>, AppState) {
        app_state_with(FakeGenerator::new())
    }

    fn app_state_with(generator: FakeGenerator) -> (Arc<FakeGenerator>, AppState) {
        let generator = Arc::new(generator);
        let gateway = PersistenceGateway::new(Arc::new(MemoryStore::new()));
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            gemini_api_key: "test".into(),
            gemini_base_url: "http://127.0.0.1:9".into(),
            gemini_model: "m".into(),
            gemini_tts_model: "t".into(),
            state_dir: std::env::temp_dir(),
            storage_quota_bytes: 1024 * 1024,
            feedback_url: None,
            request_timeout: Duration::from_secs(5),
        };
        let state = AppState {
            config: Arc::new(config),
            orchestrator: Arc::new(Orchestrator::new(generator.clone(), gateway)),
            tutor: Arc::new(Tutor::new(generator.clone())),
        };
        (generator, state)
    }

    #[tokio::test]
    async fn generate_returns_the_topic_content() {
        let (generator, state) = app_state();
        let path = Path(("Cells".to_string(), "answer".to_string()));

        let (status, Json(body)) = generate(State(state.clone()), path, Query(GenerateQuery::default())).await;
        assert_eq!(status, StatusCode::OK);
        let data = body.data.unwrap();
        assert_eq!(data.outcome, Some(RequestOutcome::Generated));
        assert_eq!(data.content.answer_text(), Some("Explanation of Cells"));

        let path = Path(("Cells".to_string(), "answer".to_string()));
        let (_, Json(body)) = generate(State(state), path, Query(GenerateQuery::default())).await;
        assert_eq!(body.data.unwrap().outcome, Some(RequestOutcome::Cached));
        assert_eq!(generator.calls("explanation"), 1);
    }

    #[tokio::test]
    async fn unknown_kind_and_missing_explanation_are_client_errors() {
        let (_, state) = app_state();
        let path = Path(("Cells".to_string(), "poem".to_string()));
        let (status, _) = generate(State(state.clone()), path, Query(GenerateQuery::default())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let path = Path(("Cells".to_string(), "audio".to_string()));
        let (status, Json(body)) = generate(State(state), path, Query(GenerateQuery::default())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.meta.message.unwrap().contains("explanation"));
    }

    #[tokio::test]
    async fn narration_is_served_as_wav() {
        let (_, state) = app_state();
        let response = narration_audio(State(state.clone()), Path("Cells".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        state.orchestrator.request_artifact("Cells", ArtifactKind::Answer).await.unwrap();
        state
            .orchestrator
            .request_artifact("Cells", ArtifactKind::ExplanationAudio)
            .await
            .unwrap();
        let response = narration_audio(State(state), Path("Cells".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    }

    #[tokio::test]
    async fn narration_in_progress_is_accepted() {
        let (generator, state) = app_state_with(FakeGenerator::gated());
        generator.release(1);
        state.orchestrator.request_artifact("Cells", ArtifactKind::Answer).await.unwrap();

        let pending = state.orchestrator.spawn_artifact("Cells".into(), ArtifactKind::ExplanationAudio);
        while state.orchestrator.snapshot().await.topic_status("Cells", ArtifactKind::ExplanationAudio)
            != crate::state::EntryStatus::Loading
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let response = narration_audio(State(state.clone()), Path("Cells".to_string())).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        generator.release(1);
        pending.await.unwrap().unwrap();
        let response = narration_audio(State(state), Path("Cells".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn view_and_theme_updates() {
        let (_, state) = app_state();
        let (status, Json(body)) = select_view(
            State(state.clone()),
            Path("Cells".to_string()),
            Json(ViewRequest { view: "visualize".into() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.data.unwrap().active_view("Cells"), ViewKind::Visualize);

        let (status, _) = select_view(
            State(state.clone()),
            Path("Cells".to_string()),
            Json(ViewRequest { view: "audio".into() }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        set_theme(State(state.clone()), Json(ThemeBody { theme: Theme::Dark })).await;
        let (_, Json(body)) = get_theme(State(state)).await;
        assert_eq!(body.data.unwrap().theme, Theme::Dark);
    }

    #[tokio::test]
    async fn course_fields_are_required() {
        let (_, state) = app_state();
        let req = CourseRequest { grade: " ".into(), subject: "Maths".into() };
        let (status, _) = select_course(State(state.clone()), Json(req)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let req = CourseRequest { grade: "6".into(), subject: "Maths".into() };
        let (_, Json(body)) = select_course(State(state), Json(req)).await;
        assert_eq!(body.data.unwrap().course.unwrap().subject, "Maths");
    }
}
