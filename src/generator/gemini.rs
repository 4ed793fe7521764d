use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{sse, GenerationFailure, GenerationResult, Generator, TextStream};
use crate::chat::{ChatMessage, ChatRole};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::prompts;
use crate::state::{McqQuestion, StudyContext, UnitTest};

const NARRATION_VOICE: &str = "Kore";

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

impl Content {
    fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user",
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    model: String,
    tts_model: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(config: &Config) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            client,
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            tts_model: config.gemini_tts_model.clone(),
            api_key: config.gemini_api_key.clone(),
        })
    }

    fn url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post(&self, model: &str, method: &str, body: &Value) -> Result<Response> {
        let res = self
            .client
            .post(self.url(model, method))
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let text = res.text().await.unwrap_or_default();
        Err(AppError::GenerationError(api_error_message(status.as_u16(), &text)))
    }

    async fn generate(&self, model: &str, body: Value) -> Result<Value> {
        let start = Instant::now();
        let json: Value = self.post(model, "generateContent", &body).await?.json().await?;
        debug!(model, elapsed = ?start.elapsed(), "Gemini call finished");

        if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
            return Err(AppError::GenerationError(format!("Request was blocked: {}", reason)));
        }
        Ok(json)
    }

    async fn generate_text(&self, prompt: String) -> Result<String> {
        let body = json!({ "contents": [Content::user(prompt)] });
        let json = self.generate(&self.model, body).await?;
        let text = candidate_text(&json);
        if text.trim().is_empty() {
            return Err(AppError::GenerationError("The model returned an empty reply".to_string()));
        }
        Ok(text.trim().to_string())
    }

    async fn generate_json<T: DeserializeOwned>(&self, prompt: String) -> Result<T> {
        let body = json!({
            "contents": [Content::user(prompt)],
            "generationConfig": { "responseMimeType": "application/json" }
        });
        let json = self.generate(&self.model, body).await?;
        parse_json_reply(&candidate_text(&json))
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn explanation(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<String> {
        info!(topic, "Generating explanation");
        let text = self.generate_text(prompts::build_explanation_prompt(ctx, topic)).await?;
        Ok(prompts::ensure_heading(&text, topic))
    }

    async fn visual_prompt(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<String> {
        info!(topic, "Generating visual prompt");
        Ok(self.generate_text(prompts::build_visual_prompt(ctx, topic)).await?)
    }

    async fn real_world_example(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<String> {
        info!(topic, "Generating real-world example");
        Ok(self.generate_text(prompts::build_real_world_prompt(ctx, topic)).await?)
    }

    async fn mcqs(&self, ctx: &StudyContext, topic: &str) -> GenerationResult<Vec<McqQuestion>> {
        info!(topic, "Generating multiple-choice questions");
        let questions: Vec<McqQuestion> = self.generate_json(prompts::build_mcq_prompt(ctx, topic)).await?;
        let valid: Vec<McqQuestion> = questions
            .into_iter()
            .filter(|q| q.options.len() >= 2 && q.options.contains(&q.correct_answer))
            .collect();
        if valid.is_empty() {
            return Err(GenerationFailure::new("The model returned no usable questions"));
        }
        Ok(valid)
    }

    async fn unit_test(&self, ctx: &StudyContext, chapter: &str) -> GenerationResult<UnitTest> {
        info!(chapter, "Generating unit test");
        let test: UnitTest = self.generate_json(prompts::build_unit_test_prompt(ctx, chapter)).await?;
        if test.questions.is_empty() {
            return Err(GenerationFailure::new("The model returned an empty unit test"));
        }
        Ok(test)
    }

    async fn narration(&self, script: &str) -> GenerationResult<String> {
        info!(chars = script.len(), "Generating narration");
        let body = json!({
            "contents": [Content::user(prompts::build_narration_prompt(script))],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": NARRATION_VOICE } }
                }
            }
        });
        let json = self.generate(&self.tts_model, body).await?;
        inline_audio(&json).ok_or_else(|| GenerationFailure::new("The model returned no audio"))
    }

    async fn more_topics(
        &self,
        ctx: &StudyContext,
        chapter: &str,
        seen: &[String],
    ) -> GenerationResult<Vec<String>> {
        info!(chapter, seen = seen.len(), "Generating more topics");
        let topics: Vec<String> = self
            .generate_json(prompts::build_more_topics_prompt(ctx, chapter, seen))
            .await?;
        Ok(topics)
    }

    async fn chat_stream(&self, ctx: &StudyContext, history: &[ChatMessage]) -> GenerationResult<TextStream> {
        let contents: Vec<Content> = history
            .iter()
            .filter(|m| !m.text.is_empty())
            .map(|m| Content {
                role: match m.role {
                    ChatRole::User => "user",
                    ChatRole::Model => "model",
                },
                parts: vec![Part { text: m.text.clone() }],
            })
            .collect();
        debug!(turns = contents.len(), "Opening tutor stream");
        let body = json!({
            "systemInstruction": { "parts": [{ "text": prompts::build_tutor_instruction(ctx) }] },
            "contents": contents
        });

        let res = self.post(&self.model, "streamGenerateContent?alt=sse", &body).await?;
        Ok(sse::text_stream(res.bytes_stream()))
    }
}

/// Joined text of the first candidate's parts.
pub(crate) fn candidate_text(json: &Value) -> String {
    json["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn inline_audio(json: &Value) -> Option<String> {
    json["candidates"][0]["content"]["parts"]
        .as_array()?
        .iter()
        .find_map(|part| part["inlineData"]["data"].as_str())
        .filter(|data| !data.is_empty())
        .map(str::to_string)
}

fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(prompts::strip_code_fence(text)).map_err(|e| {
        warn!(error = %e, "Model reply did not match the expected JSON shape");
        AppError::ParseError(format!("Unexpected reply format: {}", e))
    })
}

fn api_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body.trim()))
}
