use once_cell::sync::Lazy;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{AppError, Result};

// Create a static client to reuse connections
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .unwrap_or_else(|_| Client::new())
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackForm {
    pub name: String,
    pub class: String,
    pub message: String,
}

impl FeedbackForm {
    /// Trims every field and requires all of them.
    pub fn validated(self) -> Result<Self> {
        let form = FeedbackForm {
            name: self.name.trim().to_string(),
            class: self.class.trim().to_string(),
            message: self.message.trim().to_string(),
        };
        for (field, value) in [("name", &form.name), ("class", &form.class), ("message", &form.message)] {
            if value.is_empty() {
                return Err(AppError::ValidationError(format!("Feedback {} must not be empty", field)));
            }
        }
        Ok(form)
    }
}

/// Posts a feedback form once. There is no retry.
pub async fn submit_feedback(endpoint: Option<&str>, form: FeedbackForm) -> Result<()> {
    let endpoint = endpoint
        .ok_or_else(|| AppError::ConfigError("No feedback endpoint is configured".to_string()))?;
    let form = form.validated()?;

    let res = CLIENT.post(endpoint).json(&form).send().await?;
    let status = res.status();
    if !status.is_success() {
        warn!(status = status.as_u16(), "Feedback endpoint rejected the submission");
        return Err(AppError::FeedbackError(format!("Endpoint answered with HTTP {}", status)));
    }

    info!(class = %form.class, "Feedback submitted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, class: &str, message: &str) -> FeedbackForm {
        FeedbackForm {
            name: name.into(),
            class: class.into(),
            message: message.into(),
        }
    }

    #[test]
    fn validation_trims_and_requires_fields() {
        let ok = form(" Asha ", "7B", " Great quizzes ").validated().unwrap();
        assert_eq!(ok, form("Asha", "7B", "Great quizzes"));

        let err = form("Asha", "  ", "hi").validated().unwrap_err();
        assert!(matches!(err, AppError::ValidationError(msg) if msg.contains("class")));
    }

    #[tokio::test]
    async fn missing_endpoint_is_a_config_error() {
        let err = submit_feedback(None, form("A", "B", "C")).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[tokio::test]
    async fn invalid_form_is_rejected_before_sending() {
        let err = submit_feedback(Some("http://127.0.0.1:9/feedback"), form("", "B", "C"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
