use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use crate::error::{AppError, Result};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Browsers typically allow about 5 MiB per origin for local storage.
pub const DEFAULT_STORAGE_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_tts_model: String,
    pub state_dir: PathBuf,
    pub storage_quota_bytes: u64,
    pub feedback_url: Option<String>,
    pub request_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        let gemini_api_key = env::var("GEMINI_API_KEY")?;
        let gemini_base_url = env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string());
        let gemini_model = env::var("GEMINI_MODEL")
            .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
        let gemini_tts_model = env::var("GEMINI_TTS_MODEL")
            .unwrap_or_else(|_| DEFAULT_GEMINI_TTS_MODEL.to_string());

        // Server configuration with defaults
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        let port = port.parse::<u16>().map_err(|e| AppError::ConfigError(format!("Invalid port: {}", e)))?;
        let ip = IpAddr::from_str(&host).map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;
        let server_addr = SocketAddr::new(ip, port);

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".study-companion"));
        let storage_quota_bytes = parse_or_default("STORAGE_QUOTA_BYTES", DEFAULT_STORAGE_QUOTA_BYTES)?;
        let timeout_secs = parse_or_default("REQUEST_TIMEOUT_SECS", 90)?;

        let feedback_url = env::var("FEEDBACK_URL").ok().filter(|url| !url.trim().is_empty());

        Ok(Config {
            server_addr,
            gemini_api_key,
            gemini_base_url,
            gemini_model,
            gemini_tts_model,
            state_dir,
            storage_quota_bytes,
            feedback_url,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_or_default(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}
