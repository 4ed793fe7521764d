pub mod api;
pub mod audio;
pub mod chat;
pub mod config;
pub mod error;
pub mod feedback;
pub mod generator;
pub mod orchestrator;
pub mod persistence;
pub mod prompts;
pub mod state;

#[cfg(test)]
mod test_support;

use std::sync::Arc;
use chat::Tutor;
use config::Config;
use orchestrator::Orchestrator;

/// Application state that will be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub tutor: Arc<Tutor>,
}
