use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use study_companion::{
    api::routes::create_router,
    chat::Tutor,
    config::Config,
    generator::gemini::GeminiGenerator,
    orchestrator::Orchestrator,
    persistence::{FileStore, PersistenceGateway},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let config = Config::load()?;
    let server_addr = config.server_addr;

    let store = FileStore::open(&config.state_dir, config.storage_quota_bytes)?;
    info!(dir = %store.dir().display(), "Using state directory");
    let gateway = PersistenceGateway::new(Arc::new(store));
    let generator = Arc::new(GeminiGenerator::new(&config)?);

    let app_state = AppState {
        orchestrator: Arc::new(Orchestrator::new(generator.clone(), gateway)),
        tutor: Arc::new(Tutor::new(generator)),
        config: Arc::new(config),
    };

    let app = create_router(app_state);
    let listener = TcpListener::bind(server_addr).await?;

    info!(%server_addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
