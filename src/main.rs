use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ad_studio::claude_client::ClaudeClient;
use ad_studio::config::{AppConfig, ImageProvider};
use ad_studio::fal_client::FalClient;
use ad_studio::gemini_client::GeminiClient;
use ad_studio::generators::{
    AssetStore, ClaudeStoryboardGenerator, FalKeyframeGenerator, FalVideoSynthesizer,
    GeminiKeyframeGenerator, KeyframeGenerator,
};
use ad_studio::handlers::app_router;
use ad_studio::pipeline::{Collaborators, SessionRegistry};
use ad_studio::storage::LocalAssetStore;
use ad_studio::{AppState, ProviderStatus};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = AppConfig::from_env();
    config.log_summary();

    if let Err(e) = tokio::fs::create_dir_all(&config.asset_dir).await {
        tracing::warn!("Failed to create asset directory {}: {}", config.asset_dir.display(), e);
    } else {
        tracing::info!("Asset directory ready");
    }

    let assets: Arc<dyn AssetStore> = Arc::new(LocalAssetStore::new(
        config.asset_dir.clone(),
        config.public_base_url.clone(),
    ));

    let fal = FalClient::new(config.fal_key.clone());
    let keyframes: Arc<dyn KeyframeGenerator> = match config.image_provider {
        ImageProvider::Fal => {
            tracing::info!("🖼️ Keyframes via fal.ai nano-banana");
            Arc::new(FalKeyframeGenerator::new(fal.clone(), config.reference_strengths))
        }
        ImageProvider::Gemini => {
            tracing::info!("🖼️ Keyframes via Gemini image generation");
            Arc::new(GeminiKeyframeGenerator::new(
                GeminiClient::new(config.gemini_api_key.clone()),
                assets.clone(),
            ))
        }
    };

    let collaborators = Collaborators {
        storyboard: Arc::new(ClaudeStoryboardGenerator::new(ClaudeClient::new(
            config.anthropic_api_key.clone(),
        ))),
        keyframes,
        video: Arc::new(FalVideoSynthesizer::new(fal)),
        assets,
    };

    let settings = config.pipeline_settings();
    let sessions = Arc::new(SessionRegistry::new(collaborators.clone(), settings.clone()));

    let shared_state = Arc::new(AppState {
        sessions: sessions.clone(),
        collaborators,
        settings,
        asset_dir: config.asset_dir.clone(),
        providers: ProviderStatus {
            claude: config.anthropic_api_key.is_some(),
            fal: config.fal_key.is_some(),
            gemini: config.gemini_api_key.is_some(),
            image_provider: config.image_provider.as_str().to_string(),
        },
    });

    // Idle session eviction
    let ttl_hours = config.session_ttl_hours;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sessions.cleanup_idle(ttl_hours).await;
        }
    });

    let app = app_router(shared_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug,ad_studio=trace,reqwest=info,hyper=info,tower=info".to_string()
        } else {
            "info,ad_studio=info,reqwest=warn,hyper=warn,tower=warn".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log_level))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!("🎬 Ad Studio starting up...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Build mode: {}", if cfg!(debug_assertions) { "development" } else { "production" });
    tracing::info!("Log level: {}", log_level);

    Ok(())
}
