use auralis_engine::api;
use auralis_engine::config::{Cli, EngineConfig};
use auralis_engine::error::StoreError;
use auralis_engine::preferences::PreferencesService;
use auralis_engine::profiles::ProfileService;
use auralis_engine::resolver::FingerprintResolver;
use auralis_engine::session::EngineContext;
use auralis_engine::store::FingerprintStore;
use auralis_engine::tracks::{MapResolver, PathResolver, TrackResolver};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Exit codes: 0 normal, 1 fatal configuration error, 2 unrecoverable
/// storage corruption.
const EXIT_CONFIG: i32 = 1;
const EXIT_STORAGE: i32 = 2;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match EngineConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            std::process::exit(EXIT_CONFIG);
        }
    };
    tracing::info!(bind = %config.bind, data_dir = %config.data_dir.display(), "starting auralis engine");

    let store = match FingerprintStore::open(&config.database_path()).await {
        Ok(store) => Arc::new(store),
        Err(e @ StoreError::Corrupt(_)) => {
            tracing::error!(error = %e, "fingerprint store is corrupt");
            std::process::exit(EXIT_STORAGE);
        }
        Err(e) => {
            tracing::error!(error = %e, "cannot open fingerprint store");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let tracks: Arc<dyn TrackResolver> = match &config.track_map {
        Some(path) => match MapResolver::from_file(path) {
            Ok(resolver) => Arc::new(resolver),
            Err(e) => {
                tracing::error!(error = %e, path = %path.display(), "cannot load track map");
                std::process::exit(EXIT_CONFIG);
            }
        },
        None => Arc::new(PathResolver::new(config.music_root.clone())),
    };

    let resolver = Arc::new(FingerprintResolver::new(
        Arc::clone(&store),
        config.canonical_sample_rate,
        config.fingerprint_cache_size,
    ));
    let preferences = Arc::new(PreferencesService::load(
        Some(config.preferences_path()),
        Some(config.feedback_log_path()),
    ));
    let profiles = Arc::new(ProfileService::load(Some(config.profiles_path())));

    let bind = config.bind;
    let ctx = EngineContext {
        config: Arc::new(config),
        store,
        resolver,
        preferences,
        profiles,
        tracks,
    };

    let app = Router::new()
        .route("/health", get(api::health::health_handler))
        .route("/ws", get(api::ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error = %e, %bind, "cannot bind control channel");
            std::process::exit(EXIT_CONFIG);
        }
    };
    tracing::info!(%bind, "control channel listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(EXIT_CONFIG);
    }
}
