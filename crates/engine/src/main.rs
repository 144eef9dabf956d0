//! QuoteForge Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod app;
mod infrastructure;
mod use_cases;

use app::App;
use infrastructure::ports::ConversionServicePort;
use infrastructure::{
    cadconv::CadConvClient, clock::SystemClock, events::BroadcastEventBus,
    neo4j::Neo4jRepositories, object_store::FsObjectStore, settings::SqliteSettingsRepo,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env from the working directory if present.
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quoteforge_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting QuoteForge Engine");

    // Load configuration
    let neo4j_uri = std::env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".into());
    let neo4j_user = std::env::var("NEO4J_USER").unwrap_or_else(|_| "neo4j".into());
    let neo4j_pass = std::env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "password".into());
    let cadconv_url = std::env::var("CADCONV_URL")
        .or_else(|_| std::env::var("CADCONV_BASE_URL"))
        .unwrap_or_else(|_| "http://localhost:8600".into());
    let object_store_root =
        std::env::var("OBJECT_STORE_ROOT").unwrap_or_else(|_| "objects".into());
    let settings_db = std::env::var("SETTINGS_DB").unwrap_or_else(|_| "settings.db".into());
    let server_host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let server_port: u16 = std::env::var("SERVER_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .unwrap_or(3000);

    // Clock shared by repositories
    let clock: Arc<dyn infrastructure::ports::ClockPort> = Arc::new(SystemClock::new());

    // Connect to Neo4j
    tracing::info!("Connecting to Neo4j at {}", neo4j_uri);
    let graph = neo4rs::Graph::new(&neo4j_uri, &neo4j_user, &neo4j_pass).await?;

    // Ensure database schema (constraints and indexes)
    infrastructure::neo4j::ensure_schema(&graph).await?;

    let repos = Neo4jRepositories::new(graph, clock.clone());

    // Infrastructure clients
    let conversion_service = Arc::new(CadConvClient::new(&cadconv_url));
    match conversion_service.check_health().await {
        Ok(true) => tracing::info!("Conversion service reachable at {}", cadconv_url),
        _ => tracing::warn!(
            "Conversion service not reachable at {}; conversions will fail until it is (or disable the subsystem in settings)",
            cadconv_url
        ),
    }
    let object_store = Arc::new(FsObjectStore::new(&object_store_root));
    let settings_repo = Arc::new(SqliteSettingsRepo::new(&settings_db, clock.clone()).await?);

    // Event bus with the audit-log subscriber
    let events = Arc::new(BroadcastEventBus::new());
    events.spawn_audit_logger();

    // Create application
    let app = Arc::new(App::new(
        repos,
        object_store,
        conversion_service,
        settings_repo,
        events,
    ));

    // Router with CORS and request tracing
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any)
        .allow_origin(Any);

    let router = api::routes()
        .route("/api/version", get(|| async { env!("CARGO_PKG_VERSION") }))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app);

    let addr: SocketAddr = format!("{server_host}:{server_port}").parse()?;
    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
