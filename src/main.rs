use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use scholarfeed::config::AppConfig;
use scholarfeed::openalex::{BibliographicIndex, OpenAlexClient};
use scholarfeed::query::build_parser;
use scholarfeed::routes;
use scholarfeed::services::AppState;
use scholarfeed::store::{MemoryUserBackend, PaperStore, UserStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::build().expect("Failed to load configuration");

    // 2. Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.server.rust_log))
        .init();

    tracing::info!("Starting scholarfeed...");

    // 3. Initialize stores (snapshots are loaded here when configured)
    let papers = PaperStore::new(
        config.store.papers_path.clone().map(PathBuf::from),
        config.paper_fresh_ttl(),
    );
    let users = UserStore::new(Arc::new(MemoryUserBackend::new(
        config.store.users_path.clone().map(PathBuf::from),
    )));
    tracing::info!(cached_papers = papers.len().await, "Stores ready");

    // 4. Upstream client and query parser
    let index: Arc<dyn BibliographicIndex> = Arc::new(OpenAlexClient::new(&config.openalex)?);
    let parser = build_parser(&config.parser);
    if config.auth.google_client_id.is_none() {
        tracing::warn!("OAuth client not configured; login endpoints will reject");
    }

    // 5. Initialize App State (Services)
    let state = AppState::new(Arc::new(config.clone()), index, parser, papers, users);

    // 6. Setup Router
    let app = routes::create_router(state);

    // 7. Start Server
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
