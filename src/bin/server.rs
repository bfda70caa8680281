//! chesslm HTTP server binary.
//!
//! Serves one game over HTTP and streams every run back as server-sent
//! events.
//!
//! # Environment Variables
//!
//! - `PORT` - HTTP port (default: 8080)
//! - `CHESSLM_MAX_MOVES` - agent plies per run (default: 200)
//! - `CHESSLM_MCP_URL` - remote MCP tool server (optional)
//! - `OLLAMA_BASE_URL` - local model endpoint (default: http://localhost:11434)
//! - `ANTHROPIC_API_KEY`, `MISTRAL_API_KEY`, `OPENAI_API_KEY`, `GEMINI_API_KEY`
//! - `RUST_LOG` - tracing filter (default: "info,chesslm=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;

use anyhow::Context;
use chesslm::config::Settings;
use chesslm::mcp::create_mcp_tools;
use chesslm::orchestrator::Game;
use chesslm::server::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing; `log` records from the library are forwarded.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chesslm=debug".into()),
        )
        .init();

    let settings = Settings::from_env().context("reading settings")?;
    tracing::debug!("Settings: {:?}", settings);

    let remote_tools = match &settings.mcp_url {
        Some(url) => match create_mcp_tools(url).await {
            Ok(tools) => tools,
            Err(e) => {
                tracing::warn!("MCP server {} unavailable, using local tools only: {:#}", url, e);
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    let game = Game::new(Arc::new(settings.agent_factory()))
        .with_remote_tools(remote_tools)
        .with_max_moves(settings.max_moves);
    let app = app_router(AppState::new(game));

    let bind_addr = format!("0.0.0.0:{}", settings.port);
    tracing::info!("chesslm server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health   - liveness probe");
    tracing::info!("  GET  /game     - current game state");
    tracing::info!("  PUT  /players  - configure both sides");
    tracing::info!("  POST /chat     - chat with the side to move (SSE)");
    tracing::info!("  POST /move     - human move, then autoplay (SSE)");
    tracing::info!("  POST /reset    - new game, then autoplay (SSE)");
    tracing::info!("  POST /cancel   - stop the current run");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;

    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
