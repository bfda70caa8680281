//! Agent-vs-agent self-play in the terminal.
//!
//! Each side is read from `CHESSLM_WHITE` / `CHESSLM_BLACK` as
//! `provider[:model]` (default `ollama`). Ctrl-C stops the game before the
//! next ply.
//!
//! ```bash
//! CHESSLM_WHITE=openai:gpt-4o CHESSLM_BLACK=ollama cargo run --bin selfplay -- 40
//! ```

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Context;
use chesslm::config::Settings;
use chesslm::orchestrator::{Game, GameUpdate, PlayerConfig, Players};
use chesslm::transcript::TranscriptEntry;
use tokio::sync::mpsc;

/// Parse `provider[:model]`.
fn player_from_env(var: &str) -> anyhow::Result<PlayerConfig> {
    let raw = std::env::var(var).unwrap_or_else(|_| "ollama".to_string());
    let (provider, model) = raw.split_once(':').unwrap_or((raw.as_str(), ""));
    PlayerConfig::from_ui(provider, model, "").with_context(|| format!("parsing {}", var))
}

fn print_entry(entry: &TranscriptEntry) {
    match entry.title() {
        Some(title) => println!("[{}] {}\n    {}", entry.role.as_str(), title, entry.content),
        None => println!("[{}] {}", entry.role.as_str(), entry.content),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env().context("reading settings")?;
    let max_plies = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("invalid ply count '{}'", arg))?,
        None => settings.max_moves,
    };

    let players = Players::new(
        player_from_env("CHESSLM_WHITE")?,
        player_from_env("CHESSLM_BLACK")?,
    );
    log::info!("White: {:?}", players.white);
    log::info!("Black: {:?}", players.black);

    let mut game = Game::new(Arc::new(settings.agent_factory()))
        .with_players(players)
        .with_max_moves(max_plies);

    let cancel = game.cancel_flag();
    ctrlc::set_handler(move || {
        log::warn!("Interrupted; stopping before the next ply");
        cancel.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    let (tx, mut rx) = mpsc::channel::<GameUpdate>(32);
    let printer = tokio::spawn(async move {
        let mut printed = 0;
        while let Some(update) = rx.recv().await {
            for entry in update.transcript.entries().get(printed..).unwrap_or(&[]) {
                print_entry(entry);
            }
            printed = update.transcript.len();
            if let (Some(stop), Some(moves)) = (update.stop, update.moves_played) {
                println!("\nStopped ({}) after {} ply(s). Final FEN: {}", stop, moves, update.fen);
            }
        }
    });

    game.reset(&tx).await;
    drop(tx);
    printer.await.context("printer task failed")?;

    let board = game.board().lock();
    println!("Result: {} ({})", board.result(true), board.status());
    Ok(())
}
