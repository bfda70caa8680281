//! Axum route handlers.
//!
//! # Routes
//!
//! - `GET  /health`  - liveness probe
//! - `GET  /game`    - transcript, FEN, players and phase
//! - `PUT  /players` - configure both sides from UI fields
//! - `POST /chat`    - `{prompt, fen?}`, one turn for the side to move
//! - `POST /move`    - `{fen}` or `{move}`, then autoplay
//! - `POST /reset`   - new game, then autoplay
//! - `POST /cancel`  - stop the current run before its next ply
//!
//! The three action routes answer with `text/event-stream`; every event is a
//! JSON [`GameUpdate`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::orchestrator::{Game, GameUpdate, HumanMove, PlayerConfig, Players};
use crate::server::error::ServerError;

/// Snapshots buffered between a run and its client.
const UPDATE_BUFFER: usize = 32;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// The single game; locked for the whole duration of a run.
    pub game: Arc<Mutex<Game>>,
    /// Cancel flag of the game, reachable while a run holds the lock.
    pub cancel: Arc<AtomicBool>,
    /// Set while a spawned run is in flight.
    pub running: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(game: Game) -> Self {
        let cancel = game.cancel_flag();
        Self {
            game: Arc::new(Mutex::new(game)),
            cancel,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn try_game(&self) -> Result<OwnedMutexGuard<Game>, ServerError> {
        Arc::clone(&self.game)
            .try_lock_owned()
            .map_err(|_| ServerError::Busy)
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/game", get(game_handler))
        .route("/players", put(players_handler))
        .route("/chat", post(chat_handler))
        .route("/move", post(move_handler))
        .route("/reset", post(reset_handler))
        .route("/cancel", post(cancel_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// One side as entered in a UI form.
#[derive(Debug, Deserialize)]
pub struct PlayerForm {
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
}

impl PlayerForm {
    fn to_player(&self) -> Result<PlayerConfig, ServerError> {
        Ok(PlayerConfig::from_ui(&self.provider, &self.model, &self.api_key)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayersRequest {
    pub white: PlayerForm,
    pub black: PlayerForm,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub fen: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    #[serde(default)]
    pub fen: Option<String>,
    #[serde(default, rename = "move")]
    pub mv: Option<String>,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

enum Run {
    Chat(String),
    Autoplay,
    Reset,
}

/// Drive a run on a spawned task and stream its updates.
///
/// The task owns the game lock until the run ends. If the client goes away
/// the run stops at its next update.
fn stream_run(
    state: &AppState,
    mut game: OwnedMutexGuard<Game>,
    run: Run,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::channel::<GameUpdate>(UPDATE_BUFFER);
    let running = Arc::clone(&state.running);
    running.store(true, Ordering::SeqCst);

    tokio::spawn(async move {
        let reason = match run {
            Run::Chat(prompt) => match game.chat(&prompt, None, &tx).await {
                Ok(reason) => reason,
                Err(e) => {
                    tracing::error!("Chat turn failed: {}", e);
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            },
            Run::Autoplay => game.resume(&tx).await,
            Run::Reset => game.reset(&tx).await,
        };
        running.store(false, Ordering::SeqCst);
        tracing::info!("Run finished: {}", reason);
    });

    let updates = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|update| (update, rx))
    });
    Sse::new(updates.map(|update| Event::default().json_data(update)))
        .keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /health - liveness probe.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "chesslm",
    }))
}

/// GET /game - current state.
async fn game_handler(State(state): State<AppState>) -> Result<Json<Value>, ServerError> {
    let game = state.try_game()?;
    let status = game.board().lock().status().to_string();
    Ok(Json(json!({
        "transcript": game.transcript(),
        "fen": game.fen(),
        "status": status,
        "players": game.players(),
        "phase": game.phase(),
    })))
}

/// PUT /players - configure both sides.
async fn players_handler(
    State(state): State<AppState>,
    Json(request): Json<PlayersRequest>,
) -> Result<Json<Players>, ServerError> {
    let white = request.white.to_player()?;
    let black = request.black.to_player()?;
    let mut game = state.try_game()?;
    game.set_players(Players::new(white, black));
    Ok(Json(game.players().clone()))
}

/// POST /chat - one turn for the side to move.
async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ServerError> {
    if request.prompt.trim().is_empty() {
        return Err(ServerError::BadRequest("prompt must not be empty".into()));
    }
    let mut game = state.try_game()?;
    if let Some(fen) = &request.fen {
        game.sync_fen(fen).map_err(|e| ServerError::Game(e.into()))?;
    }
    Ok(stream_run(&state, game, Run::Chat(request.prompt)))
}

/// POST /move - apply a human move, then autoplay.
async fn move_handler(
    State(state): State<AppState>,
    Json(request): Json<MoveRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let human_move = match (request.fen, request.mv) {
        (Some(fen), None) => HumanMove::Fen(fen),
        (None, Some(mv)) => HumanMove::Move(mv),
        _ => {
            return Err(ServerError::BadRequest(
                "exactly one of 'fen' or 'move' is required".into(),
            ))
        }
    };
    let mut game = state.try_game()?;
    game.apply_human_move(human_move)?;
    Ok(stream_run(&state, game, Run::Autoplay))
}

/// POST /reset - new game, then autoplay.
async fn reset_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let game = state.try_game()?;
    Ok(stream_run(&state, game, Run::Reset))
}

/// POST /cancel - request the current run to stop.
///
/// Only a spawned run counts; a short request holding the game does not.
async fn cancel_handler(State(state): State<AppState>) -> Json<Value> {
    let running = state.running.load(Ordering::SeqCst);
    if running {
        state.cancel.store(true, Ordering::SeqCst);
        tracing::info!("Cancel requested");
    }
    Json(json!({ "cancelled": running }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::STARTING_FEN;
    use crate::llms::base_llm::ModelResponse;
    use crate::testing::{tool_call, ScriptedFactory};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state(factory: ScriptedFactory, players: Players) -> AppState {
        AppState::new(Game::new(Arc::new(factory)).with_players(players))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Collect the JSON payloads of an event-stream body.
    async fn sse_updates(response: axum::response::Response) -> Vec<Value> {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(body.to_vec())
            .unwrap()
            .lines()
            .filter_map(|line| line.strip_prefix("data:").map(str::trim_start))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app_router(state(ScriptedFactory::default(), Players::humans()));
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "chesslm");
    }

    #[tokio::test]
    async fn test_game_endpoint() {
        let app = app_router(state(ScriptedFactory::default(), Players::humans()));
        let request = Request::builder().uri("/game").body(Body::empty()).unwrap();

        let json = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(json["fen"], STARTING_FEN);
        assert_eq!(json["status"], "ongoing");
        assert_eq!(json["phase"], "awaiting_input");
        assert_eq!(json["players"]["white"]["controller"], "human");
    }

    #[tokio::test]
    async fn test_reset_streams_updates() {
        let app = app_router(state(ScriptedFactory::default(), Players::humans()));
        let response = app.oneshot(post_json("/reset", json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let updates = sse_updates(response).await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0]["transcript"][0]["content"], "New game started. White to move.");
        assert_eq!(updates[1]["stop"], "human_to_move");
        assert_eq!(updates[1]["moves_played"], 0);
    }

    #[tokio::test]
    async fn test_move_runs_agent_reply() {
        let factory = ScriptedFactory::new(vec![
            Ok(tool_call("make_move", json!({"move": "e7e5"}))),
            Ok(ModelResponse::text("e5")),
        ]);
        let black = PlayerConfig::from_ui("Ollama", "", "").unwrap();
        let players = Players::new(PlayerConfig::Human, black);
        let state = state(factory, players);
        let app = app_router(state.clone());

        let response = app.oneshot(post_json("/move", json!({"move": "e2e4"}))).await.unwrap();
        let updates = sse_updates(response).await;
        let last = updates.last().unwrap();
        assert_eq!(last["stop"], "human_to_move");
        assert_eq!(last["fen"], "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2");
        assert_eq!(state.game.lock().await.transcript().last().unwrap().content, "e5");
    }

    #[tokio::test]
    async fn test_move_rejections() {
        let app = app_router(state(ScriptedFactory::default(), Players::humans()));

        let response = app
            .clone()
            .oneshot(post_json("/move", json!({"move": "e2e5"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().starts_with("Illegal move 'e2e5'"));

        let response = app.oneshot(post_json("/move", json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_with_human_to_move() {
        let app = app_router(state(ScriptedFactory::default(), Players::humans()));
        let response = app
            .oneshot(post_json("/chat", json!({"prompt": "hi", "fen": STARTING_FEN})))
            .await
            .unwrap();
        let updates = sse_updates(response).await;
        assert_eq!(updates.len(), 3);
        assert_eq!(
            updates[2]["transcript"][1]["content"],
            "No AI configured for the side to move."
        );
    }

    #[tokio::test]
    async fn test_players_endpoint() {
        let state = state(ScriptedFactory::default(), Players::humans());
        let app = app_router(state.clone());
        let request = Request::builder()
            .method("PUT")
            .uri("/players")
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({
                    "white": {"provider": "OpenAI", "model": "", "api_key": "sk-test"},
                    "black": {"provider": "Human"}
                })
                .to_string(),
            ))
            .unwrap();

        let json = body_json(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(json["white"]["model"], "gpt-4o");
        assert!(json["white"].get("credential").is_none());
        assert!(state.game.lock().await.players().black.is_human());

        let request = Request::builder()
            .method("PUT")
            .uri("/players")
            .header("Content-Type", "application/json")
            .body(Body::from(
                json!({"white": {"provider": "Cohere"}, "black": {"provider": "Human"}})
                    .to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_busy_game_is_rejected() {
        let state = state(ScriptedFactory::default(), Players::humans());
        let app = app_router(state.clone());
        let _held = state.game.lock().await;
        state.running.store(true, Ordering::SeqCst);

        let response = app.clone().oneshot(post_json("/reset", json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let json = body_json(app.oneshot(post_json("/cancel", json!({}))).await.unwrap()).await;
        assert_eq!(json["cancelled"], true);
        assert!(state.cancel.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_between_runs_does_not_stop_next_run() {
        let factory = ScriptedFactory::new(vec![
            Ok(tool_call("make_move", json!({"move": "e2e4"}))),
            Ok(ModelResponse::text("e4")),
        ]);
        let white = PlayerConfig::from_ui("Ollama", "", "").unwrap();
        let state = state(factory, Players::new(white, PlayerConfig::Human));
        let app = app_router(state.clone());

        // A short request such as GET /game holds the lock, but no run is active.
        let held = state.game.lock().await;
        let response = app.clone().oneshot(post_json("/cancel", json!({}))).await.unwrap();
        assert_eq!(body_json(response).await["cancelled"], false);
        assert!(!state.cancel.load(Ordering::SeqCst));
        drop(held);

        // A cancel that lands after a run has finished leaves the flag set.
        state.cancel.store(true, Ordering::SeqCst);

        let response = app.oneshot(post_json("/reset", json!({}))).await.unwrap();
        let updates = sse_updates(response).await;
        let last = updates.last().unwrap();
        assert_eq!(last["stop"], "human_to_move");
        assert_eq!(last["moves_played"], 1);
        assert_eq!(state.game.lock().await.board().side_to_move(), crate::board::Side::Black);
    }
}
