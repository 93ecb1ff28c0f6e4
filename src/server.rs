//! Axum HTTP server: stateless lookups against a solved table.
//!
//! The table is shared as `Arc<Lut>` across async handlers. Every request
//! builds its own scratch [`FastGame`]s, so handlers never contend.
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | GET | `/metadata` | Configuration, value type, entry count, annotations |
//! | POST | `/win_percent` | Light's win percentage for a [`GameSnapshot`] |
//! | POST | `/move_values` | Win percentage after each legal move for a roll |

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};

use crate::error::Error;
use crate::fast_game::{FastGame, GameSnapshot};
use crate::lut::Lut;

pub type AppState = Arc<Lut>;

type ApiResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

pub fn create_router(lut: Arc<Lut>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health_check))
        .route("/metadata", get(handle_get_metadata))
        .route("/win_percent", post(handle_win_percent))
        .route("/move_values", post(handle_move_values))
        .layer(cors)
        .with_state(lut)
}

// ── Request/Response types ──────────────────────────────────────────

#[derive(Deserialize)]
struct MoveValuesRequest {
    state: GameSnapshot,
    roll: u8,
}

fn error_response(status: StatusCode, msg: &str) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(serde_json::json!({ "error": msg })))
}

fn map_error(err: Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match err {
        Error::InvalidSnapshot { .. }
        | Error::IllegalRoll { .. }
        | Error::IllegalMove { .. }
        | Error::GameFinished => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        log::error!("Lookup failed: {err}");
    }
    error_response(status, &err.to_string())
}

fn load_snapshot(lut: &Lut, snapshot: &GameSnapshot) -> Result<FastGame, Error> {
    let mut game = lut.new_game();
    game.copy_from_snapshot(snapshot)?;
    Ok(game)
}

// ── GET handlers ────────────────────────────────────────────────────

async fn handle_health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

async fn handle_get_metadata(State(lut): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(lut.metadata()))
}

// ── POST handlers ───────────────────────────────────────────────────

async fn handle_win_percent(State(lut): State<AppState>, Json(snapshot): Json<GameSnapshot>) -> ApiResult {
    let game = load_snapshot(&lut, &snapshot).map_err(map_error)?;
    let mut scratch = lut.new_game();
    let percent = lut.get_light_win_percent(&game, &mut scratch).map_err(map_error)?;
    Ok(Json(serde_json::json!({
        "light_win_percent": percent,
        "dark_win_percent": 100.0 - percent,
        "finished": game.is_finished(),
    })))
}

async fn handle_move_values(State(lut): State<AppState>, Json(req): Json<MoveValuesRequest>) -> ApiResult {
    let mut game = load_snapshot(&lut, &req.state).map_err(map_error)?;
    let light_to_move = game.is_light_turn();
    let moves = game.apply_roll(req.roll).map_err(map_error)?.to_vec();

    let mut after = lut.new_game();
    let mut scratch = lut.new_game();
    let mut values = Vec::with_capacity(moves.len());
    for &source in &moves {
        after.copy_from(&game);
        after.apply_move(source).map_err(map_error)?;
        let light = lut.get_light_win_percent(&after, &mut scratch).map_err(map_error)?;
        let mover = if light_to_move { light } else { 100.0 - light };
        values.push(serde_json::json!({
            "source": source,
            "light_win_percent": light,
            "mover_win_percent": mover,
        }));
    }
    let best = values
        .iter()
        .max_by(|a, b| {
            let (a, b) = (a["mover_win_percent"].as_f64(), b["mover_win_percent"].as_f64());
            a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|v| v["source"].clone());

    Ok(Json(serde_json::json!({
        "roll": req.roll,
        "passed": moves.is_empty(),
        "moves": values,
        "best_move": best,
    })))
}
