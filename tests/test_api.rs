//! Integration tests for the HTTP API endpoints.
//!
//! Uses axum's oneshot pattern (via tower::ServiceExt), so no TCP binding is
//! needed. The setup trains a two-piece table inline.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use ur_lut::server::create_router;
use ur_lut::{GameConfig, Lut, LutTrainer, TrainSettings, ValueType};

fn setup_lut() -> Arc<Lut> {
    let trainer = LutTrainer::new(GameConfig::finkel().with_starting_pieces(2)).unwrap();
    let mut lut = trainer.populate_new_lut(ValueType::F32, false).unwrap();
    let settings = TrainSettings {
        precision: 0.001,
        ..TrainSettings::default()
    };
    assert!(trainer.train(&mut lut, &settings).unwrap().is_converged());
    lut.set_author("api-tests");
    Arc::new(trainer.finish(&lut, ValueType::Percent16))
}

/// Parse response body as JSON.
async fn body_json(body: Body) -> serde_json::Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// Shared table (trained once per test binary). Each test gets its own Router.
static LUT: std::sync::OnceLock<Arc<Lut>> = std::sync::OnceLock::new();

fn get_lut() -> Arc<Lut> {
    LUT.get_or_init(setup_lut).clone()
}

fn app() -> axum::Router {
    create_router(get_lut())
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn initial_state() -> serde_json::Value {
    serde_json::json!({
        "light_pieces": [],
        "dark_pieces": [],
        "light_score": 0,
        "dark_score": 0,
        "light_to_move": true
    })
}

// ── GET /health ──────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_200() {
    let resp = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp.into_body()).await;
    assert_eq!(json["status"], "OK");
}

// ── GET /metadata ────────────────────────────────────────────────────

#[tokio::test]
async fn metadata_describes_table() {
    let resp = app()
        .oneshot(Request::get("/metadata").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp.into_body()).await;
    assert_eq!(json["value_type"], "percent16");
    assert_eq!(json["config"]["starting_pieces"], 2);
    assert_eq!(json["entry_count"].as_u64(), Some(get_lut().entry_count()));
    assert_eq!(json["annotations"]["author"], "api-tests");
    assert!(json["annotations"]["training.sweeps"].is_string());
}

// ── POST /win_percent ────────────────────────────────────────────────

#[tokio::test]
async fn win_percent_initial_state() {
    let resp = app().oneshot(post_json("/win_percent", initial_state())).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp.into_body()).await;
    let light = json["light_win_percent"].as_f64().unwrap();
    let dark = json["dark_win_percent"].as_f64().unwrap();
    assert!(light > 40.0 && light < 65.0, "light={light}");
    assert!((light + dark - 100.0).abs() < 1e-9);
    assert_eq!(json["finished"], false);
}

#[tokio::test]
async fn win_percent_finished_state() {
    let body = serde_json::json!({
        "light_pieces": [7],
        "dark_pieces": [],
        "light_score": 1,
        "dark_score": 2,
        "light_to_move": true
    });
    let resp = app().oneshot(post_json("/win_percent", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp.into_body()).await;
    assert_eq!(json["light_win_percent"].as_f64(), Some(0.0));
    assert_eq!(json["finished"], true);
}

#[tokio::test]
async fn win_percent_too_many_pieces() {
    let body = serde_json::json!({
        "light_pieces": [1, 2, 3],
        "dark_pieces": [],
        "light_score": 0,
        "dark_score": 0,
        "light_to_move": true
    });
    let resp = app().oneshot(post_json("/win_percent", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("snapshot"));
}

#[tokio::test]
async fn win_percent_off_board_piece() {
    let body = serde_json::json!({
        "light_pieces": [40],
        "dark_pieces": [],
        "light_score": 0,
        "dark_score": 0,
        "light_to_move": true
    });
    let resp = app().oneshot(post_json("/win_percent", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn win_percent_mirror_complements() {
    let light_first = initial_state();
    let mut dark_first = initial_state();
    dark_first["light_to_move"] = serde_json::json!(false);

    let a = body_json(
        app()
            .oneshot(post_json("/win_percent", light_first))
            .await
            .unwrap()
            .into_body(),
    )
    .await;
    let b = body_json(
        app()
            .oneshot(post_json("/win_percent", dark_first))
            .await
            .unwrap()
            .into_body(),
    )
    .await;
    let a = a["light_win_percent"].as_f64().unwrap();
    let b = b["light_win_percent"].as_f64().unwrap();
    assert!((a + b - 100.0).abs() < 1e-9, "a={a} b={b}");
}

// ── POST /move_values ────────────────────────────────────────────────

#[tokio::test]
async fn move_values_introduce_piece() {
    let body = serde_json::json!({ "state": initial_state(), "roll": 2 });
    let resp = app().oneshot(post_json("/move_values", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp.into_body()).await;
    assert_eq!(json["passed"], false);
    let moves = json["moves"].as_array().unwrap();
    assert_eq!(moves.len(), 1);
    assert_eq!(moves[0]["source"], 0);
    assert_eq!(json["best_move"], 0);
    let light = moves[0]["light_win_percent"].as_f64().unwrap();
    assert_eq!(moves[0]["mover_win_percent"].as_f64(), Some(light));
}

#[tokio::test]
async fn move_values_best_move_is_argmax() {
    let state = serde_json::json!({
        "light_pieces": [1],
        "dark_pieces": [],
        "light_score": 0,
        "dark_score": 0,
        "light_to_move": true
    });
    let body = serde_json::json!({ "state": state, "roll": 2 });
    let resp = app().oneshot(post_json("/move_values", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp.into_body()).await;
    let moves = json["moves"].as_array().unwrap();
    assert_eq!(moves.len(), 2);
    let best = moves
        .iter()
        .max_by(|a, b| {
            let (a, b) = (a["mover_win_percent"].as_f64(), b["mover_win_percent"].as_f64());
            a.partial_cmp(&b).unwrap()
        })
        .unwrap();
    assert_eq!(json["best_move"], best["source"]);
}

#[tokio::test]
async fn move_values_roll_zero_passes() {
    let body = serde_json::json!({ "state": initial_state(), "roll": 0 });
    let resp = app().oneshot(post_json("/move_values", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp.into_body()).await;
    assert_eq!(json["passed"], true);
    assert!(json["moves"].as_array().unwrap().is_empty());
    assert!(json["best_move"].is_null());
}

#[tokio::test]
async fn move_values_illegal_roll() {
    let body = serde_json::json!({ "state": initial_state(), "roll": 7 });
    let resp = app().oneshot(post_json("/move_values", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("roll"));
}

#[tokio::test]
async fn move_values_finished_game() {
    let state = serde_json::json!({
        "light_pieces": [],
        "dark_pieces": [],
        "light_score": 2,
        "dark_score": 0,
        "light_to_move": true
    });
    let body = serde_json::json!({ "state": state, "roll": 1 });
    let resp = app().oneshot(post_json("/move_values", body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
