use axum::{
    Router,
    extract::Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::info;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{SimulationConfig, SimulationEngine, run_monte_carlo};

fn default_runs() -> u32 {
    1_000
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonteCarloPayload {
    config: SimulationConfig,
    #[serde(default = "default_runs")]
    runs: u32,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/healthz", get(health_handler))
        .route("/api/simulate", post(simulate_handler))
        .route("/api/montecarlo", post(monte_carlo_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!("drawdown HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

// A full deterministic or seeded run: the monthly ledger comes back in the
// response, so callers can chart every period.
async fn simulate_handler(Json(config): Json<SimulationConfig>) -> Response {
    match SimulationEngine::with_default_calculators(config) {
        Ok(engine) => json_response(StatusCode::OK, engine.run()),
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()),
    }
}

async fn monte_carlo_handler(Json(payload): Json<MonteCarloPayload>) -> Response {
    match run_monte_carlo(&payload.config, payload.runs) {
        Ok(summary) => json_response(StatusCode::OK, summary),
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
