//! Web chat interface and JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page |
//! | `POST` | `/api/ask` | Answer a question with optional prior turns |
//! | `GET`  | `/api/stats` | Vector store statistics |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `POST /api/ask` takes
//! `{"question": "...", "history": [{"question": "...", "answer": "..."}]}`
//! and returns `{"answer": "...", "sources": [{"path", "chunk_index", "score"}], "retrieved": n}`.
//! The server is stateless: the page sends its own history with each request,
//! and the pipeline keeps only the most recent turns of it. Requests carrying
//! more than [`MAX_REQUEST_TURNS`] turns are rejected.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `store_error` (500), `upstream_error` (502).

use std::net::SocketAddr;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::models::Answer;
use crate::rag::{RagPipeline, Turn};
use crate::store::{StoreError, StoreStats};

const CHAT_PAGE: &str = include_str!("assets/chat.html");

/// Upper bound on `history` entries accepted by `/api/ask`.
pub const MAX_REQUEST_TURNS: usize = 100;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<RagPipeline>,
}

/// Routes for the chat UI and API, without binding a socket.
pub fn router(pipeline: Arc<RagPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/api/ask", post(handle_ask))
        .route("/api/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { pipeline })
}

/// Binds `host:port`, moving on to the next port while the current one is
/// taken, for at most `attempts` ports.
pub async fn bind_with_fallback(host: &str, port: u16, attempts: u16) -> Result<TcpListener> {
    let attempts = attempts.max(1);
    let mut last_err = None;
    for offset in 0..attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                if offset > 0 {
                    warn!(requested = port, bound = candidate, "port in use, using fallback");
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                last_err = Some(e);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to bind {}:{}", host, candidate));
            }
        }
    }
    match last_err {
        Some(e) => Err(e).with_context(|| {
            format!(
                "no free port in {}..{} on {}",
                port,
                port.saturating_add(attempts),
                host
            )
        }),
        None => bail!("invalid port range starting at {}", port),
    }
}

/// `kw --mode web`: serve until Ctrl-C.
pub async fn run_server(
    config: &ServerConfig,
    pipeline: Arc<RagPipeline>,
    open_browser: bool,
) -> Result<()> {
    let host = config.bind_host();
    let listener = bind_with_fallback(host, config.port, config.port_attempts).await?;
    let addr = listener.local_addr()?;
    let url = browse_url(addr, config.share);

    info!(%addr, share = config.share, "web interface listening");
    println!("Knowledge Worker listening on {}", url);

    if open_browser {
        open_in_browser(&url);
    }

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("web interface stopped");
    Ok(())
}

fn browse_url(addr: SocketAddr, share: bool) -> String {
    if share || addr.ip().is_unspecified() {
        format!("http://localhost:{}", addr.port())
    } else {
        format!("http://{}", addr)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
}

fn open_in_browser(url: &str) {
    let cmd = if cfg!(target_os = "macos") {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        cmd
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", "", url]);
        cmd
    } else {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        cmd
    };
    if let Err(e) = spawn_reaped(cmd) {
        warn!(error = %e, "could not open browser");
    }
}

/// Spawns `cmd` without stdio and waits for it on a background task, so the
/// exited process does not linger as a zombie.
fn spawn_reaped(mut cmd: Command) -> std::io::Result<JoinHandle<std::io::Result<ExitStatus>>> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(tokio::spawn(async move {
        let status = child.wait().await;
        if let Ok(status) = &status {
            if !status.success() {
                warn!(%status, "browser launcher exited with an error");
            }
        }
        status
    }))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn store_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "store_error".to_string(),
        message: message.into(),
    }
}

fn upstream_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream_error".to_string(),
        message: message.into(),
    }
}

/// Store consistency problems are ours; everything else failed upstream.
fn classify(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    if err.downcast_ref::<StoreError>().is_some() || err.downcast_ref::<sqlx::Error>().is_some() {
        store_error(message)
    } else {
        upstream_error(message)
    }
}

// ============ Handlers ============

async fn handle_index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    history: Vec<Turn>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<Answer>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    if req.history.len() > MAX_REQUEST_TURNS {
        return Err(bad_request(format!(
            "history has {} turns; at most {} are accepted",
            req.history.len(),
            MAX_REQUEST_TURNS
        )));
    }
    match state.pipeline.answer(&req.question, &req.history).await {
        Ok(answer) => Ok(Json(answer)),
        Err(e) => {
            error!(error = %format!("{:#}", e), "failed to answer question");
            Err(classify(e))
        }
    }
}

async fn handle_stats(State(state): State<AppState>) -> Result<Json<StoreStats>, AppError> {
    state
        .pipeline
        .store()
        .stats()
        .await
        .map(Json)
        .map_err(|e| store_error(format!("{:#}", e)))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
