//! HTTP handlers
//!
//! The request body is parsed by hand instead of through axum's `Json`
//! extractor so every malformed body, including one that fails to buffer,
//! maps to the same 400 response regardless of Content-Type.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    Json,
};

use crate::executor::CommandExecutor;
use crate::types::{CommandRequest, CommandResponse};

/// Body returned for any request that fails validation
pub const INVALID_REQUEST: &str = "Invalid request";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<dyn CommandExecutor>,
}

/// Parse a request body, rejecting missing or empty commands
pub fn parse_request(body: &[u8]) -> Option<CommandRequest> {
    let req: CommandRequest = serde_json::from_slice(body).ok()?;
    if req.command.is_empty() {
        return None;
    }
    Some(req)
}

fn invalid_request() -> (StatusCode, Json<CommandResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(CommandResponse::error(INVALID_REQUEST)),
    )
}

/// `POST /execute-aws-command`
///
/// The command runs on its own task, so a client that hangs up does not
/// cancel it.
pub async fn execute_aws_command(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> (StatusCode, Json<CommandResponse>) {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!("failed to read request body: {}", rejection);
            return invalid_request();
        }
    };
    let Some(req) = parse_request(&body) else {
        tracing::debug!("rejecting invalid request body");
        return invalid_request();
    };

    let executor = Arc::clone(&state.executor);
    let execution = tokio::spawn(async move { executor.execute(&req.command).await });

    match execution.await {
        Ok(Ok(output)) => (StatusCode::OK, Json(CommandResponse::output(output))),
        Ok(Err(e)) => {
            tracing::error!("Command execution failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CommandResponse::error(e.to_string())),
            )
        }
        Err(e) => {
            tracing::error!("Command task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CommandResponse::error(format!("command task failed: {}", e))),
            )
        }
    }
}
