use crate::state;
use crate::types::worker::Notification;
use crate::worker::{EventOutcome, WorkerError, WorkerEvent, display_push};

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_ENCODING;
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub(crate) fn worker_error(err: WorkerError) -> ApiError {
    let status = match err {
        WorkerError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        WorkerError::InvalidState { .. } | WorkerError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        WorkerError::Display(_) | WorkerError::Routing(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

/// Plaintext of a push body according to its `Content-Encoding`.
fn open_body(
    state: &state::AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Vec<u8>, ApiError> {
    let encoding = headers
        .get(CONTENT_ENCODING)
        .map(|value| value.to_str().unwrap_or_default().trim());
    match encoding {
        None => Ok(body.to_vec()),
        Some(encoding) if encoding.eq_ignore_ascii_case("identity") => Ok(body.to_vec()),
        Some(encoding) if encoding.eq_ignore_ascii_case("aes128gcm") => {
            state.profile.decrypt_push(body).map_err(|err| {
                warn!(error = %err, "could not decrypt push message");
                api_error(StatusCode::BAD_REQUEST, "Could not decrypt push message.")
            })
        }
        Some(_) => Err(api_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Unsupported push content encoding.",
        )),
    }
}

pub(crate) async fn receive_push(
    State(state): State<state::AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Notification>), ApiError> {
    if !state.profile.accepts_token(&token) {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            "No such push subscription.",
        ));
    }
    let message = open_body(&state, &headers, &body)?;
    debug!(bytes = message.len(), "push received");

    let Some(worker) = &state.worker else {
        let notification = display_push(&state.tray, &message)
            .await
            .map_err(worker_error)?;
        return Ok((StatusCode::CREATED, Json(notification)));
    };
    match worker
        .dispatch(WorkerEvent::Push(message))
        .await
        .map_err(worker_error)?
    {
        EventOutcome::Shown(notification) => Ok((StatusCode::CREATED, Json(notification))),
        other => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unexpected worker outcome: {other:?}"),
        )),
    }
}
