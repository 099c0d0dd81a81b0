use crate::state;
use crate::types::worker::{ClientInfo, Notification, NotificationId};
use crate::worker::{EventOutcome, WorkerEvent, open_notification};

use super::push::{ApiError, api_error, worker_error};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;

pub(crate) async fn notification_list(
    State(state): State<state::AppState>,
) -> Json<Vec<Notification>> {
    Json(state.tray.pending_now())
}

pub(crate) async fn client_list(State(state): State<state::AppState>) -> Json<Vec<ClientInfo>> {
    Json(state.clients.list())
}

#[derive(Serialize)]
pub(crate) struct ClickResponse {
    pub(crate) client: ClientInfo,
    pub(crate) cleared: usize,
}

pub(crate) async fn notification_click(
    State(state): State<state::AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ClickResponse>, ApiError> {
    let notification = state
        .tray
        .find(NotificationId(id))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No such notification."))?;

    let Some(worker) = &state.worker else {
        let (client, cleared) = open_notification(&state.tray, &state.clients, notification)
            .await
            .map_err(worker_error)?;
        return Ok(Json(ClickResponse { client, cleared }));
    };
    match worker
        .dispatch(WorkerEvent::NotificationClick(notification))
        .await
        .map_err(worker_error)?
    {
        EventOutcome::Routed { client, cleared } => Ok(Json(ClickResponse { client, cleared })),
        other => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unexpected worker outcome: {other:?}"),
        )),
    }
}
