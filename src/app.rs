use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tracing::info;

use crate::state;

mod notifications;
mod push;

pub fn router(state: state::AppState) -> Router {
    Router::new()
        .route("/push/{token}", post(push::receive_push))
        .route("/notifications", get(notifications::notification_list))
        .route(
            "/notifications/{id}/click",
            post(notifications::notification_click),
        )
        .route("/clients", get(notifications::client_list))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: state::AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "worker host listening");
    axum::serve(listener, router(state)).await
}

pub(crate) async fn health() -> &'static str {
    "ok"
}
