//! Local HTTP interface serving the current snapshot.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use log::{debug, warn};

use crate::aggregator::SnapshotHandle;

pub fn router(snapshot: SnapshotHandle) -> Router {
    Router::new()
        .route("/", get(current_status).head(not_found).fallback(not_found))
        .fallback(not_found)
        .with_state(snapshot)
}

/// Serve until the listener fails.
pub async fn serve(
    listener: tokio::net::TcpListener,
    snapshot: SnapshotHandle,
) -> std::io::Result<()> {
    axum::serve(listener, router(snapshot)).await
}

async fn current_status(State(snapshot): State<SnapshotHandle>) -> Response {
    debug!("Web request received: GET /");
    let body = match snapshot.current() {
        None => "{}".to_string(),
        Some(snapshot) => match snapshot.to_json_payload() {
            Ok(json) => json.as_str().to_string(),
            Err(e) => {
                warn!("status not served: {e}");
                "{}".to_string()
            }
        },
    };
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/html")],
        "Not Found\r\n",
    )
        .into_response()
}
