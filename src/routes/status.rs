use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::AppState;

/// Streams pipeline status messages to a WebSocket client.
pub async fn status_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let updates = state.notifier.subscribe();
    ws.on_upgrade(move |socket| forward_status(socket, updates))
}

async fn forward_status(mut socket: WebSocket, mut updates: broadcast::Receiver<String>) {
    tracing::debug!("status client connected");
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "status client fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!("status client disconnected");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::routes::create_router;
    use crate::routes::testing::{FixedExecutor, state};

    #[tokio::test]
    async fn test_plain_get_is_not_upgraded() {
        let response = create_router(state(Arc::new(FixedExecutor("doc-1"))))
            .oneshot(Request::get("/ws/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
