use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use crewgrid_sync::{ChangeEvent, ChangeFeed};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

use crate::AppState;

/// One frame sent to feed clients
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedFrame {
    Change { event: ChangeEvent },
    /// The client missed events and should refetch what it shows
    Lagged { skipped: u64 },
}

/// WebSocket handler for the change feed
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut changes = state.feed.subscribe();

    // Forward changes to this client
    let mut send_task = tokio::spawn(async move {
        loop {
            let frame = match changes.recv().await {
                Ok(event) => FeedFrame::Change { event },
                Err(RecvError::Lagged(skipped)) => FeedFrame::Lagged { skipped },
                Err(RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode feed frame: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // The feed is one-way; only watch for the client going away
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::debug!("Feed connection closed");
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws/feed", get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crewgrid_sync::ChangeOperation;

    #[test]
    fn test_frame_format() {
        let frame = FeedFrame::Change {
            event: ChangeEvent {
                table: "profiles".to_string(),
                operation: ChangeOperation::Update,
                record: None,
                old_record: None,
                commit_timestamp: Utc::now(),
            },
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "change");
        assert_eq!(value["event"]["operation"], "UPDATE");

        let lagged = serde_json::to_value(FeedFrame::Lagged { skipped: 4 }).unwrap();
        assert_eq!(lagged, serde_json::json!({"type": "lagged", "skipped": 4}));
    }
}
