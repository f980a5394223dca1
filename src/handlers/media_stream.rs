//! Telephony media stream WebSocket handler
//!
//! One connection per call. The socket's writer half runs on its own task fed
//! by an mpsc channel; the connection task owns the [`TelephonyStream`] and
//! multiplexes inbound telephony frames with the AI leg's events.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, error, info, warn};

use crate::core::telephony::{StreamControl, TelephonyRoute, TelephonyStream};
use crate::state::AppState;

/// Outbound frames buffered per connection
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Time allowed for the writer to flush a final close frame
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default, Deserialize)]
pub struct MediaStreamQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Upgrade `/media-stream` to a WebSocket.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MediaStreamQuery>,
) -> Response {
    info!(session_id = ?query.session_id, "Media stream upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_media_stream(socket, state, query.session_id))
}

async fn handle_media_stream(
    socket: WebSocket,
    app_state: Arc<AppState>,
    url_session_id: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (route_tx, mut route_rx) = mpsc::channel::<TelephonyRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = route_rx.recv().await {
            let result = match route {
                TelephonyRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!(error = %e, "Failed to serialize telephony message");
                        continue;
                    }
                },
                TelephonyRoute::Close => {
                    debug!("Closing media stream connection");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                warn!(error = %e, "Failed to write to media stream");
                break;
            }
        }
    });

    let mut stream = TelephonyStream::new(
        app_state.bridge_context(),
        url_session_id,
        route_tx.clone(),
    );

    loop {
        select! {
            // Frames queued while the AI leg was opening must be handled
            // before its Ready signal, or they would be forwarded late
            biased;

            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        if stream.on_text(text.as_str()).await == StreamControl::Close {
                            let _ = route_tx.send(TelephonyRoute::Close).await;
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!(len = data.len(), "Ignoring binary frame on media stream");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = ?stream.session_id(), "Media stream closed by provider");
                        break;
                    }
                    // Pings are answered by axum
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(session_id = ?stream.session_id(), error = %e, "Media stream error");
                        break;
                    }
                }
            }
            event = stream.next_realtime_event() => {
                stream.on_realtime_event(event).await;
            }
        }
    }

    stream.on_close().await;

    info!(
        session_id = ?stream.session_id(),
        stream_sid = ?stream.stream_sid(),
        "Media stream finished"
    );

    // Dropping every sender lets the writer drain and exit
    drop(stream);
    drop(route_tx);
    if timeout(WRITER_DRAIN_TIMEOUT, &mut sender_task).await.is_err() {
        sender_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use crate::config::ServerConfig;
    use crate::core::session::SessionAttributes;
    use crate::routes::media_stream::create_media_stream_router;
    use crate::test_support::FakeConnector;

    fn media_frame(payload: &str) -> WsMessage {
        WsMessage::Text(
            json!({"event": "media", "streamSid": "MZ1", "media": {"payload": payload}})
                .to_string()
                .into(),
        )
    }

    #[tokio::test]
    async fn test_media_queued_while_leg_opens_is_not_forwarded() {
        let (connector, monitor) = FakeConnector::slow(Duration::from_millis(300));
        let mut config = ServerConfig::default();
        config.openai_api_key = Some("sk-test".to_string());
        let state = AppState::with_components(config, Arc::new(connector), None);
        let session_id = state.sessions.create(SessionAttributes::default());

        let app = create_media_stream_router().with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (mut phone, _) = connect_async(format!("ws://{addr}/media-stream"))
            .await
            .unwrap();
        let start = json!({
            "event": "start",
            "streamSid": "MZ1",
            "start": {"streamSid": "MZ1", "callSid": "CA1", "customParameters": {"sessionId": session_id}}
        });
        phone
            .send(WsMessage::Text(start.to_string().into()))
            .await
            .unwrap();
        // The leg is already ready and has queued its Ready signal, but the
        // bridge has not seen it while these frames pile up
        for _ in 0..20 {
            phone.send(media_frame("AAEC")).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        phone.send(media_frame("AwQF")).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while monitor.sent_audio().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "no audio forwarded");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(monitor.sent_audio(), vec![Bytes::from_static(&[3, 4, 5])]);
        let _ = phone.close(None).await;
    }
}
