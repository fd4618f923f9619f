//! Live update channel transport.
//!
//! A connector opens the channel and hands back a stream of text frames.
//! The stream ends, or yields an error, when the channel goes away.

use futures::stream::BoxStream;
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};

/// Frames received on an open channel.
pub type FrameStream = BoxStream<'static, Result<String, TransportError>>;

/// The channel failed to open or was lost.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("channel closed by producer: {0}")]
    Closed(String),

    #[error("failed to open channel: {0}")]
    Open(String),
}

/// Opens the live update channel.
pub trait ChannelConnector: Send + Sync + 'static {
    /// Open a new channel.
    fn connect(&self) -> impl Future<Output = Result<FrameStream, TransportError>> + Send;

    /// Where this connector points, for logs.
    fn endpoint(&self) -> &str;
}

/// WebSocket connector for `ws://` channels.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl ChannelConnector for WebSocketConnector {
    fn connect(&self) -> impl Future<Output = Result<FrameStream, TransportError>> + Send {
        let url = self.url.clone();
        async move {
            let (ws, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
            debug!(url = %url, status = %response.status(), "websocket handshake complete");

            // The core never writes; only the read half is consumed.
            let frames = ws.filter_map(|message| async move { frame_from_message(message) });
            Ok(frames.boxed())
        }
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Map a websocket message to a text frame, dropping control frames.
fn frame_from_message(
    message: Result<Message, tungstenite::Error>,
) -> Option<Result<String, TransportError>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
            Ok(text) => Some(Ok(text)),
            Err(e) => {
                warn!(error = %e, "dropping binary frame that is not UTF-8");
                None
            }
        },
        Ok(Message::Close(frame)) => {
            let reason = frame
                .map(|f| format!("{} {}", u16::from(f.code), f.reason))
                .unwrap_or_else(|| "no close frame".to_string());
            Some(Err(TransportError::Closed(reason)))
        }
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
        Err(e) => Some(Err(TransportError::WebSocket(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[test]
    fn test_text_and_binary_become_frames() {
        let text = frame_from_message(Ok(Message::Text("{}".to_string())));
        assert_eq!(text.unwrap().unwrap(), "{}");

        let binary = frame_from_message(Ok(Message::Binary(b"[1]".to_vec())));
        assert_eq!(binary.unwrap().unwrap(), "[1]");
    }

    #[test]
    fn test_invalid_utf8_binary_is_dropped() {
        let frame = frame_from_message(Ok(Message::Binary(vec![b'{', 0xff, 0xfe, b'}'])));
        assert!(frame.is_none());
    }

    #[test]
    fn test_control_frames_are_dropped() {
        assert!(frame_from_message(Ok(Message::Ping(vec![1]))).is_none());
        assert!(frame_from_message(Ok(Message::Pong(vec![]))).is_none());
    }

    #[test]
    fn test_close_ends_session() {
        let frame = CloseFrame {
            code: CloseCode::Away,
            reason: "restarting".into(),
        };
        let result = frame_from_message(Ok(Message::Close(Some(frame)))).unwrap();
        match result {
            Err(TransportError::Closed(reason)) => assert_eq!(reason, "1001 restarting"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let connector = WebSocketConnector::new("ws://127.0.0.1:1");
        assert_eq!(connector.endpoint(), "ws://127.0.0.1:1");
        assert!(connector.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_receives_frames_from_server() {
        use futures::SinkExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"type":"INITIAL_DATA","data":[]}"#.to_string()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let connector = WebSocketConnector::new(format!("ws://{}", addr));
        let mut frames = connector.connect().await.unwrap();

        let first = frames.next().await.unwrap().unwrap();
        assert!(first.contains("INITIAL_DATA"));
        assert!(matches!(frames.next().await, Some(Err(TransportError::Closed(_))) | None));
    }
}
