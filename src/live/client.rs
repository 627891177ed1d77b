use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use super::messages::{ClientMessage, ServerMessage, SetupMessage};
use super::transport::{ConnectionTasks, LiveChannel, LiveTransport, TransportEvent};
use crate::error::{BridgeError, BridgeResult};

/// Bidirectional streaming endpoint of the Gemini Live API
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Inbound events buffered before the reader waits on the session
const EVENT_QUEUE: usize = 64;

/// WebSocket transport to the Gemini Live API
pub struct GeminiLiveTransport {
    endpoint: String,
    outbound_queue: usize,
}

impl GeminiLiveTransport {
    pub fn new(endpoint: impl Into<String>, outbound_queue: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            outbound_queue: outbound_queue.max(1),
        }
    }

    fn url(&self, api_key: &str) -> BridgeResult<Url> {
        Url::parse_with_params(&self.endpoint, &[("key", api_key)])
            .map_err(|e| BridgeError::Config(format!("Invalid live endpoint {}: {}", self.endpoint, e)))
    }
}

impl Default for GeminiLiveTransport {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, 16)
    }
}

/// What a single WebSocket frame means to the session
enum Incoming {
    Message(ServerMessage),
    Malformed(String),
    Closed(Option<String>),
    Control,
}

fn classify(frame: Message) -> Incoming {
    let parse = |bytes: &[u8]| match serde_json::from_slice::<ServerMessage>(bytes) {
        Ok(msg) => Incoming::Message(msg),
        Err(e) => Incoming::Malformed(e.to_string()),
    };

    match frame {
        Message::Text(text) => parse(text.as_bytes()),
        Message::Binary(bytes) => parse(&bytes),
        Message::Close(close) => Incoming::Closed(
            close.map(|c| format!("{} {}", u16::from(c.code), c.reason)),
        ),
        _ => Incoming::Control,
    }
}

#[async_trait::async_trait]
impl LiveTransport for GeminiLiveTransport {
    async fn open(&self, api_key: &str, setup: SetupMessage) -> BridgeResult<LiveChannel> {
        let url = self.url(api_key)?;
        info!("Connecting to live service at {} (model {})", self.endpoint, setup.model);

        let (socket, _response) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let setup_json = serde_json::to_string(&ClientMessage::Setup(setup))
            .map_err(|e| BridgeError::Transport(format!("Failed to encode setup: {}", e)))?;
        sink.send(Message::Text(setup_json)).await?;

        // Nothing else is sent until the service acknowledges setup
        loop {
            let frame = match stream.next().await {
                Some(frame) => frame?,
                None => {
                    return Err(BridgeError::Transport(
                        "Connection closed before setup completed".to_string(),
                    ))
                }
            };

            match classify(frame) {
                Incoming::Message(msg) if msg.is_setup_complete() => break,
                Incoming::Message(_) => debug!("Ignoring message received before setup completed"),
                Incoming::Malformed(e) => warn!("Malformed message during setup: {}", e),
                Incoming::Closed(reason) => {
                    return Err(BridgeError::Transport(format!(
                        "Service closed the connection during setup ({})",
                        reason.unwrap_or_else(|| "no reason".to_string())
                    )))
                }
                Incoming::Control => {}
            }
        }

        info!("Live session setup complete");

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(self.outbound_queue);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let writer_events = event_tx.clone();
        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let text = match serde_json::to_string(&msg) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode outbound message: {}", e);
                        continue;
                    }
                };

                if let Err(e) = sink.send(Message::Text(text)).await {
                    let _ = writer_events.send(TransportEvent::Error(e.to_string())).await;
                    return;
                }
            }

            // All senders dropped: the session is closing
            debug!("Outbound queue closed, sending close frame");
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let event = match frame {
                    Ok(frame) => match classify(frame) {
                        Incoming::Message(msg) => TransportEvent::Message(msg),
                        Incoming::Malformed(e) => TransportEvent::Undecodable(e),
                        Incoming::Closed(reason) => {
                            let _ = event_tx.send(TransportEvent::Closed { reason }).await;
                            return;
                        }
                        Incoming::Control => continue,
                    },
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                        return;
                    }
                };

                if event_tx.send(event).await.is_err() {
                    return;
                }
            }

            let _ = event_tx.send(TransportEvent::Closed { reason: None }).await;
        });

        Ok(LiveChannel {
            outbound: outbound_tx,
            events: event_rx,
            tasks: ConnectionTasks::new(vec![writer, reader]),
        })
    }

    fn name(&self) -> &str {
        "Gemini Live WebSocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_carries_key_parameter() {
        let transport = GeminiLiveTransport::default();
        let url = transport.url("abc123").unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.query(), Some("key=abc123"));
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let transport = GeminiLiveTransport::new("not a url", 4);
        assert!(matches!(transport.url("k"), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_classify_text_and_binary_frames() {
        let text = Message::Text(r#"{"setupComplete":{}}"#.to_string());
        assert!(matches!(classify(text), Incoming::Message(m) if m.is_setup_complete()));

        let binary = Message::Binary(br#"{"serverContent":{"turnComplete":true}}"#.to_vec());
        assert!(matches!(classify(binary), Incoming::Message(_)));

        let garbage = Message::Text("{not json".to_string());
        assert!(matches!(classify(garbage), Incoming::Malformed(_)));

        assert!(matches!(classify(Message::Close(None)), Incoming::Closed(None)));
        assert!(matches!(classify(Message::Ping(vec![1])), Incoming::Control));
    }
}
