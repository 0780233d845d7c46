use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::error::{Result, SocketError};
use crate::calls::{SignalingChannel, SignalingError};
use crate::types::{IncomingSignal, OutgoingSignal};

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

const INBOUND_CAPACITY: usize = 100;

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

pub fn encode_frame(signal: &OutgoingSignal) -> Result<String> {
    Ok(serde_json::to_string(&Frame {
        event: signal.event().to_string(),
        data: signal.payload(),
    })?)
}

/// Decodes one text frame. Events unrelated to calls yield `Ok(None)`.
pub fn decode_frame(text: &str) -> Result<Option<IncomingSignal>> {
    let frame: Frame = serde_json::from_str(text)?;
    Ok(IncomingSignal::decode(&frame.event, frame.data)?)
}

/// Outbound half of the relay connection.
pub struct WsSignalingChannel {
    sink: Mutex<Option<WsSink>>,
}

impl WsSignalingChannel {
    fn new(sink: WsSink) -> Self {
        Self {
            sink: Mutex::new(Some(sink)),
        }
    }

    pub async fn send_frame(&self, text: String) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(SocketError::SocketClosed)?;
        trace!("--> {}", text);
        sink.send(Message::text(text)).await?;
        Ok(())
    }

    pub async fn disconnect(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!("Error closing signaling socket: {e}");
            }
        }
    }
}

#[async_trait]
impl SignalingChannel for WsSignalingChannel {
    async fn send(&self, signal: OutgoingSignal) -> std::result::Result<(), SignalingError> {
        let event = signal.event();
        let text = encode_frame(&signal).map_err(|e| SignalingError::Send {
            event,
            reason: e.to_string(),
        })?;
        self.send_frame(text).await.map_err(|e| match e {
            SocketError::SocketClosed => SignalingError::Closed,
            e => SignalingError::Send {
                event,
                reason: e.to_string(),
            },
        })
    }
}

/// Dials the relay. Inbound call signals arrive on the returned receiver,
/// which closes when the connection is lost.
pub async fn connect(
    url: &str,
    token: Option<&str>,
) -> Result<(Arc<WsSignalingChannel>, mpsc::Receiver<IncomingSignal>)> {
    let mut request = url.into_client_request()?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| SocketError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    info!("Dialing {url}");
    let (ws, _response) = connect_async(request).await?;
    let (sink, stream) = ws.split();

    let (signal_tx, signal_rx) = mpsc::channel(INBOUND_CAPACITY);
    tokio::task::spawn(read_pump(stream, signal_tx));

    Ok((Arc::new(WsSignalingChannel::new(sink)), signal_rx))
}

async fn read_pump(mut stream: WsStream, signal_tx: mpsc::Sender<IncomingSignal>) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                Ok(Some(signal)) => {
                    if signal_tx.send(signal).await.is_err() {
                        warn!("Signal receiver dropped, closing read pump");
                        break;
                    }
                }
                Ok(None) => trace!("<-- Ignoring non-call frame"),
                Err(e) => warn!("Dropping frame: {e}"),
            },
            Some(Ok(Message::Close(frame))) => {
                trace!("Received close frame: {:?}", frame);
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!("Error reading from websocket: {e}");
                break;
            }
            None => {
                trace!("Websocket stream ended");
                break;
            }
        }
    }

    info!("Disconnected from signaling relay");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SessionDescription, UserId};

    #[test]
    fn test_encode_wraps_event_and_payload() {
        let text = encode_frame(&OutgoingSignal::EndCall {
            to: UserId::new("bob"),
        })
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, serde_json::json!({ "event": "endCall", "data": { "to": "bob" } }));
    }

    #[test]
    fn test_decode_call_accepted() {
        let text = r#"{"event":"callAccepted","data":{"type":"answer","sdp":"v=0"}}"#;
        assert_eq!(
            decode_frame(text).unwrap(),
            Some(IncomingSignal::CallAccepted(SessionDescription::answer("v=0")))
        );
    }

    #[test]
    fn test_decode_event_without_data() {
        assert_eq!(
            decode_frame(r#"{"event":"callEnded"}"#).unwrap(),
            Some(IncomingSignal::CallEnded)
        );
    }

    #[test]
    fn test_decode_ignores_chat_frames() {
        let text = r#"{"event":"newMessage","data":{"text":"hi"}}"#;
        assert!(decode_frame(text).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_frame("not json"),
            Err(SocketError::MalformedFrame(_))
        ));
        assert!(matches!(
            decode_frame(r#"{"event":"hey","data":{}}"#),
            Err(SocketError::Decode(_))
        ));
    }
}
