/// Push transport: STOMP over WebSocket
///
/// `PushTransport` opens an authenticated, subscribed channel; `PushChannel`
/// yields raw MESSAGE bodies until the connection ends. The connection manager
/// only sees these two traits, so tests can drive it without a socket.
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use resilience::{with_timeout_result, TimeoutError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::messages::{StompCommand, StompFrame};
use crate::config::PushConfig;
use crate::error::{AppError, Result};

#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Connect, authenticate and subscribe. Resolves once the broker acknowledged.
    async fn open(&self, bearer: Option<String>) -> Result<Box<dyn PushChannel>>;
}

#[async_trait]
pub trait PushChannel: Send {
    /// Next pushed payload; `None` once the connection is gone
    async fn next_payload(&mut self) -> Option<Result<String>>;

    /// Best-effort graceful close
    async fn close(&mut self);
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SUBSCRIPTION_ID: &str = "sub-0";

pub struct StompTransport {
    url: String,
    topic: String,
    handshake_timeout: Duration,
}

impl StompTransport {
    pub fn new(url: impl Into<String>, topic: impl Into<String>, handshake_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            topic: topic.into(),
            handshake_timeout,
        }
    }

    pub fn from_config(config: &PushConfig) -> Self {
        Self::new(&config.url, &config.topic, config.handshake_timeout)
    }

    fn host(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string())
    }

    /// Upgrade, CONNECT, wait for CONNECTED, SUBSCRIBE
    async fn handshake(&self, bearer: Option<String>) -> Result<WsStream> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(bearer) = &bearer {
            let value = HeaderValue::from_str(bearer)
                .map_err(|e| AppError::Handshake(format!("invalid bearer token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (mut ws, _response) = connect_async(request).await?;
        debug!("WebSocket upgraded: {}", self.url);

        let connect = StompFrame::connect(&self.host(), bearer.as_deref());
        ws.send(Message::Text(connect.encode().into())).await?;

        if let Err(e) = await_connected(&mut ws).await {
            let _ = ws.close(None).await;
            return Err(e);
        }

        let subscribe = StompFrame::subscribe(SUBSCRIPTION_ID, &self.topic);
        ws.send(Message::Text(subscribe.encode().into())).await?;
        Ok(ws)
    }
}

#[async_trait]
impl PushTransport for StompTransport {
    async fn open(&self, bearer: Option<String>) -> Result<Box<dyn PushChannel>> {
        // the deadline covers the HTTP upgrade too; a stalled socket is dropped with the future
        let ws = match with_timeout_result(self.handshake_timeout, self.handshake(bearer)).await {
            Ok(ws) => ws,
            Err(TimeoutError::Elapsed(waited)) => {
                return Err(AppError::Timeout(format!(
                    "push handshake not completed within {:?}",
                    waited
                )));
            }
            Err(TimeoutError::Failed(e)) => return Err(e),
        };
        info!("Subscribed to {} on {}", self.topic, self.url);

        Ok(Box::new(StompChannel { ws, closed: false }))
    }
}

async fn await_connected(ws: &mut WsStream) -> Result<()> {
    while let Some(message) = ws.next().await {
        let Some(text) = message_text(message?) else {
            continue;
        };

        match StompFrame::parse(&text) {
            Ok(Some(frame)) if frame.command == StompCommand::Connected => {
                debug!(
                    "STOMP session established (version {})",
                    frame.header("version").unwrap_or("unspecified")
                );
                return Ok(());
            }
            Ok(Some(frame)) if frame.command == StompCommand::Error => {
                return Err(AppError::Handshake(
                    frame
                        .header("message")
                        .unwrap_or("broker rejected CONNECT")
                        .to_string(),
                ));
            }
            Ok(_) => continue,
            Err(e) => return Err(AppError::Handshake(e.to_string())),
        }
    }

    Err(AppError::Transport("connection closed during handshake".into()))
}

/// Text payload of a data message; control frames yield `None`
fn message_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.as_str().to_string()),
        Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(text),
            Err(_) => {
                warn!("Ignoring non UTF-8 binary frame ({} bytes)", bytes.len());
                None
            }
        },
        _ => None,
    }
}

pub struct StompChannel {
    ws: WsStream,
    closed: bool,
}

#[async_trait]
impl PushChannel for StompChannel {
    async fn next_payload(&mut self) -> Option<Result<String>> {
        if self.closed {
            return None;
        }

        loop {
            let message = match self.ws.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    self.closed = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.closed = true;
                    return None;
                }
            };

            if let Message::Close(frame) = &message {
                debug!("Server closed push socket: {:?}", frame);
                self.closed = true;
                return None;
            }
            let Some(text) = message_text(message) else {
                continue;
            };

            match StompFrame::parse(&text) {
                Ok(None) => continue,
                Ok(Some(frame)) => match frame.command {
                    StompCommand::Message => return Some(Ok(frame.body)),
                    StompCommand::Error => {
                        self.closed = true;
                        let reason = frame.header("message").unwrap_or("unknown error");
                        return Some(Err(AppError::Broker(reason.to_string())));
                    }
                    other => {
                        debug!("Ignoring {} frame", other);
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Skipping unparseable STOMP frame: {}", e);
                    continue;
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let unsubscribe = StompFrame::unsubscribe(SUBSCRIPTION_ID).encode();
        let disconnect = StompFrame::disconnect().encode();
        if let Err(e) = self.ws.send(Message::Text(unsubscribe.into())).await {
            debug!("UNSUBSCRIBE not delivered: {}", e);
        }
        if let Err(e) = self.ws.send(Message::Text(disconnect.into())).await {
            debug!("DISCONNECT not delivered: {}", e);
        }
        if let Err(e) = self.ws.close(None).await {
            debug!("WebSocket close failed: {}", e);
        }
    }
}
