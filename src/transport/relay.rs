//! Push relay transport.
//!
//! Talks to a push relay gateway that performs device check-in and holds
//! the upstream push socket on our behalf.
//!
//! # Protocol
//!
//! - `POST {relay}/register` with `{"senderId": ...}` returns the credentials bundle
//! - Listen connects via WebSocket to `{relay}/listen`, authenticated with
//!   `Bearer {androidId}:{securityToken}`
//! - First frame from us: `{"type": "hello", "persistentIds": [...]}`
//! - Relay frames: `{"type": "notification", "notification": {...}, "persistentId": "..."}`
//!   and `{"type": "heartbeat"}`
//!
//! # Reconnection
//!
//! On disconnect, reconnects with exponential backoff and re-sends every id
//! already seen in the hello frame, so the relay does not redeliver them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Connection, Delivery, ListenRequest, NotificationSink, PushTransport};
use crate::constants::{RECONNECT_INITIAL_BACKOFF, RECONNECT_MAX_BACKOFF};
use crate::credentials::{redact, Credentials};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`PushTransport`] backed by a push relay gateway.
#[derive(Debug, Clone)]
pub struct RelayTransport {
    client: reqwest::Client,
    relay_url: String,
}

impl RelayTransport {
    /// Create a transport for the relay at `relay_url`.
    pub fn new(relay_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            relay_url: relay_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Build the WebSocket URL from the relay URL.
///
/// Converts `https://` to `wss://` and `http://` to `ws://`, then appends `/listen`.
fn build_ws_url(relay_url: &str) -> String {
    format!(
        "{}/listen",
        relay_url
            .replace("https://", "wss://")
            .replace("http://", "ws://")
    )
}

fn hello_frame(persistent_ids: &[String]) -> String {
    serde_json::json!({
        "type": "hello",
        "persistentIds": persistent_ids
    })
    .to_string()
}

/// Frames sent by the relay.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RelayFrame {
    Notification {
        notification: serde_json::Value,
        #[serde(rename = "persistentId")]
        persistent_id: String,
    },
    Heartbeat,
    #[serde(other)]
    Unknown,
}

/// Open the socket and send the hello frame.
async fn connect(ws_url: &str, credentials: &Credentials, persistent_ids: &[String]) -> Result<WsStream> {
    let mut request = ws_url
        .into_client_request()
        .context("Invalid relay listen URL")?;
    let auth: tungstenite::http::HeaderValue = format!(
        "Bearer {}:{}",
        credentials.gcm.android_id, credentials.gcm.security_token
    )
    .parse()
    .context("Device credentials are not valid header text")?;
    request.headers_mut().insert("Authorization", auth);

    let (mut stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .with_context(|| format!("Failed to connect to {ws_url}"))?;

    stream
        .send(tungstenite::Message::Text(hello_frame(persistent_ids)))
        .await
        .context("Failed to send hello frame")?;

    Ok(stream)
}

#[async_trait]
impl PushTransport for RelayTransport {
    async fn register(&self, sender_id: &str) -> Result<Credentials> {
        let url = format!("{}/register", self.relay_url);
        log::info!("[Relay] Registering sender {sender_id} at {url}");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "senderId": sender_id }))
            .send()
            .await
            .context("Registration request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Registration rejected (HTTP {}): {}",
                status.as_u16(),
                body.trim()
            );
        }

        let value: serde_json::Value = response
            .json()
            .await
            .context("Registration response is not JSON")?;
        let credentials =
            Credentials::from_value(value).context("Malformed registration credentials")?;
        credentials.validate()?;

        log::info!("[Relay] Registered, token {}...", redact(credentials.token()));
        Ok(credentials)
    }

    async fn listen(
        &self,
        request: ListenRequest,
        sink: NotificationSink,
    ) -> Result<Box<dyn Connection>> {
        let ws_url = build_ws_url(&self.relay_url);
        log::info!(
            "[Relay] Connecting to {} ({} known ids)",
            ws_url,
            request.persistent_ids.len()
        );

        let stream = connect(&ws_url, &request.credentials, &request.persistent_ids).await?;
        log::info!("[Relay] Listening");

        let shutdown = Arc::new(AtomicBool::new(false));
        let listener = ListenLoop {
            ws_url,
            credentials: request.credentials,
            seen: request.persistent_ids,
            sink,
            shutdown: Arc::clone(&shutdown),
        };
        let task = tokio::spawn(listener.run(stream));

        Ok(Box::new(RelayConnection { shutdown, task }))
    }
}

/// Handle to the background listen task.
#[derive(Debug)]
struct RelayConnection {
    shutdown: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl Connection for RelayConnection {
    fn destroy(&mut self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            log::info!("[Relay] Disconnecting");
        }
        self.task.abort();
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// State owned by the background listen task.
struct ListenLoop {
    ws_url: String,
    credentials: Credentials,
    /// Every persistent id known so far, re-sent on reconnect.
    seen: Vec<String>,
    sink: NotificationSink,
    shutdown: Arc<AtomicBool>,
}

impl ListenLoop {
    async fn run(mut self, mut stream: WsStream) {
        loop {
            let reason = self.read_frames(&mut stream).await;
            if self.shutdown.load(Ordering::SeqCst) {
                return;
            }

            log::info!("[Relay] Disconnected ({reason}), reconnecting");
            match self.reconnect().await {
                Some(fresh) => stream = fresh,
                None => return,
            }
        }
    }

    /// Reconnect with exponential backoff. `None` when shut down meanwhile.
    async fn reconnect(&self) -> Option<WsStream> {
        let mut backoff = RECONNECT_INITIAL_BACKOFF;
        loop {
            tokio::time::sleep(backoff).await;
            if self.shutdown.load(Ordering::SeqCst) {
                return None;
            }

            match connect(&self.ws_url, &self.credentials, &self.seen).await {
                Ok(stream) => {
                    log::info!("[Relay] Reconnected ({} known ids)", self.seen.len());
                    return Some(stream);
                }
                Err(e) => {
                    backoff = (backoff * 2).min(RECONNECT_MAX_BACKOFF);
                    log::warn!(
                        "[Relay] Reconnect failed: {e:#} (retry in {}s)",
                        backoff.as_secs()
                    );
                }
            }
        }
    }

    /// Read until the socket ends. Returns why it ended.
    async fn read_frames<S>(&mut self, stream: &mut S) -> &'static str
    where
        S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
            + Sink<tungstenite::Message, Error = tungstenite::Error>
            + Unpin,
    {
        while let Some(msg) = stream.next().await {
            if self.shutdown.load(Ordering::SeqCst) {
                return "shutdown";
            }

            match msg {
                Ok(tungstenite::Message::Text(text)) => self.handle_text(&text),
                Ok(tungstenite::Message::Ping(data)) => {
                    if let Err(e) = stream.send(tungstenite::Message::Pong(data)).await {
                        log::debug!("[Relay] Pong failed: {e}");
                        return "socket error";
                    }
                }
                Ok(tungstenite::Message::Close(_)) => return "closed by relay",
                Ok(_) => {}
                Err(e) => {
                    log::warn!("[Relay] Socket error: {e}");
                    return "socket error";
                }
            }
        }
        "stream ended"
    }

    fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<RelayFrame>(text) {
            Ok(RelayFrame::Notification {
                notification,
                persistent_id,
            }) => {
                log::debug!("[Relay] Notification {persistent_id}");
                self.seen.push(persistent_id.clone());
                self.sink.deliver(Delivery {
                    notification,
                    persistent_id,
                });
            }
            Ok(RelayFrame::Heartbeat) => log::trace!("[Relay] Heartbeat"),
            Ok(RelayFrame::Unknown) => log::debug!("[Relay] Ignoring unknown frame"),
            Err(e) => log::warn!("[Relay] Malformed frame: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ws_url() {
        assert_eq!(
            build_ws_url("https://relay.example.com"),
            "wss://relay.example.com/listen"
        );
        assert_eq!(build_ws_url("http://127.0.0.1:9000"), "ws://127.0.0.1:9000/listen");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let transport = RelayTransport::new("https://relay.example.com/", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.relay_url, "https://relay.example.com");
    }

    #[test]
    fn test_hello_frame_carries_ids() {
        let frame: serde_json::Value =
            serde_json::from_str(&hello_frame(&["a".to_string(), "b".to_string()])).unwrap();
        assert_eq!(frame["type"], "hello");
        assert_eq!(frame["persistentIds"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_frame_parsing() {
        let frame: RelayFrame = serde_json::from_str(
            r#"{"type":"notification","notification":{"body":"x"},"persistentId":"p9"}"#,
        )
        .unwrap();
        assert!(matches!(
            frame,
            RelayFrame::Notification { ref persistent_id, .. } if persistent_id == "p9"
        ));

        let frame: RelayFrame = serde_json::from_str(r#"{"type":"heartbeat"}"#).unwrap();
        assert!(matches!(frame, RelayFrame::Heartbeat));

        let frame: RelayFrame = serde_json::from_str(r#"{"type":"welcome"}"#).unwrap();
        assert!(matches!(frame, RelayFrame::Unknown));
    }

    /// Socket that replays scripted frames and records (or rejects) sends.
    struct ScriptedSocket {
        incoming: std::collections::VecDeque<tungstenite::Message>,
        sent: Vec<tungstenite::Message>,
        reject_sends: bool,
    }

    impl ScriptedSocket {
        fn new(frames: Vec<tungstenite::Message>, reject_sends: bool) -> Self {
            Self {
                incoming: frames.into(),
                sent: Vec::new(),
                reject_sends,
            }
        }
    }

    impl Stream for ScriptedSocket {
        type Item = Result<tungstenite::Message, tungstenite::Error>;

        fn poll_next(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Self::Item>> {
            std::task::Poll::Ready(self.incoming.pop_front().map(Ok))
        }
    }

    impl Sink<tungstenite::Message> for ScriptedSocket {
        type Error = tungstenite::Error;

        fn poll_ready(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            if self.reject_sends {
                std::task::Poll::Ready(Err(tungstenite::Error::ConnectionClosed))
            } else {
                std::task::Poll::Ready(Ok(()))
            }
        }

        fn start_send(
            mut self: std::pin::Pin<&mut Self>,
            item: tungstenite::Message,
        ) -> Result<(), Self::Error> {
            self.sent.push(item);
            Ok(())
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_close(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    fn listen_loop(delivered: Arc<std::sync::Mutex<Vec<String>>>) -> ListenLoop {
        let credentials = Credentials::from_value(serde_json::json!({
            "gcm": {"androidId": "1", "securityToken": "2"},
            "fcm": {"token": "t"}
        }))
        .unwrap();
        ListenLoop {
            ws_url: "ws://127.0.0.1:1/listen".to_string(),
            credentials,
            seen: vec!["old".to_string()],
            sink: NotificationSink::new(move |d| delivered.lock().unwrap().push(d.persistent_id)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    fn notification(id: &str) -> tungstenite::Message {
        tungstenite::Message::Text(
            serde_json::json!({"type": "notification", "notification": {}, "persistentId": id})
                .to_string(),
        )
    }

    #[tokio::test]
    async fn test_read_frames_delivers_and_answers_pings() {
        let delivered = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut listener = listen_loop(Arc::clone(&delivered));
        let mut socket = ScriptedSocket::new(
            vec![
                notification("p1"),
                tungstenite::Message::Ping(vec![7]),
                tungstenite::Message::Text(r#"{"type":"heartbeat"}"#.to_string()),
                notification("p2"),
            ],
            false,
        );

        let reason = listener.read_frames(&mut socket).await;

        assert_eq!(reason, "stream ended");
        assert_eq!(*delivered.lock().unwrap(), vec!["p1", "p2"]);
        assert_eq!(listener.seen, vec!["old", "p1", "p2"]);
        assert_eq!(socket.sent, vec![tungstenite::Message::Pong(vec![7])]);
    }

    #[tokio::test]
    async fn test_failed_pong_ends_read_loop() {
        let delivered = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut listener = listen_loop(Arc::clone(&delivered));
        let mut socket = ScriptedSocket::new(
            vec![tungstenite::Message::Ping(vec![1]), notification("p1")],
            true,
        );

        let reason = listener.read_frames(&mut socket).await;

        assert_eq!(reason, "socket error");
        assert!(delivered.lock().unwrap().is_empty());
    }
}
