use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    stomp::{Frame, CONNECT, CONNECTED, DISCONNECT, ERROR, MESSAGE, SEND, SUBSCRIBE},
    Connection, Transport,
};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// STOMP 1.2 over a plain WebSocket, as spoken by Spring's simple broker.
pub struct StompTransport {
    server_url: String,
    connect_timeout: Duration,
}

impl StompTransport {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    fn websocket_url(&self, endpoint: &str) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)
            .with_context(|| format!("invalid server url: {}", self.server_url))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => bail!("server_url must use http(s) or ws(s), got {other}://"),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("cannot switch {} to {scheme}", self.server_url))?;
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        url.set_path(&path);
        Ok(url)
    }

    async fn handshake(&self, url: &Url) -> Result<WsStream> {
        let (mut ws_stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {url}"))?;

        let host = url.host_str().unwrap_or("localhost");
        let connect = Frame::new(CONNECT)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0");
        ws_stream
            .send(Message::Text(connect.encode()))
            .await
            .context("failed to send CONNECT frame")?;

        while let Some(msg) = ws_stream.next().await {
            let text = match msg.context("websocket receive failed during handshake")? {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let Some(frame) = Frame::parse(&text)? else {
                continue;
            };
            match frame.command.as_str() {
                CONNECTED => return Ok(ws_stream),
                ERROR => bail!("broker rejected connection: {}", error_message(&frame)),
                other => bail!("unexpected {other} frame while connecting"),
            }
        }
        bail!("connection closed before the broker accepted it")
    }
}

#[async_trait]
impl Transport for StompTransport {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Connection>> {
        let url = self.websocket_url(endpoint)?;
        let ws_stream = tokio::time::timeout(self.connect_timeout, self.handshake(&url))
            .await
            .map_err(|_| anyhow!("timed out connecting to {url}"))??;
        info!(url = %url, "stomp: connected");
        Ok(Arc::new(StompConnection::start(ws_stream)))
    }
}

#[derive(Default)]
struct Subscriptions {
    closed: bool,
    routes: HashMap<String, mpsc::UnboundedSender<String>>,
}

struct StompConnection {
    writer: Mutex<SplitSink<WsStream, Message>>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    next_subscription: AtomicU64,
    reader_task: JoinHandle<()>,
}

impl StompConnection {
    fn start(ws_stream: WsStream) -> Self {
        let (writer, reader) = ws_stream.split();
        let subscriptions = Arc::new(Mutex::new(Subscriptions::default()));
        let reader_task = tokio::spawn(read_frames(reader, Arc::clone(&subscriptions)));
        Self {
            writer: Mutex::new(writer),
            subscriptions,
            next_subscription: AtomicU64::new(0),
            reader_task,
        }
    }

    async fn write(&self, frame: &Frame) -> Result<()> {
        self.writer
            .lock()
            .await
            .send(Message::Text(frame.encode()))
            .await
            .with_context(|| format!("failed to send {} frame", frame.command))
    }
}

#[async_trait]
impl Connection for StompConnection {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::UnboundedReceiver<String>> {
        let id = format!(
            "sub-{}",
            self.next_subscription.fetch_add(1, Ordering::Relaxed)
        );
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut guard = self.subscriptions.lock().await;
            if guard.closed {
                bail!("connection is closed");
            }
            guard.routes.insert(id.clone(), tx);
        }

        let frame = Frame::new(SUBSCRIBE)
            .header("id", id.as_str())
            .header("destination", topic)
            .header("ack", "auto");
        if let Err(err) = self.write(&frame).await {
            self.subscriptions.lock().await.routes.remove(&id);
            return Err(err);
        }
        debug!(id = %id, topic, "stomp: subscribed");
        Ok(rx)
    }

    async fn send(
        &self,
        destination: &str,
        headers: &[(String, String)],
        body: &str,
    ) -> Result<()> {
        let mut frame = Frame::new(SEND)
            .header("destination", destination)
            .header("content-type", "application/json")
            .header("content-length", body.len().to_string());
        for (key, value) in headers {
            frame = frame.header(key.as_str(), value.as_str());
        }
        self.write(&frame.body(body)).await
    }

    async fn close(&self) -> Result<()> {
        let result = async {
            self.write(&Frame::new(DISCONNECT)).await?;
            self.writer
                .lock()
                .await
                .close()
                .await
                .context("failed to close websocket")
        }
        .await;

        self.reader_task.abort();
        let mut guard = self.subscriptions.lock().await;
        guard.closed = true;
        guard.routes.clear();
        result
    }
}

impl Drop for StompConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn read_frames(mut reader: SplitStream<WsStream>, subscriptions: Arc<Mutex<Subscriptions>>) {
    while let Some(msg) = reader.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                warn!(error = %err, "stomp: websocket receive failed");
                break;
            }
        };
        let frame = match Frame::parse(&text) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(err) => {
                warn!(error = %err, "stomp: dropping unparseable frame");
                continue;
            }
        };
        match frame.command.as_str() {
            MESSAGE => {
                let Some(id) = frame.get_header("subscription").map(str::to_string) else {
                    warn!("stomp: MESSAGE frame without subscription header");
                    continue;
                };
                let guard = subscriptions.lock().await;
                match guard.routes.get(&id) {
                    Some(tx) => {
                        let _ = tx.send(frame.body);
                    }
                    None => debug!(id = %id, "stomp: MESSAGE for unknown subscription"),
                }
            }
            ERROR => {
                warn!(message = %error_message(&frame), "stomp: broker sent ERROR frame");
                break;
            }
            other => debug!(command = other, "stomp: ignoring frame"),
        }
    }

    let mut guard = subscriptions.lock().await;
    guard.closed = true;
    guard.routes.clear();
    debug!("stomp: reader finished");
}

fn error_message(frame: &Frame) -> String {
    frame
        .get_header("message")
        .map(str::to_string)
        .unwrap_or_else(|| frame.body.trim().to_string())
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
