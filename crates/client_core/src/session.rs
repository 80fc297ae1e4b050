use std::sync::Arc;

use shared::{
    domain::{ChatContent, Username},
    protocol::{
        encode_text, Event, ADD_USER_DESTINATION, DEFAULT_ENDPOINT, PUBLIC_TOPIC,
        SEND_MESSAGE_DESTINATION,
    },
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{dispatch::PresenceRouter, Connection, Renderer, SessionError, Transport};

const CONNECTION_LOST_MESSAGE: &str = "connection to the chat server was lost";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub endpoint: String,
    pub topic: String,
    pub join_destination: String,
    pub chat_destination: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            topic: PUBLIC_TOPIC.into(),
            join_destination: ADD_USER_DESTINATION.into(),
            chat_destination: SEND_MESSAGE_DESTINATION.into(),
        }
    }
}

struct SessionInner {
    state: SessionState,
    username: Option<Username>,
    connection: Option<Arc<dyn Connection>>,
    inbound_task: Option<JoinHandle<()>>,
    // Bumped on every connect attempt and disconnect; continuations carrying an
    // older value are stale and must not touch the session.
    generation: u64,
}

impl SessionInner {
    fn is_current(&self, generation: u64, state: SessionState) -> bool {
        self.generation == generation && self.state == state
    }
}

/// One logical chat session over a single broker connection.
pub struct ChatSession {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    renderer: Arc<dyn Renderer>,
    router: PresenceRouter,
    inner: Mutex<SessionInner>,
}

impl ChatSession {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn Renderer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            transport,
            router: PresenceRouter::new(Arc::clone(&renderer)),
            renderer,
            inner: Mutex::new(SessionInner {
                state: SessionState::Disconnected,
                username: None,
                connection: None,
                inbound_task: None,
                generation: 0,
            }),
        })
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn username(&self) -> Option<Username> {
        self.inner.lock().await.username.clone()
    }

    /// Connects as `raw_name`, subscribes to the public topic and announces
    /// presence.
    ///
    /// Resolves once the attempt settles. A connect failure is rendered once and
    /// returned as [`SessionError::Connection`]. If the session was disconnected
    /// while the attempt was in flight, the late connection is closed and the
    /// call resolves with `Ok(())`.
    pub async fn request_connect(self: &Arc<Self>, raw_name: &str) -> Result<(), SessionError> {
        let (generation, username) = {
            let mut guard = self.inner.lock().await;
            match guard.state {
                SessionState::Disconnected | SessionState::Failed => {}
                state => {
                    return Err(SessionError::InvalidState {
                        operation: "connect",
                        state,
                    })
                }
            }
            let username = Username::parse(raw_name).ok_or(SessionError::InvalidUsername)?;
            guard.generation += 1;
            guard.state = SessionState::Connecting;
            guard.username = Some(username.clone());
            info!(
                generation = guard.generation,
                username = %username,
                endpoint = %self.config.endpoint,
                "session: connecting"
            );
            (guard.generation, username)
        };

        match self.transport.connect(&self.config.endpoint).await {
            Ok(connection) => {
                self.on_connect_success(generation, username, connection)
                    .await
            }
            Err(err) => self.on_connect_failure(generation, format!("{err:#}")).await,
        }
    }

    async fn on_connect_success(
        self: &Arc<Self>,
        generation: u64,
        username: Username,
        connection: Arc<dyn Connection>,
    ) -> Result<(), SessionError> {
        {
            let mut guard = self.inner.lock().await;
            if !guard.is_current(generation, SessionState::Connecting) {
                drop(guard);
                debug!(generation, "session: closing connection from a superseded attempt");
                close_quietly(connection.as_ref()).await;
                return Ok(());
            }
            // Held here so a disconnect during subscribe/announce can close it.
            guard.connection = Some(Arc::clone(&connection));
        }

        let inbound = match connection.subscribe(&self.config.topic).await {
            Ok(inbound) => inbound,
            Err(err) => {
                let message = format!("failed to subscribe to {}: {err:#}", self.config.topic);
                return self.abandon_attempt(generation, connection, message).await;
            }
        };

        let announced = match encode_text(&Event::Join {
            sender: username.clone(),
        }) {
            Ok(join) => connection
                .send(&self.config.join_destination, &[], &join)
                .await
                .map_err(|err| format!("failed to announce presence: {err:#}")),
            Err(err) => Err(err.to_string()),
        };
        if let Err(message) = announced {
            return self.abandon_attempt(generation, connection, message).await;
        }

        let mut guard = self.inner.lock().await;
        if !guard.is_current(generation, SessionState::Connecting) {
            drop(guard);
            debug!(generation, "session: attempt superseded while announcing presence");
            close_quietly(connection.as_ref()).await;
            return Ok(());
        }
        guard.state = SessionState::Connected;
        guard.inbound_task = Some(self.spawn_inbound(generation, inbound));
        info!(generation, username = %username, topic = %self.config.topic, "session: connected");
        Ok(())
    }

    /// Fails a connect attempt that got past the transport but not past
    /// subscribe/announce. Stale attempts only close their connection.
    async fn abandon_attempt(
        &self,
        generation: u64,
        connection: Arc<dyn Connection>,
        message: String,
    ) -> Result<(), SessionError> {
        let current = {
            let mut guard = self.inner.lock().await;
            let current = guard.is_current(generation, SessionState::Connecting);
            if current {
                self.fail_attempt(&mut guard, &message);
            }
            current
        };
        close_quietly(connection.as_ref()).await;
        if current {
            Err(SessionError::Connection(message))
        } else {
            debug!(generation, error = %message, "session: ignoring failure of a superseded attempt");
            Ok(())
        }
    }

    async fn on_connect_failure(&self, generation: u64, message: String) -> Result<(), SessionError> {
        let mut guard = self.inner.lock().await;
        if !guard.is_current(generation, SessionState::Connecting) {
            debug!(generation, error = %message, "session: ignoring failure of a superseded attempt");
            return Ok(());
        }
        self.fail_attempt(&mut guard, &message);
        Err(SessionError::Connection(message))
    }

    fn fail_attempt(&self, inner: &mut SessionInner, message: &str) {
        inner.state = SessionState::Failed;
        inner.username = None;
        inner.connection = None;
        warn!(generation = inner.generation, error = %message, "session: connect failed");
        self.renderer.render_connection_error(message);
    }

    fn spawn_inbound(
        self: &Arc<Self>,
        generation: u64,
        mut inbound: mpsc::UnboundedReceiver<String>,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(wire_text) = inbound.recv().await {
                let guard = session.inner.lock().await;
                if !guard.is_current(generation, SessionState::Connected) {
                    debug!(generation, "session: dropping envelope for a stale connection");
                    return;
                }
                session.router.on_envelope_received(&wire_text);
            }
            session.on_inbound_closed(generation).await;
        })
    }

    async fn on_inbound_closed(&self, generation: u64) {
        let connection = {
            let mut guard = self.inner.lock().await;
            if !guard.is_current(generation, SessionState::Connected) {
                debug!(generation, "session: ignoring closure of a stale connection");
                return;
            }
            guard.state = SessionState::Failed;
            guard.username = None;
            guard.inbound_task = None;
            warn!(generation, "session: connection lost");
            self.renderer.render_connection_error(CONNECTION_LOST_MESSAGE);
            guard.connection.take()
        };
        if let Some(connection) = connection {
            close_quietly(connection.as_ref()).await;
        }
    }

    /// Publishes `raw_text` as a chat message. Blank input is ignored.
    ///
    /// The session lock is released before the envelope goes out, so a slow
    /// broker never holds up a disconnect.
    pub async fn request_send(&self, raw_text: &str) -> Result<(), SessionError> {
        let (connection, sender) = {
            let guard = self.inner.lock().await;
            if guard.state != SessionState::Connected {
                return Err(SessionError::InvalidState {
                    operation: "send",
                    state: guard.state,
                });
            }
            let (Some(connection), Some(sender)) =
                (guard.connection.clone(), guard.username.clone())
            else {
                return Err(SessionError::InvalidState {
                    operation: "send",
                    state: guard.state,
                });
            };
            (connection, sender)
        };

        if raw_text.trim().is_empty() {
            debug!("session: ignoring blank message");
            return Ok(());
        }
        let Some(content) = ChatContent::new(raw_text) else {
            return Ok(());
        };

        let body = encode_text(&Event::Chat { sender, content })
            .map_err(|err| SessionError::Send(err.to_string()))?;
        connection
            .send(&self.config.chat_destination, &[], &body)
            .await
            .map_err(|err| {
                let message = format!("{err:#}");
                warn!(error = %message, "session: chat send failed");
                SessionError::Send(message)
            })
    }

    /// Tears the session down from any state.
    pub async fn request_disconnect(&self) {
        let (connection, inbound_task) = {
            let mut guard = self.inner.lock().await;
            guard.generation += 1;
            info!(
                generation = guard.generation,
                previous = ?guard.state,
                "session: disconnecting"
            );
            guard.state = SessionState::Disconnected;
            guard.username = None;
            (guard.connection.take(), guard.inbound_task.take())
        };

        if let Some(task) = inbound_task {
            task.abort();
        }
        if let Some(connection) = connection {
            close_quietly(connection.as_ref()).await;
        }
    }
}

async fn close_quietly(connection: &dyn Connection) {
    if let Err(err) = connection.close().await {
        let message = format!("{err:#}");
        debug!(error = %message, "session: error while closing connection");
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
