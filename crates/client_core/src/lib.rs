use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod dispatch;
pub mod error;
pub mod session;
pub mod stomp;
pub mod transport;

pub use dispatch::{project, PresenceRouter, Projection, ProjectionKind};
pub use error::SessionError;
pub use session::{ChatSession, SessionConfig, SessionState};
pub use transport::StompTransport;

/// Opens connections to the message broker.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn Connection>>;
}

/// A live broker connection.
///
/// Inbound messages for a subscription arrive on the returned channel in the
/// order the broker delivered them. The channel closes when the connection
/// drops.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<mpsc::UnboundedReceiver<String>>;
    async fn send(&self, destination: &str, headers: &[(String, String)], body: &str)
        -> Result<()>;
    async fn close(&self) -> Result<()>;
}

pub trait Renderer: Send + Sync {
    fn render_event(&self, projection: Projection);
    fn render_connection_error(&self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    Projection(Projection),
    ConnectionError(String),
}

/// Forwards everything it is asked to render onto a channel.
pub struct ChannelRenderer {
    tx: mpsc::UnboundedSender<RenderEvent>,
}

impl ChannelRenderer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RenderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Renderer for ChannelRenderer {
    fn render_event(&self, projection: Projection) {
        let _ = self.tx.send(RenderEvent::Projection(projection));
    }

    fn render_connection_error(&self, message: &str) {
        let _ = self.tx.send(RenderEvent::ConnectionError(message.to_string()));
    }
}
