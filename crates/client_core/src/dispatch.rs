use std::sync::Arc;

use shared::protocol::{decode, Event};
use tracing::warn;

use crate::Renderer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    Presence,
    Chat,
}

/// Render-ready form of an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub sender_label: String,
    pub body_text: String,
    pub kind: ProjectionKind,
}

pub fn project(event: &Event) -> Projection {
    match event {
        Event::Join { sender } => Projection {
            sender_label: String::new(),
            body_text: format!("{sender} joined"),
            kind: ProjectionKind::Presence,
        },
        Event::Leave { sender } => Projection {
            sender_label: String::new(),
            body_text: format!("{sender} left"),
            kind: ProjectionKind::Presence,
        },
        Event::Chat { sender, content } => Projection {
            sender_label: sender.to_string(),
            body_text: content.to_string(),
            kind: ProjectionKind::Chat,
        },
    }
}

/// Turns inbound wire texts into projections, one per envelope, in arrival order.
pub struct PresenceRouter {
    renderer: Arc<dyn Renderer>,
}

impl PresenceRouter {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self { renderer }
    }

    pub fn on_envelope_received(&self, wire_text: &str) {
        let event = match decode(wire_text) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, "router: dropping inbound envelope");
                return;
            }
        };
        self.renderer.render_event(project(&event));
    }
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
