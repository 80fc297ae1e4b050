use chrono::NaiveTime;
use client_core::{ProjectionKind, RenderEvent};

const CONNECT_ERROR_HINT: &str = "Could not connect to the chat server. Run the client again to retry.";

pub fn format_event(event: &RenderEvent, at: NaiveTime) -> String {
    let stamp = at.format("%H:%M:%S");
    match event {
        RenderEvent::Projection(projection) => match projection.kind {
            ProjectionKind::Presence => format!("{stamp} {}", projection.body_text),
            ProjectionKind::Chat => format!(
                "{stamp} {}: {}",
                projection.sender_label, projection.body_text
            ),
        },
        RenderEvent::ConnectionError(message) => {
            format!("{stamp} {CONNECT_ERROR_HINT} ({message})")
        }
    }
}
