use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatContent, Username},
    error::EnvelopeError,
};

pub const DEFAULT_ENDPOINT: &str = "/ws/websocket";
pub const PUBLIC_TOPIC: &str = "/topic/public";
pub const ADD_USER_DESTINATION: &str = "/app/chat.addUser";
pub const SEND_MESSAGE_DESTINATION: &str = "/app/chat.sendMessage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Join,
    Leave,
    Chat,
}

/// Wire shape of an envelope on the public topic.
///
/// Fields other than `sender`, `content` and `type` are ignored when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireRecord {
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: MessageType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Join {
        sender: Username,
    },
    Leave {
        sender: Username,
    },
    Chat {
        sender: Username,
        content: ChatContent,
    },
}

impl Event {
    pub fn sender(&self) -> &Username {
        match self {
            Event::Join { sender } | Event::Leave { sender } | Event::Chat { sender, .. } => sender,
        }
    }

    pub fn kind(&self) -> MessageType {
        match self {
            Event::Join { .. } => MessageType::Join,
            Event::Leave { .. } => MessageType::Leave,
            Event::Chat { .. } => MessageType::Chat,
        }
    }
}

pub fn encode(event: &Event) -> WireRecord {
    let content = match event {
        Event::Chat { content, .. } => Some(content.as_str().to_string()),
        Event::Join { .. } | Event::Leave { .. } => None,
    };
    WireRecord {
        sender: event.sender().as_str().to_string(),
        content,
        kind: event.kind(),
    }
}

pub fn encode_text(event: &Event) -> Result<String, EnvelopeError> {
    serde_json::to_string(&encode(event))
        .map_err(|err| EnvelopeError::malformed(format!("failed to serialize envelope: {err}")))
}

pub fn decode(wire_text: &str) -> Result<Event, EnvelopeError> {
    let record: WireRecord = serde_json::from_str(wire_text)
        .map_err(|err| EnvelopeError::malformed(err.to_string()))?;
    let sender = Username::from_wire(record.sender)
        .ok_or_else(|| EnvelopeError::malformed("envelope without a sender"))?;

    match record.kind {
        MessageType::Join => Ok(Event::Join { sender }),
        MessageType::Leave => Ok(Event::Leave { sender }),
        MessageType::Chat => {
            let content = record
                .content
                .and_then(ChatContent::new)
                .ok_or_else(|| EnvelopeError::malformed("CHAT envelope without content"))?;
            Ok(Event::Chat { sender, content })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn name(raw: &str) -> Username {
        Username::parse(raw).expect("valid name")
    }

    #[test]
    fn join_is_encoded_without_content() {
        let text = encode_text(&Event::Join {
            sender: name("Alice"),
        })
        .expect("encode");
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value, json!({ "sender": "Alice", "type": "JOIN" }));
    }

    #[test]
    fn chat_is_encoded_with_content() {
        let text = encode_text(&Event::Chat {
            sender: name("Alice"),
            content: ChatContent::new("hi").expect("content"),
        })
        .expect("encode");
        let value: Value = serde_json::from_str(&text).expect("json");
        assert_eq!(
            value,
            json!({ "sender": "Alice", "content": "hi", "type": "CHAT" })
        );
    }

    #[test]
    fn every_event_survives_a_round_trip() {
        let events = [
            Event::Join {
                sender: name("Bob"),
            },
            Event::Leave {
                sender: name("Bob"),
            },
            Event::Chat {
                sender: name("Bob"),
                content: ChatContent::new(" spaced out ").expect("content"),
            },
        ];
        for event in events {
            let text = encode_text(&event).expect("encode");
            assert_eq!(decode(&text).expect("decode"), event);
        }
    }

    #[test]
    fn decodes_broker_join_with_null_content() {
        let event = decode(r#"{"sender":"Bob","content":null,"type":"JOIN"}"#).expect("decode");
        assert_eq!(
            event,
            Event::Join {
                sender: name("Bob")
            }
        );
    }

    #[test]
    fn presence_content_is_ignored() {
        let event = decode(r#"{"sender":"Bob","content":"ignored","type":"LEAVE"}"#)
            .expect("decode");
        assert_eq!(
            event,
            Event::Leave {
                sender: name("Bob")
            }
        );
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let event = decode(r#"{"sender":"Bob","content":"yo","type":"CHAT","id":42}"#)
            .expect("decode");
        assert_eq!(event.kind(), MessageType::Chat);
    }

    #[test]
    fn unknown_type_is_malformed() {
        let err = decode(r#"{"sender":"Bob","type":"PING"}"#).expect_err("must fail");
        assert!(matches!(err, EnvelopeError::MalformedEnvelope(_)));
    }

    #[test]
    fn missing_type_is_malformed() {
        assert!(decode(r#"{"sender":"Bob","content":"hi"}"#).is_err());
    }

    #[test]
    fn chat_without_content_is_malformed() {
        assert!(decode(r#"{"sender":"Bob","type":"CHAT"}"#).is_err());
        assert!(decode(r#"{"sender":"Bob","content":"","type":"CHAT"}"#).is_err());
    }

    #[test]
    fn blank_sender_is_malformed() {
        assert!(decode(r#"{"sender":"","type":"JOIN"}"#).is_err());
        assert!(decode(r#"{"sender":"  ","content":"hi","type":"CHAT"}"#).is_err());
    }

    #[test]
    fn wire_sender_is_kept_verbatim() {
        let event = decode(r#"{"sender":" Bob ","type":"LEAVE"}"#).expect("decode");
        assert_eq!(event.sender().as_str(), " Bob ");
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(decode("not json").is_err());
        assert!(decode("").is_err());
    }
}
