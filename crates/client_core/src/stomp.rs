//! Minimal STOMP 1.2 framing for text WebSocket messages.

use thiserror::Error;

pub const CONNECT: &str = "CONNECT";
pub const CONNECTED: &str = "CONNECTED";
pub const SUBSCRIBE: &str = "SUBSCRIBE";
pub const SEND: &str = "SEND";
pub const MESSAGE: &str = "MESSAGE";
pub const ERROR: &str = "ERROR";
pub const DISCONNECT: &str = "DISCONNECT";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame is truncated")]
    Truncated,
    #[error("frame has an empty command")]
    EmptyCommand,
    #[error("invalid header line: {0}")]
    InvalidHeader(String),
    #[error("invalid escape sequence in header: {0}")]
    InvalidEscape(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `key`; repeated headers keep the first occurrence.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn encode(&self) -> String {
        let escaped = uses_escaping(&self.command);
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (key, value) in &self.headers {
            if escaped {
                out.push_str(&escape(key));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(key);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parses one frame. Returns `Ok(None)` for a heart-beat (bare end-of-lines).
    pub fn parse(raw: &str) -> Result<Option<Self>, FrameError> {
        let mut rest = raw.trim_start_matches(['\r', '\n']);
        if rest.is_empty() || rest == "\0" {
            return Ok(None);
        }

        let command = next_line(&mut rest).ok_or(FrameError::Truncated)?;
        if command.is_empty() {
            return Err(FrameError::EmptyCommand);
        }
        let escaped = uses_escaping(command);

        let mut headers = Vec::new();
        loop {
            let line = next_line(&mut rest).ok_or(FrameError::Truncated)?;
            if line.is_empty() {
                break;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::InvalidHeader(line.to_string()))?;
            if escaped {
                headers.push((unescape(key)?, unescape(value)?));
            } else {
                headers.push((key.to_string(), value.to_string()));
            }
        }

        let mut frame = Frame {
            command: command.to_string(),
            headers,
            body: String::new(),
        };

        let body = match frame.get_header("content-length") {
            Some(len) => {
                let len: usize = len
                    .trim()
                    .parse()
                    .map_err(|_| FrameError::InvalidHeader(format!("content-length:{len}")))?;
                rest.get(..len).ok_or(FrameError::Truncated)?
            }
            None => {
                let end = rest.find('\0').ok_or(FrameError::Truncated)?;
                &rest[..end]
            }
        };
        frame.body = body.to_string();
        Ok(Some(frame))
    }
}

fn uses_escaping(command: &str) -> bool {
    command != CONNECT && command != CONNECTED
}

fn next_line<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let end = rest.find('\n')?;
    let line = &rest[..end];
    *rest = &rest[end + 1..];
    Some(line.strip_suffix('\r').unwrap_or(line))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_send_frame() {
        let frame = Frame::new(SEND)
            .header("destination", "/app/chat.sendMessage")
            .header("content-length", "2")
            .body("hi");
        assert_eq!(
            frame.encode(),
            "SEND\ndestination:/app/chat.sendMessage\ncontent-length:2\n\nhi\0"
        );
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let frame = Frame::new(CONNECT).header("host", "localhost:8080");
        assert_eq!(frame.encode(), "CONNECT\nhost:localhost:8080\n\n\0");
    }

    #[test]
    fn escapes_and_unescapes_header_values() {
        let frame = Frame::new(MESSAGE).header("note", "a:b\\c\nd");
        let encoded = frame.encode();
        assert!(encoded.contains("note:a\\cb\\\\c\\nd\n"));
        let parsed = Frame::parse(&encoded).expect("parse").expect("frame");
        assert_eq!(parsed.get_header("note"), Some("a:b\\c\nd"));
    }

    #[test]
    fn parses_spring_message_frame() {
        let raw = "MESSAGE\r\ndestination:/topic/public\r\ncontent-type:application/json\r\nsubscription:sub-0\r\nmessage-id:1\r\ncontent-length:30\r\n\r\n{\"sender\":\"Bob\",\"type\":\"JOIN\"}\0";
        let frame = Frame::parse(raw).expect("parse").expect("frame");
        assert_eq!(frame.command, MESSAGE);
        assert_eq!(frame.get_header("subscription"), Some("sub-0"));
        assert_eq!(frame.body, r#"{"sender":"Bob","type":"JOIN"}"#);
    }

    #[test]
    fn body_without_content_length_ends_at_nul() {
        let frame = Frame::parse("ERROR\nmessage:bad\n\ndetails\0\n")
            .expect("parse")
            .expect("frame");
        assert_eq!(frame.body, "details");
        assert_eq!(frame.get_header("message"), Some("bad"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let frame = Frame::parse("MESSAGE\nfoo:first\nfoo:second\n\n\0")
            .expect("parse")
            .expect("frame");
        assert_eq!(frame.get_header("foo"), Some("first"));
    }

    #[test]
    fn heart_beats_are_not_frames() {
        assert_eq!(Frame::parse("\n"), Ok(None));
        assert_eq!(Frame::parse("\r\n\r\n"), Ok(None));
    }

    #[test]
    fn rejects_broken_frames() {
        assert_eq!(Frame::parse("MESSAGE"), Err(FrameError::Truncated));
        assert_eq!(Frame::parse("MESSAGE\n\nno terminator"), Err(FrameError::Truncated));
        assert!(matches!(
            Frame::parse("MESSAGE\nnocolon\n\n\0"),
            Err(FrameError::InvalidHeader(_))
        ));
        assert!(matches!(
            Frame::parse("MESSAGE\nbad:\\x\n\n\0"),
            Err(FrameError::InvalidEscape(_))
        ));
        assert!(matches!(
            Frame::parse("MESSAGE\ncontent-length:99\n\nshort\0"),
            Err(FrameError::Truncated)
        ));
    }
}
