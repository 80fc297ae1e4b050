use std::fmt;

/// Display name a participant announces itself with.
///
/// Never blank. Names supplied by the local user go through [`Username::parse`],
/// which trims them. Names read off the wire keep their exact spelling, but a
/// blank one makes the envelope malformed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub(crate) fn from_wire(raw: String) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        Some(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of a chat message. Never empty, otherwise kept exactly as typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatContent(String);

impl ChatContent {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return None;
        }
        Some(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_is_trimmed() {
        let name = Username::parse("  Alice \t").expect("valid name");
        assert_eq!(name.as_str(), "Alice");
    }

    #[test]
    fn blank_username_is_rejected() {
        assert!(Username::parse("").is_none());
        assert!(Username::parse("   \n").is_none());
    }

    #[test]
    fn wire_names_must_not_be_blank() {
        assert!(Username::from_wire(String::new()).is_none());
        assert!(Username::from_wire(" \t".into()).is_none());
        assert_eq!(
            Username::from_wire(" Bob".into()).map(|name| name.to_string()),
            Some(" Bob".into())
        );
    }

    #[test]
    fn chat_content_keeps_surrounding_whitespace() {
        let content = ChatContent::new("  hi  ").expect("non-empty");
        assert_eq!(content.as_str(), "  hi  ");
        assert!(ChatContent::new("").is_none());
    }
}
