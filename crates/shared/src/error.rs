use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

impl EnvelopeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedEnvelope(reason.into())
    }
}
