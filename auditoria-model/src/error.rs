use thiserror::Error;

/// Rejected caller input. Raised before any network interaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// A bus message that cannot be turned into an [`crate::AuditEvent`].
///
/// Neither variant is retryable: the same bytes will fail the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed audit event payload: {0}")]
    Malformed(String),

    #[error("audit event is missing required field `{0}`")]
    MissingField(&'static str),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Malformed(err.to_string())
    }
}
