use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("audit write timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("failed to encode event payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("hook already registered for {kind}/{operation}")]
    HookAlreadyRegistered { kind: &'static str, operation: &'static str },

    #[error("hook registered for {kind} does not match resource type at call site")]
    HookTypeMismatch { kind: &'static str },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;
