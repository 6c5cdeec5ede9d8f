use thiserror::Error;

pub type AppResult<T> = Result<T, DomainError>;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed frame or command; the session replies and closes
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Target file absent for GET/DELETE
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Peer closed or I/O failed mid-transfer. Quota rejections and the
    /// blocked-client path are not errors here: they surface as
    /// `Admission::Rejected` and the dispatcher's forbidden reply.
    #[error("connection broken: {0}")]
    ConnectionBroken(String),

    #[error("unknown client: {0}")]
    UnknownClient(String),

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigErrorKind {
    #[error("missing environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid environment variable {0}: {1}")]
    InvalidEnv(String, String),
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("invalid configuration: {source}")]
    Config {
        #[source]
        source: ConfigErrorKind,
    },

    #[error("network issue: {0}")]
    Net(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
