use thiserror::Error;

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection left the Active state; nothing more may be written to it.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer stopped reading and a write could not complete in time.
    #[error("write timed out")]
    WriteTimeout,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("metric provider failed: {0}")]
    Provider(String),
}

impl ServerError {
    /// Peer went away: EOF surfaced as an error, reset, or broken pipe.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ServerError::ConnectionClosed | ServerError::WriteTimeout => true,
            ServerError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
