use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("connection is shut down")]
    Shutdown,

    #[error("frame too large: {size} bytes (max {max} bytes)")]
    FrameTooLarge { size: usize, max: usize },
}

impl RpcError {
    /// True for errors that mean the peer went away rather than that
    /// something was malformed. Serve loops treat these as a clean end of
    /// stream.
    pub fn is_disconnect(&self) -> bool {
        match self {
            RpcError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            RpcError::Shutdown => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
