use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The node reported a state in which commands are unreliable. Distinct
    /// from lock contention so callers can apply a different backoff.
    #[error("node is not ready")]
    NodeNotReady,

    #[error("invalid command parameter: {0}")]
    InvalidParameter(String),

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),
}
