//! Error types for the chat server

use shared::codec::CodecError;

/// Returned when a message is submitted after the broadcast pipeline closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("broadcast pipeline is closed")]
pub struct PipelineClosed;

/// Why a single connection worker stopped early
///
/// These never propagate past the worker: the connection is closed and
/// the rest of the server keeps running.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    PipelineClosed(#[from] PipelineClosed),
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
