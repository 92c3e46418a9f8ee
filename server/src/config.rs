//! Server configuration

use crate::error::ServerError;
use tokio::sync::Semaphore;

pub use shared::codec::DEFAULT_MAX_LINE_LENGTH;

pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Number of messages the broadcast pipeline buffers before producers block
pub const DEFAULT_PIPELINE_CAPACITY: usize = 10;

/// Runtime settings for a [`ChatServer`](crate::network::ChatServer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to, e.g. `127.0.0.1:3000`
    pub listen_addr: String,
    /// Capacity of the bounded broadcast queue
    pub pipeline_capacity: usize,
    /// Longest accepted input line in bytes, terminator excluded
    pub max_line_length: usize,
    /// Maximum number of concurrent connections, unbounded when `None`
    pub max_clients: Option<usize>,
}

impl ServerConfig {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            ..Self::default()
        }
    }

    pub fn with_pipeline_capacity(mut self, capacity: usize) -> Self {
        self.pipeline_capacity = capacity;
        self
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn with_max_clients(mut self, max_clients: Option<usize>) -> Self {
        self.max_clients = max_clients;
        self
    }

    /// Rejects settings the server cannot run with
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.pipeline_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "pipeline capacity must be at least 1",
            ));
        }
        if self.max_line_length == 0 {
            return Err(ServerError::InvalidConfig(
                "max line length must be at least 1",
            ));
        }
        match self.max_clients {
            Some(0) => {
                return Err(ServerError::InvalidConfig("max clients must be at least 1"));
            }
            Some(n) if n > Semaphore::MAX_PERMITS => {
                return Err(ServerError::InvalidConfig("max clients is too large"));
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("{}:{}", DEFAULT_HOST, shared::DEFAULT_PORT),
            pipeline_capacity: DEFAULT_PIPELINE_CAPACITY,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_clients: None,
        }
    }
}
