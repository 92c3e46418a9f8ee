//! # Chat Server Library
//!
//! This library implements a multi-client, line-oriented TCP chat server.
//! Every connected client gets its own worker task; lines it sends are either
//! commands answered directly or chat messages funnelled into a bounded
//! broadcast pipeline with a single consumer.
//!
//! ## Core Responsibilities
//!
//! ### Connection Handling
//! Each accepted socket is served by a [`connection::ConnectionWorker`] that:
//! - Registers the client and greets it
//! - Frames the byte stream into lines
//! - Dispatches each line to a command
//! - Unregisters the client when the session ends, however it ends
//!
//! ### Commands
//! Lines are cleaned (backspaces applied, whitespace trimmed) and matched
//! exactly against a small command table:
//! - `/list` replies with the number and names of connected clients
//! - `/quit` says goodbye and closes the connection
//! - Anything else is broadcast and acknowledged
//!
//! ### Graceful Shutdown
//! Triggering shutdown stops the accept loop, waits for every live worker
//! to finish, then closes the pipeline so the consumer can drain it.
//!
//! ## Architecture Design
//!
//! ### Task per Connection
//! Workers are tokio tasks on the multi-threaded runtime. Workers share the
//! [`client_manager::ClientRegistry`], whose lock is never held across I/O.
//!
//! ### Restricted Handler View
//! Command handlers only see the [`commands::ServerApi`] trait: list client
//! names, and submit a broadcast. Sockets of other clients are unreachable.
//!
//! ### Backpressure
//! The pipeline is a bounded queue. When it is full, the submitting worker
//! waits, which in turn stops it reading from its socket.
//!
//! ## Module Organization
//!
//! - `client_manager`: registry of live connections
//! - `commands`: dispatch table and built-in handlers
//! - `config`: runtime settings and their defaults
//! - `connection`: the per-connection state machine
//! - `error`: error types
//! - `network`: listener, accept loop and server lifecycle
//! - `pipeline`: bounded broadcast queue and its consumer
//! - `shutdown`: shutdown signal, worker tracking and drain
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::ChatServer;
//! use server::pipeline::LogSink;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ChatServer::bind(ServerConfig::new("127.0.0.1:3000")).await?;
//!
//!     let shutdown = server.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.trigger();
//!     });
//!
//!     // Runs until Ctrl+C, then drains every client
//!     let report = server.start(LogSink).await?;
//!     println!("{} messages delivered", report.messages_delivered);
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod network;
pub mod pipeline;
pub mod shutdown;

pub use config::ServerConfig;
pub use error::{ConnectionError, PipelineClosed, ServerError};
pub use network::{ChatServer, ShutdownReport};
