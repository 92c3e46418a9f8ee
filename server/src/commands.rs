//! Command dispatch and the built-in command handlers
//!
//! A received line is cleaned (backspace editing, then trimming) and the
//! result is matched exactly against the dispatch table. Lines that match no
//! key fall through to [`Command::Broadcast`]. Handlers always receive the
//! original, uncleaned bytes.

use crate::error::{ConnectionError, PipelineClosed};
use crate::pipeline::Message;
use bytes::Bytes;
use log::{debug, info};
use shared::{acknowledgement, clean_input, client_list, goodbye, LIST_COMMAND, QUIT_COMMAND};
use std::collections::HashMap;
use std::future::Future;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The only view of the server that command handlers get
///
/// It exposes exactly two operations. Handlers cannot reach the
/// registry's lock, the raw connection map or other clients' sockets.
pub trait ServerApi: Send + Sync {
    /// Display names of all registered clients, in no particular order
    fn client_names(&self) -> Vec<String>;

    /// Queues a message on the broadcast pipeline, waiting while it is full
    fn broadcast(&self, message: Message) -> impl Future<Output = Result<(), PipelineClosed>> + Send;
}

/// What the worker should do with the connection after a command ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    KeepOpen,
    Close,
}

/// Built-in command handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Replies with the number and names of connected clients
    List,
    /// Says goodbye and closes the connection
    Quit,
    /// Broadcasts the line and acknowledges it
    Broadcast,
}

impl Command {
    pub async fn execute<A, W>(
        self,
        api: &A,
        conn: &mut W,
        address: &str,
        raw: &Bytes,
    ) -> Result<Outcome, ConnectionError>
    where
        A: ServerApi,
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            Command::List => {
                info!("Client {} requested list", address);
                let names = api.client_names();
                conn.write_all(client_list(&names).as_bytes()).await?;
                Ok(Outcome::KeepOpen)
            }
            Command::Quit => {
                info!("Client {} requested quit", address);
                conn.write_all(goodbye(address).as_bytes()).await?;
                Ok(Outcome::Close)
            }
            Command::Broadcast => {
                // Blocks here while the pipeline is full
                api.broadcast(Message::new(address, raw.clone())).await?;
                conn.write_all(acknowledgement(address).as_bytes()).await?;
                Ok(Outcome::KeepOpen)
            }
        }
    }
}

/// Maps cleaned input lines to commands
///
/// Built once at startup and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    commands: HashMap<String, Command>,
    fallback: Command,
}

impl Dispatcher {
    /// A dispatcher that sends every line to the broadcast fallback
    pub fn empty() -> Self {
        Self {
            commands: HashMap::new(),
            fallback: Command::Broadcast,
        }
    }

    /// Binds `key` to `command`, replacing any earlier binding
    pub fn register(&mut self, key: impl Into<String>, command: Command) {
        self.commands.insert(key.into(), command);
    }

    /// Picks the command for a raw line; matching is exact and case-sensitive
    pub fn resolve(&self, raw: &[u8]) -> Command {
        let key = clean_input(&String::from_utf8_lossy(raw));
        self.commands.get(&key).copied().unwrap_or(self.fallback)
    }

    pub async fn dispatch<A, W>(
        &self,
        api: &A,
        conn: &mut W,
        address: &str,
        raw: &Bytes,
    ) -> Result<Outcome, ConnectionError>
    where
        A: ServerApi,
        W: AsyncWrite + Unpin + Send,
    {
        let command = self.resolve(raw);
        debug!("{} -> {:?}", address, command);
        command.execute(api, conn, address, raw).await
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        let mut dispatcher = Self::empty();
        dispatcher.register(LIST_COMMAND, Command::List);
        dispatcher.register(QUIT_COMMAND, Command::Quit);
        dispatcher
    }
}
