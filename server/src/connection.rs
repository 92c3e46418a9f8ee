//! Per-connection worker
//!
//! A worker walks one connection through its lifecycle:
//!
//! 1. **Registering**: the address is added to the client registry
//! 2. **Greeting**: the welcome line is written
//! 3. **Awaiting line**: bytes are buffered until a full line arrives
//! 4. **Dispatching**: the line is resolved to a command and executed,
//!    then the worker returns to step 3 unless the command closed the
//!    connection
//! 5. **Closing**: the address is unregistered and the socket released
//!
//! Closing runs exactly once, whatever ended the session: `/quit`, the peer
//! hanging up, or a read/write failure. A failed read is never retried.

use crate::client_manager::ClientRegistry;
use crate::commands::{Dispatcher, Outcome, ServerApi};
use crate::error::ConnectionError;
use futures::StreamExt;
use log::{debug, info};
use shared::codec::LineCodec;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::FramedRead;

pub struct ConnectionWorker<R, W, A> {
    address: String,
    lines: FramedRead<R, LineCodec>,
    writer: W,
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<Dispatcher>,
    api: A,
}

impl<R, W, A> ConnectionWorker<R, W, A>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    A: ServerApi,
{
    pub fn new(
        address: impl Into<String>,
        reader: R,
        writer: W,
        registry: Arc<ClientRegistry>,
        dispatcher: Arc<Dispatcher>,
        api: A,
        max_line_length: usize,
    ) -> Self {
        Self {
            address: address.into(),
            lines: FramedRead::new(reader, LineCodec::with_max_length(max_line_length)),
            writer,
            registry,
            dispatcher,
            api,
        }
    }

    /// Runs the connection to completion
    ///
    /// The error, if any, describes why this one session ended early; it is
    /// not fatal to the server.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let registration = Registration::new(Arc::clone(&self.registry), &self.address);

        let result = self.serve().await;

        // Unregister before releasing the socket, so a peer that sees the
        // connection close can no longer be listed
        drop(registration);
        if let Err(e) = self.writer.shutdown().await {
            debug!("Shutdown of {} failed: {}", self.address, e);
        }
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        self.writer
            .write_all(shared::welcome(&self.address).as_bytes())
            .await?;

        while let Some(line) = self.lines.next().await {
            let line = line?;
            debug!("{} sent {} bytes", self.address, line.len());

            let outcome = self
                .dispatcher
                .dispatch(&self.api, &mut self.writer, &self.address, &line)
                .await?;
            if outcome == Outcome::Close {
                return Ok(());
            }
        }

        info!("Client {} closed the connection", self.address);
        Ok(())
    }
}

/// Keeps an address registered for as long as it lives
struct Registration {
    registry: Arc<ClientRegistry>,
    address: String,
}

impl Registration {
    fn new(registry: Arc<ClientRegistry>, address: &str) -> Self {
        registry.register(address);
        Self {
            registry,
            address: address.to_string(),
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.address);
    }
}
