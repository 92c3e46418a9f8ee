//! TCP front end of the chat server
//!
//! [`ChatServer`] binds the listener and owns the shared state. `start` runs
//! the accept loop until shutdown is triggered, waits for every connection
//! worker to finish, closes the broadcast pipeline and finally waits for the
//! consumer to deliver whatever was still queued.

use crate::client_manager::ClientRegistry;
use crate::commands::{Dispatcher, ServerApi};
use crate::config::ServerConfig;
use crate::connection::ConnectionWorker;
use crate::error::{PipelineClosed, ServerError};
use crate::pipeline::{self, BroadcastPipeline, Message, MessageSink, PipelineConsumer, Producer};
use crate::shutdown::{self, ShutdownCoordinator, ShutdownHandle, ShutdownListener, WorkerTracker};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Pause after a failed accept before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Summary returned by [`ChatServer::start`] once shutdown has completed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub connections_accepted: u64,
    pub messages_delivered: u64,
    /// Whether this server's drain was the one that closed the pipeline
    pub pipeline_closed_here: bool,
}

/// Capability view handed to command handlers
///
/// Each worker gets its own view holding its own pipeline producer.
pub struct ServerView {
    registry: Arc<ClientRegistry>,
    producer: Producer,
}

impl ServerApi for ServerView {
    fn client_names(&self) -> Vec<String> {
        self.registry.list_display_names()
    }

    async fn broadcast(&self, message: Message) -> Result<(), PipelineClosed> {
        self.producer.submit(message).await
    }
}

/// Multi-client line chat server
pub struct ChatServer {
    config: ServerConfig,
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<Dispatcher>,
    pipeline: BroadcastPipeline,
    consumer: PipelineConsumer,
    workers: WorkerTracker,
    shutdown: ShutdownHandle,
    shutdown_listener: ShutdownListener,
}

impl ChatServer {
    /// Validates `config` and binds the listening socket
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_dispatcher(config, Dispatcher::default()).await
    }

    /// Like [`bind`](Self::bind), with a custom command table
    pub async fn bind_with_dispatcher(
        config: ServerConfig,
        dispatcher: Dispatcher,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;
        info!("Chat server listening on {}", listener.local_addr()?);

        let (pipeline, consumer) = pipeline::channel(config.pipeline_capacity);
        let (shutdown, shutdown_listener) = shutdown::signal();

        Ok(Self {
            config,
            listener,
            registry: Arc::new(ClientRegistry::new()),
            dispatcher: Arc::new(dispatcher),
            pipeline,
            consumer,
            workers: WorkerTracker::new(),
            shutdown,
            shutdown_listener,
        })
    }

    /// Address the listener is bound to, useful when binding port 0
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle that triggers shutdown of this server
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serves clients until shutdown is triggered, then drains
    ///
    /// Every message accepted from a client has been handed to `sink` by the
    /// time this returns.
    pub async fn start<S>(self, sink: S) -> Result<ShutdownReport, ServerError>
    where
        S: MessageSink + 'static,
    {
        let ChatServer {
            config,
            listener,
            registry,
            dispatcher,
            pipeline,
            consumer,
            workers,
            // Held until the drain ends so the signal cannot fire by being dropped
            shutdown: _trigger,
            shutdown_listener,
        } = self;

        let consumer_task = tokio::spawn(consumer.run(sink));

        let accept_loop = AcceptLoop {
            listener,
            registry,
            dispatcher,
            pipeline: pipeline.clone(),
            workers: workers.clone(),
            max_line_length: config.max_line_length,
            slots: config.max_clients.map(|n| Arc::new(Semaphore::new(n))),
        };
        let accept_task = tokio::spawn(accept_loop.run(shutdown_listener));

        // Returns once the signal fired and the listener has been dropped
        let connections_accepted = accept_task.await?;

        let coordinator = ShutdownCoordinator::new(workers, pipeline);
        let pipeline_closed_here = coordinator.drain_and_close().await;

        let messages_delivered = consumer_task.await?;

        let report = ShutdownReport {
            connections_accepted,
            messages_delivered,
            pipeline_closed_here,
        };
        info!("Server stopped: {:?}", report);
        Ok(report)
    }
}

struct AcceptLoop {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<Dispatcher>,
    pipeline: BroadcastPipeline,
    workers: WorkerTracker,
    max_line_length: usize,
    slots: Option<Arc<Semaphore>>,
}

impl AcceptLoop {
    /// Accepts connections until shutdown; returns how many were accepted
    async fn run(self, mut shutdown: ShutdownListener) -> u64 {
        let mut accepted = 0;

        loop {
            let permit = match &self.slots {
                Some(slots) => tokio::select! {
                    permit = Arc::clone(slots).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => break,
                    },
                    _ = shutdown.wait() => break,
                },
                None => None,
            };

            tokio::select! {
                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        accepted += 1;
                        self.spawn_worker(stream, peer, permit);
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.wait() => break,
            }
        }

        info!("Stopped accepting connections after {} accepted", accepted);
        accepted
    }

    fn spawn_worker(&self, stream: TcpStream, peer: SocketAddr, permit: Option<OwnedSemaphorePermit>) {
        let address = peer.to_string();
        let Some(producer) = self.pipeline.producer() else {
            warn!("Pipeline closed, dropping connection from {}", address);
            return;
        };

        let guard = self.workers.enter();
        info!("Accepted connection from {}", address);

        let (reader, writer) = stream.into_split();
        let api = ServerView {
            registry: Arc::clone(&self.registry),
            producer,
        };
        let worker = ConnectionWorker::new(
            address.clone(),
            reader,
            writer,
            Arc::clone(&self.registry),
            Arc::clone(&self.dispatcher),
            api,
            self.max_line_length,
        );

        tokio::spawn(async move {
            // Released when the task ends, panics included
            let _guard = guard;
            let _permit = permit;
            if let Err(e) = worker.run().await {
                warn!("Connection {} closed with error: {}", address, e);
            }
        });
    }
}
