//! Bounded broadcast pipeline between connection workers and a single consumer
//!
//! Workers submit chat lines through [`Producer`] handles. The queue holds a
//! fixed number of messages; once it is full, `submit` waits for the consumer
//! to make room. That wait is the server's backpressure: a flooding client
//! stalls its own worker instead of growing memory without bound.

use crate::error::PipelineClosed;
use bytes::Bytes;
use log::info;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A chat line submitted by one connection
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    sender: String,
    payload: Bytes,
}

impl Message {
    pub fn new(sender: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            sender: sender.into(),
            payload: payload.into(),
        }
    }

    /// Address of the connection that produced the message
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// The line exactly as received, terminator excluded
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("sender", &self.sender)
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .finish()
    }
}

/// Receives every message the pipeline delivers
pub trait MessageSink: Send {
    fn deliver(&mut self, message: Message);
}

impl<F> MessageSink for F
where
    F: FnMut(Message) + Send,
{
    fn deliver(&mut self, message: Message) {
        self(message)
    }
}

/// Sink that writes each message to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MessageSink for LogSink {
    fn deliver(&mut self, message: Message) {
        info!(
            "received message from connection ({}): {}",
            message.sender(),
            String::from_utf8_lossy(message.payload())
        );
    }
}

/// Creates a pipeline holding at most `capacity` queued messages
///
/// A zero capacity is raised to one.
pub fn channel(capacity: usize) -> (BroadcastPipeline, PipelineConsumer) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let pipeline = BroadcastPipeline {
        sender: Arc::new(Mutex::new(Some(sender))),
    };
    (pipeline, PipelineConsumer { receiver })
}

/// Owning side of the pipeline, used to hand out producers and to close it
///
/// Closing drops the pipeline's own sender. The consumer finishes once the
/// queue is empty and every producer handed out earlier has been dropped,
/// which is why the server only closes after all workers have exited.
#[derive(Debug, Clone)]
pub struct BroadcastPipeline {
    sender: Arc<Mutex<Option<mpsc::Sender<Message>>>>,
}

impl BroadcastPipeline {
    /// Returns a new producer, or `None` once the pipeline is closed
    pub fn producer(&self) -> Option<Producer> {
        self.sender
            .lock()
            .as_ref()
            .map(|sender| Producer {
                sender: sender.clone(),
            })
    }

    /// Closes the pipeline; returns true only for the call that closed it
    pub fn close(&self) -> bool {
        let sender = self.sender.lock().take();
        match sender {
            Some(_) => {
                info!("Broadcast pipeline closed");
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Submitting handle held by one connection worker
#[derive(Debug, Clone)]
pub struct Producer {
    sender: mpsc::Sender<Message>,
}

impl Producer {
    /// Queues a message, waiting while the pipeline is full
    ///
    /// No timeout is applied: under sustained overload the caller waits as
    /// long as the consumer needs.
    pub async fn submit(&self, message: Message) -> Result<(), PipelineClosed> {
        self.sender.send(message).await.map_err(|_| PipelineClosed)
    }
}

/// The single consuming end of the pipeline
#[derive(Debug)]
pub struct PipelineConsumer {
    receiver: mpsc::Receiver<Message>,
}

impl PipelineConsumer {
    /// Delivers messages to `sink` in submission order until the pipeline
    /// closes, then returns how many were delivered
    pub async fn run<S: MessageSink>(mut self, mut sink: S) -> u64 {
        let mut delivered = 0;
        while let Some(message) = self.receiver.recv().await {
            sink.deliver(message);
            delivered += 1;
        }
        info!("Broadcast consumer finished after {} messages", delivered);
        delivered
    }
}
