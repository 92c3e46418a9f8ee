//! Registry of live chat connections
//!
//! This module tracks every client that currently has a connection worker:
//! - Registration when a worker starts and removal when it terminates
//! - Display names used by the `/list` command
//! - Connection age for disconnect logging
//!
//! The registry owns its lock. Callers only ever see snapshots, so no code
//! outside this module can hold the lock across I/O or an await point.

use log::info;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Registry entry for one live connection
///
/// The socket itself is not stored here: it stays exclusively owned by the
/// connection worker, which is the only code that reads from or writes to it.
#[derive(Debug, Clone)]
pub struct Client {
    /// Peer address of the connection, unique among live entries
    pub address: String,
    /// Name shown by `/list`, initially the address
    pub display_name: String,
    /// When the worker registered this client
    pub connected_at: Instant,
}

impl Client {
    /// Creates an entry whose display name defaults to its address
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            display_name: address.clone(),
            address,
            connected_at: Instant::now(),
        }
    }

    /// Time elapsed since the client registered
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Thread-safe map from connection address to [`Client`]
///
/// Every operation takes the lock for a single map read or mutation and
/// releases it before logging. Operations on one key are linearizable;
/// operations on different keys are otherwise unordered.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, Client>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under its address
    ///
    /// An existing entry for the same address is replaced (last write wins)
    /// and returned. Live sockets always have distinct addresses, so a
    /// replacement only happens if a caller reuses an address on purpose.
    pub fn register(&self, address: &str) -> Option<Client> {
        let client = Client::new(address);
        let (previous, active) = {
            let mut clients = self.clients.lock();
            let previous = clients.insert(address.to_string(), client);
            (previous, clients.len())
        };

        info!("Client connected: {} ({} active)", address, active);
        previous
    }

    /// Removes a connection, returning its entry if it was present
    ///
    /// Unregistering an unknown address is a no-op, which keeps worker
    /// teardown idempotent.
    pub fn unregister(&self, address: &str) -> Option<Client> {
        let (removed, active) = {
            let mut clients = self.clients.lock();
            let removed = clients.remove(address);
            (removed, clients.len())
        };

        if let Some(client) = &removed {
            info!(
                "Client disconnected: {} after {:.1?} ({} active)",
                address,
                client.connected_for(),
                active
            );
        }
        removed
    }

    /// Snapshot of every registered display name, in no particular order
    pub fn list_display_names(&self) -> Vec<String> {
        self.clients
            .lock()
            .values()
            .map(|client| client.display_name.clone())
            .collect()
    }

    /// Returns true if a connection is registered under `address`
    pub fn contains(&self, address: &str) -> bool {
        self.clients.lock().contains_key(address)
    }

    /// Returns the number of currently registered clients
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// Returns true if no clients are currently registered
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const ADDR1: &str = "127.0.0.1:50001";
    const ADDR2: &str = "127.0.0.1:50002";

    #[test]
    fn test_client_creation() {
        let client = Client::new(ADDR1);

        assert_eq!(client.address, ADDR1);
        assert_eq!(client.display_name, ADDR1);
        assert!(client.connected_for() < Duration::from_secs(5));
    }

    #[test]
    fn test_registry_creation() {
        let registry = ClientRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.list_display_names().is_empty());
    }

    #[test]
    fn test_register_client() {
        let registry = ClientRegistry::new();

        let previous = registry.register(ADDR1);
        assert!(previous.is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(ADDR1));
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_register_same_address_overwrites() {
        let registry = ClientRegistry::new();

        registry.register(ADDR1);
        let previous = registry.register(ADDR1);

        assert_eq!(previous.map(|c| c.address), Some(ADDR1.to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_display_names(), vec![ADDR1.to_string()]);
    }

    #[test]
    fn test_unregister_client() {
        let registry = ClientRegistry::new();
        registry.register(ADDR1);

        let removed = registry.unregister(ADDR1);
        assert_eq!(removed.map(|c| c.address), Some(ADDR1.to_string()));
        assert!(registry.is_empty());
        assert!(!registry.contains(ADDR1));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ClientRegistry::new();
        registry.register(ADDR1);

        assert!(registry.unregister(ADDR2).is_none());
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(ADDR1).is_some());
        assert!(registry.unregister(ADDR1).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_list_display_names_is_snapshot() {
        let registry = ClientRegistry::new();
        registry.register(ADDR1);
        registry.register(ADDR2);

        let mut names = registry.list_display_names();
        registry.unregister(ADDR1);

        names.sort();
        assert_eq!(names, vec![ADDR1.to_string(), ADDR2.to_string()]);
        assert_eq!(registry.list_display_names(), vec![ADDR2.to_string()]);
    }

    #[test]
    fn test_concurrent_register_unregister() {
        let registry = Arc::new(ClientRegistry::new());
        let threads = 8;
        let per_thread = 250;

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..per_thread {
                        let address = format!("10.0.{}.{}:9000", t, i);
                        registry.register(&address);
                        // Drop every other registration again
                        if i % 2 == 0 {
                            registry.unregister(&address);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), threads * per_thread / 2);
        for t in 0..threads {
            assert!(!registry.contains(&format!("10.0.{}.0:9000", t)));
            assert!(registry.contains(&format!("10.0.{}.1:9000", t)));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tasks_see_consistent_snapshots() {
        let registry = Arc::new(ClientRegistry::new());

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let address = format!("192.168.0.{}:1234", i);
                    registry.register(&address);
                    let names = registry.list_display_names();
                    assert!(names.contains(&address));
                    tokio::task::yield_now().await;
                    registry.unregister(&address);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert!(registry.is_empty());
    }
}
