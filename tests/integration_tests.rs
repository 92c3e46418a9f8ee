//! Integration tests for the chat server and client
//!
//! These tests run real TCP sessions against a server bound to an
//! ephemeral port.

use client::network::ChatClient;
use parking_lot::Mutex;
use server::pipeline::Message;
use server::shutdown::ShutdownHandle;
use server::{ChatServer, ServerConfig, ServerError, ShutdownReport};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

struct RunningServer {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    task: JoinHandle<Result<ShutdownReport, ServerError>>,
    received: Arc<Mutex<Vec<Message>>>,
}

impl RunningServer {
    async fn start(config: ServerConfig) -> Self {
        let server = ChatServer::bind(config).await.expect("bind should succeed");
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();

        let received = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&received);
        let task = tokio::spawn(server.start(move |message: Message| store.lock().push(message)));

        Self {
            addr,
            shutdown,
            task,
            received,
        }
    }

    async fn with_defaults() -> Self {
        Self::start(ServerConfig::new("127.0.0.1:0")).await
    }

    async fn stop(self) -> (ShutdownReport, Vec<Message>) {
        self.shutdown.trigger();
        let report = timeout(IO_TIMEOUT, self.task)
            .await
            .expect("server should finish draining")
            .unwrap()
            .unwrap();
        let received = self.received.lock().clone();
        (report, received)
    }
}

/// A raw TCP chat session that has already consumed its welcome line
struct Session {
    stream: TcpStream,
    address: String,
}

impl Session {
    async fn open(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let address = stream.local_addr().unwrap().to_string();
        let mut session = Self { stream, address };
        let welcome = shared::welcome(&session.address);
        session.expect(&welcome).await;
        session
    }

    async fn send(&mut self, line: &str) {
        self.stream.write_all(line.as_bytes()).await.unwrap();
    }

    async fn read_exactly(&mut self, len: usize) -> String {
        let mut buffer = vec![0u8; len];
        timeout(IO_TIMEOUT, self.stream.read_exact(&mut buffer))
            .await
            .expect("reply should arrive in time")
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    async fn expect(&mut self, reply: &str) {
        let actual = self.read_exactly(reply.len()).await;
        assert_eq!(actual, reply);
    }

    /// Waits for the server to hang up; a reset counts as hanging up
    async fn expect_closed(&mut self) {
        let mut byte = [0u8; 1];
        let read = timeout(IO_TIMEOUT, self.stream.read(&mut byte))
            .await
            .expect("server should close the connection");
        assert!(matches!(read, Ok(0) | Err(_)), "unexpected data: {:?}", read);
    }

    /// Reads a `/list` reply naming exactly `expected`, in any order
    async fn expect_list(&mut self, expected: &[&str]) {
        let names: Vec<String> = expected.iter().map(|name| name.to_string()).collect();
        let reply = self.read_exactly(shared::client_list(&names).len()).await;

        let mut lines = reply.split("\r\n");
        assert_eq!(
            lines.next(),
            Some(format!("[Server]: {} clients connected:", expected.len()).as_str())
        );
        let mut listed: Vec<&str> = lines.filter(|line| !line.is_empty()).collect();
        let mut expected = expected.to_vec();
        listed.sort();
        expected.sort();
        assert_eq!(listed, expected);
    }
}

/// CHAT PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// A plain line is acknowledged and reaches the consumer exactly once
    #[tokio::test]
    async fn message_is_acknowledged_and_delivered() {
        let server = RunningServer::with_defaults().await;
        let mut alice = Session::open(server.addr).await;

        alice.send("hello\n").await;
        alice.expect(&shared::acknowledgement(&alice.address)).await;

        let address = alice.address.clone();
        drop(alice);
        let (report, received) = server.stop().await;

        assert_eq!(report.messages_delivered, 1);
        assert_eq!(received, vec![Message::new(address, "hello")]);
    }

    /// `/list` reports every connected client, including the caller
    #[tokio::test]
    async fn list_reports_all_clients() {
        let server = RunningServer::with_defaults().await;
        let mut alice = Session::open(server.addr).await;
        let bob = Session::open(server.addr).await;

        let names = [alice.address.clone(), bob.address.clone()];
        alice.send("/list\n").await;
        alice.expect_list(&[names[0].as_str(), names[1].as_str()]).await;

        drop(alice);
        drop(bob);
        let (_, received) = server.stop().await;
        assert!(received.is_empty());
    }

    /// `/quit` says goodbye, closes, and removes the client from the list
    #[tokio::test]
    async fn quit_closes_and_unregisters() {
        let server = RunningServer::with_defaults().await;
        let mut alice = Session::open(server.addr).await;
        let mut bob = Session::open(server.addr).await;

        alice.send("/quit\n").await;
        alice.expect(&shared::goodbye(&alice.address)).await;
        alice.expect_closed().await;

        let bob_address = bob.address.clone();
        bob.send("/list\n").await;
        bob.expect_list(&[bob_address.as_str()]).await;

        drop(bob);
        server.stop().await;
    }

    /// Commands are matched after CRLF stripping, backspaces and trimming
    #[tokio::test]
    async fn edited_command_lines_are_recognised() {
        let server = RunningServer::with_defaults().await;
        let mut alice = Session::open(server.addr).await;

        let address = alice.address.clone();
        alice.send("  /lisz\x08t\r\n").await;
        alice.expect_list(&[address.as_str()]).await;

        alice.send("/quit \r\n").await;
        alice.expect(&shared::goodbye(&alice.address)).await;
        alice.expect_closed().await;

        let (report, received) = server.stop().await;
        assert_eq!(report.messages_delivered, 0);
        assert!(received.is_empty());
    }

    /// Broadcast payloads keep their original bytes
    #[tokio::test]
    async fn broadcast_keeps_raw_line() {
        let server = RunningServer::with_defaults().await;
        let mut alice = Session::open(server.addr).await;

        alice.send("  /LIST \r\n").await;
        alice.expect(&shared::acknowledgement(&alice.address)).await;

        drop(alice);
        let (_, received) = server.stop().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload().as_ref(), b"  /LIST ");
    }

    /// A line split across several writes is handled as one line
    #[tokio::test]
    async fn fragmented_line_is_reassembled() {
        let server = RunningServer::with_defaults().await;
        let mut alice = Session::open(server.addr).await;

        alice.send("frag").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        alice.send("mented\n").await;
        alice.expect(&shared::acknowledgement(&alice.address)).await;

        drop(alice);
        let (_, received) = server.stop().await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].payload().as_ref(), b"fragmented");
    }

    /// An over-long line ends only that connection
    #[tokio::test]
    async fn overlong_line_closes_only_that_connection() {
        let config = ServerConfig::new("127.0.0.1:0").with_max_line_length(16);
        let server = RunningServer::start(config).await;
        let mut alice = Session::open(server.addr).await;
        let mut bob = Session::open(server.addr).await;

        alice.send(&"x".repeat(64)).await;
        alice.expect_closed().await;

        bob.send("still here\n").await;
        bob.expect(&shared::acknowledgement(&bob.address)).await;

        drop(bob);
        let (_, received) = server.stop().await;
        assert_eq!(received.len(), 1);
    }
}

/// SHUTDOWN TESTS
mod shutdown_tests {
    use super::*;

    /// Shutdown waits for live clients and still delivers their messages
    #[tokio::test]
    async fn shutdown_drains_connected_clients() {
        let server = RunningServer::with_defaults().await;
        let mut alice = Session::open(server.addr).await;

        server.shutdown.trigger();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!server.task.is_finished());

        // The worker keeps serving while the server drains
        alice.send("late message\n").await;
        alice.expect(&shared::acknowledgement(&alice.address)).await;
        alice.send("/quit\n").await;
        alice.expect(&shared::goodbye(&alice.address)).await;

        let (report, received) = server.stop().await;
        assert_eq!(
            report,
            ShutdownReport {
                connections_accepted: 1,
                messages_delivered: 1,
                pipeline_closed_here: true,
            }
        );
        assert_eq!(received[0].payload().as_ref(), b"late message");
    }

    /// Once shutdown has completed the listener is gone
    #[tokio::test]
    async fn connections_refused_after_shutdown() {
        let server = RunningServer::with_defaults().await;
        let addr = server.addr;

        let (report, _) = server.stop().await;
        assert_eq!(report.connections_accepted, 0);

        assert!(TcpStream::connect(addr).await.is_err());
    }

    /// A slow consumer makes clients wait but loses nothing
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn backpressure_loses_no_messages() {
        let config = ServerConfig::new("127.0.0.1:0").with_pipeline_capacity(1);
        let server = ChatServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();

        let received = Arc::new(Mutex::new(Vec::new()));
        let store = Arc::clone(&received);
        let task = tokio::spawn(server.start(move |message: Message| {
            std::thread::sleep(Duration::from_millis(5));
            store.lock().push(message);
        }));

        let mut alice = Session::open(addr).await;
        for i in 0..20 {
            alice.send(&format!("message {}\n", i)).await;
        }
        for _ in 0..20 {
            alice.expect(&shared::acknowledgement(&alice.address)).await;
        }
        drop(alice);

        shutdown.trigger();
        let report = timeout(IO_TIMEOUT, task).await.unwrap().unwrap().unwrap();
        assert_eq!(report.messages_delivered, 20);

        let received = received.lock();
        for (i, message) in received.iter().enumerate() {
            assert_eq!(message.payload().as_ref(), format!("message {}", i).as_bytes());
        }
    }
}

/// CLIENT BINARY TESTS
mod client_tests {
    use super::*;

    /// The client relays replies and stops after `/quit`
    #[tokio::test]
    async fn client_session_against_server() {
        let server = RunningServer::with_defaults().await;
        let client = ChatClient::connect(&server.addr.to_string()).await.unwrap();
        let address = client.local_addr().unwrap().to_string();

        let mut output = Vec::new();
        let input = &b"hello\n/list\n/quit\nignored\n"[..];
        timeout(IO_TIMEOUT, client.run(input, &mut output))
            .await
            .expect("client should exit after the server closes")
            .unwrap();

        let expected = [
            shared::welcome(&address),
            shared::acknowledgement(&address),
            shared::client_list(&[address.clone()]),
            shared::goodbye(&address),
        ]
        .concat();
        assert_eq!(String::from_utf8(output).unwrap(), expected);

        let (_, received) = server.stop().await;
        assert_eq!(received, vec![Message::new(address, "hello")]);
    }
}

/// STRESS TESTS
mod stress_tests {
    use super::*;

    /// Many clients chatting at once: no loss, per-client order preserved
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_clients_keep_per_client_order() {
        let server = RunningServer::with_defaults().await;
        let clients = 16;
        let per_client = 25;

        let sessions: Vec<_> = (0..clients)
            .map(|_| {
                let addr = server.addr;
                tokio::spawn(async move {
                    let mut session = Session::open(addr).await;
                    for i in 0..per_client {
                        session.send(&format!("{}\n", i)).await;
                        session
                            .expect(&shared::acknowledgement(&session.address))
                            .await;
                    }
                    session.send("/quit\n").await;
                    session.expect(&shared::goodbye(&session.address)).await;
                    session.address
                })
            })
            .collect();

        let mut addresses = Vec::new();
        for session in sessions {
            addresses.push(session.await.unwrap());
        }

        let (report, received) = server.stop().await;
        assert_eq!(report.connections_accepted, clients as u64);
        assert_eq!(received.len(), clients * per_client);

        for address in addresses {
            let sequence: Vec<usize> = received
                .iter()
                .filter(|m| m.sender() == address)
                .map(|m| String::from_utf8_lossy(m.payload()).parse().unwrap())
                .collect();
            assert_eq!(sequence, (0..per_client).collect::<Vec<_>>());
        }
    }
}
