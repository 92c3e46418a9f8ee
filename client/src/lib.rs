//! # Chat Client Library
//!
//! A small terminal client for the line chat server. It connects over TCP,
//! forwards every line typed on stdin and prints whatever the server sends.
//!
//! ## Session Behavior
//!
//! Two halves run side by side:
//! - **Forwarding**: each input line is sent followed by `\n`. After a line
//!   that cleans to `/quit`, nothing more is sent. When input ends, or after
//!   `/quit`, the write half of the socket is shut down.
//! - **Receiving**: server bytes are copied to the output unchanged.
//!
//! The session ends when the server closes the connection, even if input is
//! still open.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::ChatClient;
//! use tokio::io::BufReader;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let client = ChatClient::connect("127.0.0.1:3000").await?;
//!     let stdin = BufReader::new(tokio::io::stdin());
//!     client.run(stdin, tokio::io::stdout()).await?;
//!     Ok(())
//! }
//! ```

pub mod network;
