use log::{debug, info};
use shared::{clean_input, QUIT_COMMAND};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

pub struct ChatClient {
    stream: TcpStream,
    server_addr: SocketAddr,
}

impl ChatClient {
    pub async fn connect(server_addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(server_addr).await?;
        let server_addr = stream.peer_addr()?;
        info!("Connected to {}", server_addr);
        Ok(ChatClient {
            stream,
            server_addr,
        })
    }

    /// Local address of the connection, which is the name the server uses
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Runs the session until the server closes the connection
    ///
    /// Returns the number of bytes received from the server.
    pub async fn run<I, O>(self, input: I, mut output: O) -> io::Result<u64>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let (mut reader, writer) = self.stream.into_split();

        let forward = forward_lines(input, writer);
        let receive = tokio::io::copy(&mut reader, &mut output);
        tokio::pin!(forward);
        tokio::pin!(receive);

        let mut forwarding = true;
        loop {
            tokio::select! {
                result = &mut forward, if forwarding => {
                    result?;
                    forwarding = false;
                }
                result = &mut receive => {
                    let received = result?;
                    info!("Server at {} closed the connection", self.server_addr);
                    return Ok(received);
                }
            }
        }
    }
}

/// Sends input lines until input ends or the user quits, then half-closes
async fn forward_lines<I>(input: I, mut writer: OwnedWriteHalf) -> io::Result<()>
where
    I: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;

        if clean_input(&line) == QUIT_COMMAND {
            debug!("Quit sent, no further input is forwarded");
            break;
        }
    }
    writer.shutdown().await
}
