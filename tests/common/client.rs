//! Line-oriented TCP client for driving a REPL server in tests

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use replserver::config::{DEFAULT_BANNER, DEFAULT_PROMPT};
use replserver::ReplServer;

use super::STEP_TIMEOUT;

pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    prompt: String,
}

impl TestClient {
    /// Connect, then consume the default banner and the first prompt
    pub async fn connect(addr: SocketAddr) -> Self {
        let mut client = Self::connect_raw(addr, DEFAULT_PROMPT).await;
        let banner = client.read_line().await.expect("Server closed before banner");
        assert_eq!(banner, DEFAULT_BANNER);
        client.expect_prompt().await;
        client
    }

    /// Connect to a running server's bound address
    pub async fn connect_to(server: &ReplServer) -> Self {
        Self::connect(server.local_addr().expect("Server is not running")).await
    }

    /// Connect without reading anything
    pub async fn connect_raw(addr: SocketAddr, prompt: &str) -> Self {
        let stream = timeout(STEP_TIMEOUT, TcpStream::connect(addr))
            .await
            .expect("Connect timed out")
            .expect("Failed to connect");
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            prompt: prompt.to_string(),
        }
    }

    /// Send one request line and return the response line
    ///
    /// The prompt that follows the response is consumed and checked.
    pub async fn eval(&mut self, line: &str) -> String {
        self.send_line(line).await;
        let response = self
            .read_line()
            .await
            .unwrap_or_else(|| panic!("Connection closed while waiting for reply to {:?}", line));
        self.expect_prompt().await;
        response
    }

    pub async fn send_line(&mut self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.send_raw(&bytes).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        timeout(STEP_TIMEOUT, self.writer.write_all(bytes))
            .await
            .expect("Write timed out")
            .expect("Failed to write");
    }

    /// Close the write side, as a client that is done sending
    pub async fn finish_writing(&mut self) {
        let _ = self.writer.shutdown().await;
    }

    /// Read one line without its terminator; `None` at end of stream
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = timeout(STEP_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("Read timed out")
            .ok()?;
        if n == 0 {
            return None;
        }
        let trimmed = line.strip_suffix('\n').unwrap_or(&line);
        Some(trimmed.strip_suffix('\r').unwrap_or(trimmed).to_string())
    }

    /// Read exactly the prompt bytes
    pub async fn expect_prompt(&mut self) {
        let mut buf = vec![0u8; self.prompt.len()];
        timeout(STEP_TIMEOUT, self.reader.read_exact(&mut buf))
            .await
            .expect("Prompt timed out")
            .expect("Connection closed before prompt");
        assert_eq!(String::from_utf8_lossy(&buf), self.prompt);
    }

    /// Wait until the server closes the connection
    ///
    /// Any bytes still in flight are drained first.
    pub async fn expect_closed(&mut self) {
        let mut buf = [0u8; 1024];
        loop {
            let read = timeout(STEP_TIMEOUT, self.reader.read(&mut buf))
                .await
                .expect("Connection was not closed in time");
            match read {
                Ok(0) | Err(_) => return,
                Ok(_) => continue,
            }
        }
    }
}
