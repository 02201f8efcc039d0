//! Connection handler
//!
//! Frames one TCP stream into request lines, hands each line to the session,
//! and writes back the response followed by a new prompt. Exactly one request
//! is in flight per connection: the next line is not read until the previous
//! response has been written.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};

use super::events::ServerEvent;
use super::protocol::{
    decode_request, encode_response, protocol_error_line, session_id_line,
    strip_line_terminator, Command, ProtocolError, BYE, MAX_LINE_BYTES,
};
use super::registry::{SessionGuard, SessionRegistry};
use super::session::{Session, SessionId};
use crate::evaluator::Evaluator;

/// Everything a connection needs from the server that accepted it
pub struct ConnectionContext {
    pub evaluator: Arc<dyn Evaluator>,
    pub registry: Arc<SessionRegistry>,
    pub events: broadcast::Sender<ServerEvent>,
    pub prompt: String,
    pub banner: String,
    pub eval_timeout: Duration,
}

/// Result of reading one request line
enum LineRead {
    Line(String),
    TooLong,
    Eof,
}

/// Whether the connection continues after a request
enum Flow {
    Continue,
    Close,
}

/// Handle a single accepted connection until the client leaves or the server
/// stops. Errors are logged here and never propagate to the accept loop.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let id = SessionId::new();
    let guard = SessionGuard::register(
        Arc::clone(&ctx.registry),
        ctx.events.clone(),
        id,
        peer,
    );
    tracing::info!("Session {} opened from {}", id, peer);

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
    }

    let (read_half, write_half) = stream.into_split();
    let mut conn = Connection {
        reader: BufReader::new(read_half),
        writer: BufWriter::new(write_half),
        session: Session::new(id, Arc::clone(&ctx.evaluator), ctx.eval_timeout),
        ctx,
    };

    if *shutdown.borrow_and_update() {
        tracing::debug!("Session {} closed before greeting: server stopping", id);
    } else {
        match conn.run(&mut shutdown).await {
            Ok(()) => {}
            Err(e) => tracing::warn!("Session {} I/O error: {}", id, e),
        }
    }

    conn.close().await;
    drop(guard);
    tracing::info!("Session {} closed", id);
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    session: Session,
    ctx: Arc<ConnectionContext>,
}

impl Connection {
    async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> std::io::Result<()> {
        if !self.ctx.banner.is_empty() {
            let banner = self.ctx.banner.clone();
            self.write_line(&banner).await?;
        }
        self.prompt().await?;

        let mut buf = Vec::with_capacity(256);
        loop {
            let read = tokio::select! {
                _ = shutdown.changed() => {
                    tracing::debug!("Session {} closing: server stopping", self.session.id());
                    return Ok(());
                }
                read = self.read_line(&mut buf) => read?,
            };

            let line = match read {
                LineRead::Line(line) => line,
                LineRead::TooLong => {
                    let err = ProtocolError::LineTooLong {
                        limit: MAX_LINE_BYTES,
                    };
                    self.write_line(&protocol_error_line(&err)).await?;
                    self.prompt().await?;
                    continue;
                }
                LineRead::Eof => {
                    tracing::debug!("Session {} reached end of stream", self.session.id());
                    return Ok(());
                }
            };

            let flow = tokio::select! {
                _ = shutdown.changed() => {
                    tracing::debug!("Session {} interrupted: server stopping", self.session.id());
                    return Ok(());
                }
                flow = self.respond(&line) => flow?,
            };
            if let Flow::Close = flow {
                return Ok(());
            }
        }
    }

    /// Process one request line and write its response and the next prompt
    async fn respond(&mut self, line: &str) -> std::io::Result<Flow> {
        match Command::parse(line) {
            Command::Empty => {}
            Command::Quit => {
                self.write_line(BYE).await?;
                return Ok(Flow::Close);
            }
            Command::SessionId => {
                let reply = session_id_line(&self.session.id().to_string());
                self.write_line(&reply).await?;
            }
            Command::Message(payload) => {
                let reply = match decode_request(payload) {
                    Ok(request) => {
                        let response = self.session.process_message(&request).await;
                        encode_response(&response)
                    }
                    Err(e) => Err(e),
                };
                let reply = reply.unwrap_or_else(|e| {
                    tracing::warn!("Session {}: bad message: {}", self.session.id(), e);
                    protocol_error_line(&e)
                });
                self.write_line(&reply).await?;
            }
            Command::Eval(source) => {
                let reply = self.session.eval_line(source).await;
                self.write_line(&reply).await?;
            }
        }
        self.prompt().await?;
        Ok(Flow::Continue)
    }

    /// Read up to the next newline, bounded by `MAX_LINE_BYTES`
    ///
    /// A partial line at end of stream never completes and is dropped.
    async fn read_line(&mut self, buf: &mut Vec<u8>) -> std::io::Result<LineRead> {
        buf.clear();
        let limit = MAX_LINE_BYTES as u64 + 2;
        let n = (&mut self.reader).take(limit).read_until(b'\n', buf).await?;
        if n == 0 {
            return Ok(LineRead::Eof);
        }
        if buf.last() != Some(&b'\n') {
            if (n as u64) < limit {
                return Ok(LineRead::Eof);
            }
            self.discard_rest_of_line().await?;
            return Ok(LineRead::TooLong);
        }

        let text = String::from_utf8_lossy(buf);
        let line = strip_line_terminator(&text);
        if line.len() > MAX_LINE_BYTES {
            return Ok(LineRead::TooLong);
        }
        Ok(LineRead::Line(line.to_string()))
    }

    async fn discard_rest_of_line(&mut self) -> std::io::Result<()> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(());
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.reader.consume(pos + 1);
                    return Ok(());
                }
                None => {
                    let len = available.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    async fn prompt(&mut self) -> std::io::Result<()> {
        self.writer.write_all(self.ctx.prompt.as_bytes()).await?;
        self.writer.flush().await
    }

    /// Best-effort close; errors are logged, not returned
    async fn close(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!("Session {} shutdown error: {}", self.session.id(), e);
        }
    }
}
