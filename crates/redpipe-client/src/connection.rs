//! Connection actor.
//!
//! Each actor owns exactly one TCP connection for its whole life: it dials,
//! walks the configured setup commands, announces readiness to its pool,
//! then pipelines application commands and correlates replies in strict
//! FIFO order. On any fault (connect failure, decode error, correlation
//! violation, setup rejection) the actor terminates, fails its pending
//! requests with [`RedpipeError::ConnectionLost`], and leaves re-creation
//! to the pool; an actor never reconnects itself.
//!
//! # Pipelining
//!
//! A request is written to the socket and enqueued at the tail of the
//! pending FIFO in one step; each decoded reply is matched against the
//! head. A reply with an empty FIFO is a protocol violation and kills the
//! connection. A caller that gave up waiting has dropped its reply channel,
//! so delivering the late reply fails silently and ordering is preserved.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::BytesMut;
use redpipe_common::codec::{encode_command, ReplyDecoder};
use redpipe_common::{Command, RespValue};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{RedpipeError, Result};

/// Identifier the pool assigns to each connection it creates.
pub type ChildId = u64;

/// Outcome delivered for one executed command: the command itself paired
/// with the reply that was correlated to it.
pub type ExecuteOutcome = Result<(Command, RespValue)>;

/// Requests a connection actor accepts from its pool.
pub enum ConnectionRequest {
    /// Send `command` and deliver the correlated reply.
    Execute {
        command: Command,
        reply: oneshot::Sender<ExecuteOutcome>,
    },
    /// Send a `ConnectionClose`-tagged command; resolve when the peer
    /// closes the socket.
    ExecuteClose {
        command: Command,
        done: oneshot::Sender<Result<()>>,
    },
}

/// Notifications a connection actor sends its supervising pool.
pub enum ConnectionEvent {
    /// Setup finished; the actor is serving requests.
    Ready { id: ChildId },
    /// The actor stopped, cleanly or not.
    Terminated { id: ChildId, cause: String },
}

/// What the pool keeps per child: the mailbox plus the task handle it
/// observes (and, past the readiness deadline, aborts).
pub struct ConnectionHandle {
    pub sender: mpsc::Sender<ConnectionRequest>,
    pub task: JoinHandle<()>,
}

/// Spawns connection actors on behalf of the pool.
///
/// The pool depends only on this trait, so tests can substitute scripted
/// children and drive the supervisor through arbitrary failure schedules.
pub trait ConnectionFactory: Send + Sync + 'static {
    fn spawn(&self, id: ChildId, events: mpsc::UnboundedSender<ConnectionEvent>) -> ConnectionHandle;
}

/// Default factory: dials `addr` over TCP and runs the configured setup
/// commands before the child reports ready.
pub struct TcpConnectionFactory {
    addr: String,
    connect_timeout: Duration,
    setup_commands: Vec<Command>,
    mailbox_capacity: usize,
}

impl TcpConnectionFactory {
    pub fn new(addr: String, connect_timeout: Duration, setup_commands: Vec<Command>) -> Self {
        Self {
            addr,
            connect_timeout,
            setup_commands,
            mailbox_capacity: 1024,
        }
    }
}

impl ConnectionFactory for TcpConnectionFactory {
    fn spawn(&self, id: ChildId, events: mpsc::UnboundedSender<ConnectionEvent>) -> ConnectionHandle {
        let (sender, mailbox) = mpsc::channel(self.mailbox_capacity);
        let actor = ConnectionActor {
            id,
            addr: self.addr.clone(),
            connect_timeout: self.connect_timeout,
            setup_commands: self.setup_commands.clone(),
            mailbox,
            events,
            decoder: ReplyDecoder::new(),
            inbound: VecDeque::new(),
            pending: VecDeque::new(),
            close_waiter: None,
        };
        let task = tokio::spawn(actor.run());
        ConnectionHandle { sender, task }
    }
}

struct ConnectionActor {
    id: ChildId,
    addr: String,
    connect_timeout: Duration,
    setup_commands: Vec<Command>,
    mailbox: mpsc::Receiver<ConnectionRequest>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    decoder: ReplyDecoder,
    /// Replies decoded but not yet correlated.
    inbound: VecDeque<RespValue>,
    /// In-flight requests, strictly oldest-first.
    pending: VecDeque<(Command, oneshot::Sender<ExecuteOutcome>)>,
    /// Present once a connection-close command has been written.
    close_waiter: Option<oneshot::Sender<Result<()>>>,
}

impl ConnectionActor {
    async fn run(mut self) {
        let cause = match self.serve().await {
            Ok(()) => {
                debug!(connection = self.id, "connection actor stopped");
                "connection closed".to_string()
            }
            Err(err) => {
                warn!(connection = self.id, error = %err, "connection actor failed");
                err.to_string()
            }
        };
        self.settle_leftovers(&cause);
        let _ = self.events.send(ConnectionEvent::Terminated { id: self.id, cause });
    }

    async fn serve(&mut self) -> Result<()> {
        debug!(connection = self.id, addr = %self.addr, "connecting");
        let stream = match timeout(self.connect_timeout, TcpStream::connect(self.addr.as_str())).await {
            Err(_) => {
                return Err(RedpipeError::ConnectionLost {
                    cause: format!("connect timed out after {:?}", self.connect_timeout),
                })
            }
            Ok(Err(err)) => {
                return Err(RedpipeError::ConnectionLost {
                    cause: format!("connect failed: {}", err),
                })
            }
            Ok(Ok(stream)) => stream,
        };

        let (mut reader, mut writer) = stream.into_split();
        self.run_setup(&mut reader, &mut writer).await?;

        info!(connection = self.id, addr = %self.addr, "connection ready");
        let _ = self.events.send(ConnectionEvent::Ready { id: self.id });

        let mut read_buf = BytesMut::with_capacity(16 * 1024);
        loop {
            tokio::select! {
                request = self.mailbox.recv(), if self.close_waiter.is_none() => {
                    match request {
                        Some(request) => self.dispatch(request, &mut writer).await?,
                        // The pool released this connection.
                        None => return Ok(()),
                    }
                }
                read = reader.read_buf(&mut read_buf) => {
                    let n = read.map_err(|err| RedpipeError::ConnectionLost {
                        cause: format!("read failed: {}", err),
                    })?;
                    if n == 0 {
                        return self.handle_eof();
                    }
                    let chunk = read_buf.split();
                    self.correlate_chunk(&chunk)?;
                }
            }
        }
    }

    /// Writes one command and records who is waiting for what.
    async fn dispatch(&mut self, request: ConnectionRequest, writer: &mut OwnedWriteHalf) -> Result<()> {
        let mut frame = BytesMut::new();
        match request {
            ConnectionRequest::Execute { command, reply } => {
                encode_command(&command, &mut frame);
                debug!(connection = self.id, command = %command.name(), "sending command");
                self.pending.push_back((command, reply));
            }
            ConnectionRequest::ExecuteClose { command, done } => {
                encode_command(&command, &mut frame);
                debug!(connection = self.id, command = %command.name(), "sending connection-close command");
                self.close_waiter = Some(done);
            }
        }
        writer.write_all(&frame).await.map_err(|err| RedpipeError::ConnectionLost {
            cause: format!("write failed: {}", err),
        })
    }

    /// Feeds one chunk to the decoder and matches every completed reply
    /// against the pending FIFO head.
    fn correlate_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let Self { decoder, inbound, .. } = self;
        decoder.feed(chunk, |value| inbound.push_back(value))?;
        while let Some(value) = self.inbound.pop_front() {
            match self.pending.pop_front() {
                Some((command, reply)) => {
                    // A send failure means the caller stopped waiting; the
                    // late reply is discarded and the FIFO stays aligned.
                    let _ = reply.send(Ok((command, value)));
                }
                None => {
                    return Err(RedpipeError::ConnectionLost {
                        cause: format!("unexpected {} reply with no pending request", value.kind()),
                    })
                }
            }
        }
        Ok(())
    }

    /// Peer closed the socket: expected during connection-close, fatal
    /// otherwise.
    fn handle_eof(&mut self) -> Result<()> {
        match self.close_waiter.take() {
            Some(done) => {
                debug!(connection = self.id, "peer closed connection as requested");
                let _ = done.send(Ok(()));
                Ok(())
            }
            None => Err(RedpipeError::ConnectionLost {
                cause: "connection reset by peer".to_string(),
            }),
        }
    }

    /// Walks the ordered setup command list; any reply that misses the
    /// command's expectation aborts bring-up.
    async fn run_setup(&mut self, reader: &mut OwnedReadHalf, writer: &mut OwnedWriteHalf) -> Result<()> {
        if self.setup_commands.is_empty() {
            return Ok(());
        }
        debug!(connection = self.id, count = self.setup_commands.len(), "running setup commands");
        let setup = std::mem::take(&mut self.setup_commands);
        let mut read_buf = BytesMut::with_capacity(1024);
        for command in setup {
            let mut frame = BytesMut::new();
            encode_command(&command, &mut frame);
            writer.write_all(&frame).await.map_err(|err| RedpipeError::ConnectionLost {
                cause: format!("write failed during setup: {}", err),
            })?;
            let reply = self.next_setup_reply(reader, &mut read_buf).await?;
            if !command.expectation().is_satisfied_by(&reply) {
                return Err(RedpipeError::SetupFailed { command, reply });
            }
        }
        Ok(())
    }

    async fn next_setup_reply(&mut self, reader: &mut OwnedReadHalf, read_buf: &mut BytesMut) -> Result<RespValue> {
        loop {
            if let Some(value) = self.inbound.pop_front() {
                return Ok(value);
            }
            let n = reader.read_buf(read_buf).await.map_err(|err| RedpipeError::ConnectionLost {
                cause: format!("read failed during setup: {}", err),
            })?;
            if n == 0 {
                return Err(RedpipeError::ConnectionLost {
                    cause: "connection closed during setup".to_string(),
                });
            }
            let chunk = read_buf.split();
            let Self { decoder, inbound, .. } = self;
            decoder.feed(&chunk, |value| inbound.push_back(value))?;
        }
    }

    /// Fails everything still waiting on this connection: the close
    /// waiter, the pending FIFO, and any requests stranded in the mailbox.
    fn settle_leftovers(&mut self, cause: &str) {
        if let Some(done) = self.close_waiter.take() {
            let _ = done.send(Err(RedpipeError::ConnectionLost {
                cause: cause.to_string(),
            }));
        }
        for (command, reply) in self.pending.drain(..) {
            debug!(connection = self.id, command = %command.name(), "failing pending request");
            let _ = reply.send(Err(RedpipeError::ConnectionLost {
                cause: cause.to_string(),
            }));
        }
        self.mailbox.close();
        while let Ok(request) = self.mailbox.try_recv() {
            match request {
                ConnectionRequest::Execute { reply, .. } => {
                    let _ = reply.send(Err(RedpipeError::ConnectionLost {
                        cause: cause.to_string(),
                    }));
                }
                ConnectionRequest::ExecuteClose { done, .. } => {
                    let _ = done.send(Err(RedpipeError::ConnectionLost {
                        cause: cause.to_string(),
                    }));
                }
            }
        }
    }
}
