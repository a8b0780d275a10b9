//! Client facade.
//!
//! [`RedpipeClient`] is the application-facing surface: it owns a pool of
//! pipelined connections and presents a single asynchronous
//! request/reply API over it. Each request resolves exactly once, with a
//! reply, a timeout, or a structured failure.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use redpipe_common::{Command, Expectation, RespValue};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::connection::{ConnectionFactory, TcpConnectionFactory};
use crate::error::{RedpipeError, Result};
use crate::pool::{PoolRequest, PoolSupervisor};

/// Client configuration.
///
/// Plain data with builder-style setters; all knobs have workable
/// defaults for a local server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host. Default: `127.0.0.1`
    pub host: String,
    /// Server port. Default: `6379`
    pub port: u16,
    /// TCP connect deadline per connection attempt. Default: 2 seconds
    pub connect_timeout: Duration,
    /// Deadline for each `execute` call. Default: 5 seconds
    pub request_timeout: Duration,
    /// Number of pooled connections. Default: 4
    pub connections: usize,
    /// Commands run on every new connection before it serves traffic,
    /// in order (e.g. `AUTH`, `SELECT`, `CLIENT SETNAME`).
    pub setup_commands: Vec<Command>,
    /// Circuit breaker knobs for connection re-creation.
    pub breaker: BreakerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            connections: 4,
            setup_commands: Vec::new(),
            breaker: BreakerConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_connections(mut self, connections: usize) -> Self {
        self.connections = connections;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_setup_commands(mut self, setup_commands: Vec<Command>) -> Self {
        self.setup_commands = setup_commands;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }
}

/// Asynchronous pipelined client backed by a resilient connection pool.
///
/// Cloning is cheap and clones share the pool. Must be created inside a
/// tokio runtime; the pool and its connections run as background tasks.
///
/// # Example
///
/// ```rust,no_run
/// use redpipe_client::{commands, ClientConfig, RedpipeClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = RedpipeClient::connect(ClientConfig::default());
///     client.wait_until_connected(std::time::Duration::from_secs(2), 1).await?;
///
///     client.execute_ok(commands::set("greeting", "hello")).await?;
///     let value = client.execute_bytes(commands::get("greeting")).await?;
///     assert_eq!(value.as_deref(), Some(&b"hello"[..]));
///
///     client.shutdown().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RedpipeClient {
    pool: mpsc::Sender<PoolRequest>,
    request_timeout: Duration,
}

impl RedpipeClient {
    /// Creates a client connected to `host:port` via TCP.
    pub fn connect(config: ClientConfig) -> Self {
        let addr = format!("{}:{}", config.host, config.port);
        let factory = TcpConnectionFactory::new(
            addr,
            config.connect_timeout,
            config.setup_commands.clone(),
        );
        Self::with_factory(&config, Arc::new(factory))
    }

    /// Creates a client over a custom connection factory.
    ///
    /// The factory seam is what tests use to stand up scripted
    /// connections; production code normally calls [`connect`](Self::connect).
    pub fn with_factory(config: &ClientConfig, factory: Arc<dyn ConnectionFactory>) -> Self {
        let pool = PoolSupervisor::spawn(
            config.connections,
            factory,
            CircuitBreaker::new(config.breaker.clone()),
        );
        Self {
            pool,
            request_timeout: config.request_timeout,
        }
    }

    /// Executes one command and returns its success reply.
    ///
    /// # Errors
    ///
    /// - [`RedpipeError::ErrorReply`] when the server answers with an error
    /// - [`RedpipeError::RequestTimeout`] when the deadline elapses first
    /// - [`RedpipeError::NoReadyConnection`] when routing finds no member
    /// - [`RedpipeError::ConnectionLost`] when the connection dies while
    ///   the request is pending
    /// - [`RedpipeError::RequestExecution`] wrapping any other cause
    pub async fn execute(&self, command: Command) -> Result<RespValue> {
        let (tx, rx) = oneshot::channel();
        let sent = self.pool.send(PoolRequest::Execute {
            command: command.clone(),
            reply: tx,
        });
        if sent.await.is_err() {
            return Err(RedpipeError::RequestExecution {
                command,
                cause: "pool is shut down".to_string(),
            });
        }
        match timeout(self.request_timeout, rx).await {
            Err(_) => Err(RedpipeError::RequestTimeout {
                command,
                timeout: self.request_timeout,
            }),
            Ok(Err(_)) => Err(RedpipeError::RequestExecution {
                command,
                cause: "connection dropped the request".to_string(),
            }),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Ok(Ok((command, RespValue::Error(message))))) => {
                Err(RedpipeError::ErrorReply { command, message })
            }
            Ok(Ok(Ok((_, reply)))) => Ok(reply),
        }
    }

    /// Executes a `ConnectionClose`-tagged command (`QUIT`, `SHUTDOWN`)
    /// and resolves once the peer has closed the connection.
    pub async fn execute_connection_close(&self, command: Command) -> Result<()> {
        if command.expectation() != Expectation::ConnectionClose {
            return Err(RedpipeError::RequestExecution {
                command,
                cause: "command does not expect a connection close".to_string(),
            });
        }
        let (tx, rx) = oneshot::channel();
        let sent = self.pool.send(PoolRequest::ExecuteClose {
            command: command.clone(),
            done: tx,
        });
        if sent.await.is_err() {
            return Err(RedpipeError::RequestExecution {
                command,
                cause: "pool is shut down".to_string(),
            });
        }
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RedpipeError::RequestExecution {
                command,
                cause: "connection dropped the request".to_string(),
            }),
        }
    }

    /// Executes and extracts an integer reply.
    pub async fn execute_long(&self, command: Command) -> Result<i64> {
        let issued = command.clone();
        match self.execute(command).await? {
            RespValue::Integer(value) => Ok(value),
            reply => Err(RedpipeError::UnexpectedReply { command: issued, reply }),
        }
    }

    /// Executes and extracts a UTF-8 string reply (simple or bulk).
    pub async fn execute_string(&self, command: Command) -> Result<String> {
        let issued = command.clone();
        match self.execute(command).await? {
            RespValue::Simple(text) => Ok(text),
            RespValue::Bulk(Some(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => Ok(text),
                Err(_) => Err(RedpipeError::UnexpectedReply {
                    command: issued,
                    reply: RespValue::Bulk(Some(data)),
                }),
            },
            reply => Err(RedpipeError::UnexpectedReply { command: issued, reply }),
        }
    }

    /// Executes and extracts a bulk reply; `None` is the null bulk.
    pub async fn execute_bytes(&self, command: Command) -> Result<Option<Bytes>> {
        let issued = command.clone();
        match self.execute(command).await? {
            RespValue::Bulk(data) => Ok(data),
            reply => Err(RedpipeError::UnexpectedReply { command: issued, reply }),
        }
    }

    /// Executes and requires the `+OK` status reply.
    pub async fn execute_ok(&self, command: Command) -> Result<()> {
        let issued = command.clone();
        match self.execute(command).await? {
            reply if reply.is_ok_status() => Ok(()),
            reply => Err(RedpipeError::UnexpectedReply { command: issued, reply }),
        }
    }

    /// Waits until at least `min_connections` pool members are ready.
    ///
    /// Polls the pool at `min(wait / 10, 30ms)` intervals and fails with
    /// [`RedpipeError::ConnectTimeout`] when the deadline elapses first.
    pub async fn wait_until_connected(&self, wait: Duration, min_connections: usize) -> Result<()> {
        let interval = (wait / 10).min(Duration::from_millis(30));
        let poll = async {
            loop {
                let (tx, rx) = oneshot::channel();
                if self.pool.send(PoolRequest::GetRoutees { reply: tx }).await.is_err() {
                    return false;
                }
                match rx.await {
                    Ok(routees) if routees.len() >= min_connections => return true,
                    Ok(_) => {}
                    Err(_) => return false,
                }
                tokio::time::sleep(interval).await;
            }
        };
        match timeout(wait, poll).await {
            Ok(true) => Ok(()),
            _ => Err(RedpipeError::ConnectTimeout {
                timeout: wait,
                min_connections,
            }),
        }
    }

    /// Gracefully stops the pool, waiting up to 30 seconds for the
    /// connections to wind down.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.pool.send(PoolRequest::Shutdown { done: tx }).await.is_err() {
            // Already shut down.
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }
}
