//! redpipe Client
//!
//! An asynchronous, pipelined Redis client backed by a resilient pool of
//! persistent connections.
//!
//! # Overview
//!
//! The client keeps a fixed-size pool of TCP connections to the server.
//! Each connection is owned by an actor that pipelines outbound commands
//! and correlates inbound replies in strict FIFO order, so many requests
//! can be in flight on one socket at a time. The pool routes requests
//! round-robin across the connections that are ready, and re-creates
//! failed members through a circuit breaker so that an unreachable server
//! is probed with exponential backoff instead of hammered.
//!
//! # Key Features
//!
//! - **Pipelining**: many in-flight requests per connection, FIFO-correlated
//! - **Resilient pool**: failed connections are restarted under a circuit
//!   breaker; routing skips members that are not ready
//! - **Typed extractors**: `execute_long` / `execute_string` /
//!   `execute_bytes` / `execute_ok` match the reply against the command's
//!   expectation tag
//! - **Setup commands**: an ordered command list (`AUTH`, `SELECT`, ...)
//!   runs on every new connection before it serves traffic
//!
//! # Usage
//!
//! ```rust,no_run
//! use redpipe_client::{commands, ClientConfig, RedpipeClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("127.0.0.1", 6379).with_connections(4);
//!     let client = RedpipeClient::connect(config);
//!     client.wait_until_connected(Duration::from_secs(2), 1).await?;
//!
//!     client.execute_ok(commands::set("user:1", "ada")).await?;
//!     let name = client.execute_bytes(commands::get("user:1")).await?;
//!     println!("user:1 = {:?}", name);
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Every request settles exactly once: with a success reply, or with one
//! of the [`RedpipeError`] variants. Transient faults (timeouts, lost
//! connections, an empty pool) answer [`RedpipeError::is_retryable`] with
//! `true`; server errors and configuration problems do not.

pub mod breaker;
pub mod client;
pub mod commands;
pub mod connection;
pub mod error;
mod pool;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use client::{ClientConfig, RedpipeClient};
pub use connection::{ConnectionFactory, TcpConnectionFactory};
pub use error::{RedpipeError, Result};

pub use redpipe_common::{Command, Expectation, RespValue};
