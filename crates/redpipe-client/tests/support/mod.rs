//! Shared test support: a scripted TCP server that plays back exact bytes.
//!
//! Each test hands the server a per-connection handler; the handler reads
//! whatever the client writes and answers with verbatim reply bytes, so
//! the tests control the wire down to the chunk boundaries.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use redpipe_client::ClientConfig;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

pub struct ScriptedServer {
    port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ScriptedServer {
    /// Starts a server on a random port; `handler` runs once per accepted
    /// connection.
    pub async fn spawn<F, Fut>(handler: F) -> Self
    where
        F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            let handler = Arc::new(handler);
            loop {
                tokio::select! {
                    result = listener.accept() => match result {
                        Ok((stream, _)) => {
                            let handler = Arc::clone(&handler);
                            tokio::spawn(async move { handler(stream).await });
                        }
                        Err(_) => break,
                    },
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            port,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// A single-connection client config pointed at this server, with
    /// test-sized timeouts.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.port)
            .with_connections(1)
            .with_connect_timeout(Duration::from_secs(1))
            .with_request_timeout(Duration::from_secs(2))
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Reads exactly `len` bytes from the socket.
pub async fn read_exactly(socket: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    socket.read_exact(&mut buf).await.unwrap();
    buf
}
