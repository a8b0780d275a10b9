//! End-to-end scenarios against scripted servers.
//!
//! Every test stands up a real TCP server that answers with verbatim
//! bytes, so the full path is exercised: facade -> pool -> connection
//! actor -> codec -> socket and back.

mod support;

use std::time::Duration;

use redpipe_client::{commands, RedpipeClient, RedpipeError, RespValue};
use support::{read_exactly, ScriptedServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

const GET_FOO_WIRE: &[u8] = b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n";

async fn connected_client(server: &ScriptedServer) -> RedpipeClient {
    let client = RedpipeClient::connect(server.client_config());
    client
        .wait_until_connected(Duration::from_secs(2), 1)
        .await
        .unwrap();
    client
}

#[tokio::test]
async fn test_simple_get() {
    let (wire_tx, mut wire_rx) = mpsc::unbounded_channel();
    let server = ScriptedServer::spawn(move |mut socket| {
        let wire_tx = wire_tx.clone();
        async move {
            let request = read_exactly(&mut socket, GET_FOO_WIRE.len()).await;
            wire_tx.send(request).unwrap();
            socket.write_all(b"$3\r\nbar\r\n").await.unwrap();
        }
    })
    .await;

    let client = connected_client(&server).await;
    let value = client.execute_bytes(commands::get("foo")).await.unwrap();
    assert_eq!(value.as_deref(), Some(&b"bar"[..]));

    // The request went out bit-exact.
    assert_eq!(wire_rx.recv().await.unwrap(), GET_FOO_WIRE);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_null_bulk_reply() {
    let server = ScriptedServer::spawn(|mut socket| async move {
        let _ = read_exactly(&mut socket, GET_FOO_WIRE.len()).await;
        socket.write_all(b"$-1\r\n").await.unwrap();
    })
    .await;

    let client = connected_client(&server).await;
    let value = client.execute_bytes(commands::get("foo")).await.unwrap();
    assert_eq!(value, None);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_error_reply() {
    let server = ScriptedServer::spawn(|mut socket| async move {
        let _ = read_exactly(&mut socket, GET_FOO_WIRE.len()).await;
        socket.write_all(b"-WRONGTYPE bad\r\n").await.unwrap();
    })
    .await;

    let client = connected_client(&server).await;
    match client.execute(commands::get("foo")).await {
        Err(RedpipeError::ErrorReply { message, .. }) => {
            assert_eq!(message, "WRONGTYPE bad");
        }
        other => panic!("expected ErrorReply, got {:?}", other),
    }
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reply_chunked_mid_frame() {
    let server = ScriptedServer::spawn(|mut socket| async move {
        let _ = read_exactly(&mut socket, GET_FOO_WIRE.len()).await;
        for chunk in [&b"$5\r"[..], b"\nhel", b"lo\r\n"] {
            socket.write_all(chunk).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;

    let client = connected_client(&server).await;
    let value = client.execute_bytes(commands::get("foo")).await.unwrap();
    assert_eq!(value.as_deref(), Some(&b"hello"[..]));
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pipelined_correlation() {
    // INCR a / INCR b / INCR c all encode to the same length.
    let one = b"*2\r\n$4\r\nINCR\r\n$1\r\na\r\n".len();
    let server = ScriptedServer::spawn(move |mut socket| async move {
        let _ = read_exactly(&mut socket, one * 3).await;
        socket.write_all(b":1\r\n:2\r\n:3\r\n").await.unwrap();
    })
    .await;

    let client = connected_client(&server).await;
    let (a, b, c) = tokio::join!(
        client.execute_long(commands::incr("a")),
        client.execute_long(commands::incr("b")),
        client.execute_long(commands::incr("c")),
    );
    assert_eq!(a.unwrap(), 1);
    assert_eq!(b.unwrap(), 2);
    assert_eq!(c.unwrap(), 3);
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_late_reply_after_timeout_is_discarded() {
    let one = b"*2\r\n$3\r\nGET\r\n$1\r\na\r\n".len();
    let server = ScriptedServer::spawn(move |mut socket| async move {
        // Sit on the first request until the caller's deadline has
        // passed (the second request arriving proves it has), then
        // answer both in order.
        let _ = read_exactly(&mut socket, one).await;
        let _ = read_exactly(&mut socket, one).await;
        socket.write_all(b"$1\r\nA\r\n$1\r\nB\r\n").await.unwrap();
    })
    .await;

    let config = server.client_config().with_request_timeout(Duration::from_millis(150));
    let client = RedpipeClient::connect(config);
    client
        .wait_until_connected(Duration::from_secs(2), 1)
        .await
        .unwrap();

    match client.execute(commands::get("a")).await {
        Err(RedpipeError::RequestTimeout { .. }) => {}
        other => panic!("expected RequestTimeout, got {:?}", other),
    }

    // The late reply for the first command lands in its abandoned FIFO
    // slot; the second command still gets the right answer.
    let value = client.execute_bytes(commands::get("b")).await.unwrap();
    assert_eq!(value.as_deref(), Some(&b"B"[..]));
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_setup_commands_run_before_traffic() {
    let setname = commands::client_setname("redpipe-test");
    let setname_len = b"*3\r\n$6\r\nCLIENT\r\n$7\r\nSETNAME\r\n$12\r\nredpipe-test\r\n".len();

    let (wire_tx, mut wire_rx) = mpsc::unbounded_channel();
    let server = ScriptedServer::spawn(move |mut socket| {
        let wire_tx = wire_tx.clone();
        async move {
            let first = read_exactly(&mut socket, setname_len).await;
            wire_tx.send(first).unwrap();
            socket.write_all(b"+OK\r\n").await.unwrap();
            let _ = read_exactly(&mut socket, GET_FOO_WIRE.len()).await;
            socket.write_all(b"$2\r\nok\r\n").await.unwrap();
        }
    })
    .await;

    let config = server.client_config().with_setup_commands(vec![setname]);
    let client = RedpipeClient::connect(config);
    client
        .wait_until_connected(Duration::from_secs(2), 1)
        .await
        .unwrap();

    let value = client.execute_bytes(commands::get("foo")).await.unwrap();
    assert_eq!(value.as_deref(), Some(&b"ok"[..]));

    // Setup arrived before any application command.
    let first = wire_rx.recv().await.unwrap();
    assert!(first.starts_with(b"*3\r\n$6\r\nCLIENT\r\n"));
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_setup_keeps_pool_unready() {
    let server = ScriptedServer::spawn(|mut socket| async move {
        let mut sink = [0u8; 256];
        let _ = socket.read(&mut sink).await.unwrap();
        socket.write_all(b"-NOAUTH authentication required\r\n").await.unwrap();
    })
    .await;

    let config = server
        .client_config()
        .with_setup_commands(vec![commands::select(1)]);
    let client = RedpipeClient::connect(config);

    match client.wait_until_connected(Duration::from_millis(300), 1).await {
        Err(RedpipeError::ConnectTimeout { min_connections, .. }) => {
            assert_eq!(min_connections, 1);
        }
        other => panic!("expected ConnectTimeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_close_command() {
    let quit_wire = b"*1\r\n$4\r\nQUIT\r\n";
    let server = ScriptedServer::spawn(move |mut socket| async move {
        let _ = read_exactly(&mut socket, quit_wire.len()).await;
        // Close without replying, as the server does for QUIT.
        drop(socket);
    })
    .await;

    let client = connected_client(&server).await;
    client.execute_connection_close(commands::quit()).await.unwrap();
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_close_command_requires_close_expectation() {
    let server = ScriptedServer::spawn(|_socket| async move {}).await;
    let client = RedpipeClient::connect(server.client_config());

    match client.execute_connection_close(commands::get("foo")).await {
        Err(RedpipeError::RequestExecution { cause, .. }) => {
            assert!(cause.contains("connection close"), "cause: {}", cause);
        }
        other => panic!("expected RequestExecution, got {:?}", other),
    }
}

#[tokio::test]
async fn test_extractor_rejects_wrong_shape() {
    let server = ScriptedServer::spawn(|mut socket| async move {
        let _ = read_exactly(&mut socket, GET_FOO_WIRE.len()).await;
        socket.write_all(b"$3\r\nbar\r\n").await.unwrap();
    })
    .await;

    let client = connected_client(&server).await;
    match client.execute_long(commands::get("foo")).await {
        Err(RedpipeError::UnexpectedReply { reply, .. }) => {
            assert_eq!(reply, RespValue::Bulk(Some(bytes::Bytes::from_static(b"bar"))));
        }
        other => panic!("expected UnexpectedReply, got {:?}", other),
    }
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_no_ready_connection_before_pool_fills() {
    // A port with no listener: the pool can never produce a ready member.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = redpipe_client::ClientConfig::new("127.0.0.1", port).with_connections(1);
    let client = RedpipeClient::connect(config);

    match client.execute(commands::ping()).await {
        Err(RedpipeError::NoReadyConnection) => {}
        other => panic!("expected NoReadyConnection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_execute_after_shutdown_fails() {
    let server = ScriptedServer::spawn(|mut socket| async move {
        let _ = read_exactly(&mut socket, GET_FOO_WIRE.len()).await;
        socket.write_all(b"$3\r\nbar\r\n").await.unwrap();
    })
    .await;

    let client = connected_client(&server).await;
    client.shutdown().await.unwrap();

    match client.execute(commands::get("foo")).await {
        Err(RedpipeError::RequestExecution { cause, .. }) => {
            assert!(cause.contains("shut down"), "cause: {}", cause);
        }
        other => panic!("expected RequestExecution, got {:?}", other),
    }
}

#[tokio::test]
async fn test_pool_reaches_requested_size() {
    let server = ScriptedServer::spawn(|socket| async move {
        // Hold the connection open without speaking.
        let _socket = socket;
        tokio::time::sleep(Duration::from_secs(10)).await;
    })
    .await;

    let config = server.client_config().with_connections(3);
    let client = RedpipeClient::connect(config);
    client
        .wait_until_connected(Duration::from_secs(2), 3)
        .await
        .unwrap();
    client.shutdown().await.unwrap();
}
