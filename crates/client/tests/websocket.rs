// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests against a real WebSocket server.
//!
//! A minimal in-process server stands in for the chat backend: it
//! accepts one client at a time, records every frame the client sends,
//! pushes scripted frames back, and can drop the connection on command
//! to exercise the reconnect path.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use nt_core::protocol::{ClientEvent, ServerEvent, WireMessage};
use nt_core::{ConnectionState, DeliveryState, Origin};
use nt_client::{ChannelConfig, EngineEvent, EngineHandle, EngineState, SyncEngine};

/// Commands the test sends to the in-process server.
enum ServerCmd {
    /// Send a raw text frame to the connected client.
    Send(String),
    /// Drop the current connection (the accept loop keeps running).
    Drop,
}

struct TestServer {
    addr: SocketAddr,
    cmd_tx: mpsc::UnboundedSender<ServerCmd>,
    /// Text frames received from the client, across connections.
    from_client: mpsc::UnboundedReceiver<String>,
}

impl TestServer {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<ServerCmd>();
        let (in_tx, from_client) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => return,
                };
                let ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => continue,
                };
                let (mut sink, mut stream) = ws.split();

                loop {
                    tokio::select! {
                        cmd = cmd_rx.recv() => match cmd {
                            Some(ServerCmd::Send(json)) => {
                                if sink.send(WsMessage::Text(json.into())).await.is_err() {
                                    break;
                                }
                            }
                            Some(ServerCmd::Drop) => {
                                let _ = sink.close().await;
                                break;
                            }
                            None => return,
                        },
                        frame = stream.next() => match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                let _ = in_tx.send(text.to_string());
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(_)) => break,
                        },
                    }
                }
                // Fall through to accept the client's reconnect.
            }
        });

        TestServer {
            addr,
            cmd_tx,
            from_client,
        }
    }

    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    fn push_message(&self, text: &str, timestamp: &str) {
        let event = ServerEvent::message(WireMessage {
            text: text.to_string(),
            timestamp: timestamp.to_string(),
        });
        self.cmd_tx
            .send(ServerCmd::Send(event.to_json().unwrap()))
            .unwrap();
    }

    fn push_raw(&self, json: &str) {
        self.cmd_tx.send(ServerCmd::Send(json.to_string())).unwrap();
    }

    fn drop_connection(&self) {
        self.cmd_tx.send(ServerCmd::Drop).unwrap();
    }

    async fn next_client_frame(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("server task gone")
    }
}

fn start_engine(url: String) -> EngineHandle {
    // Log output is opt-in: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let config = ChannelConfig {
        url,
        max_retries: 0,
        initial_delay_ms: 10,
        max_delay_secs: 1,
    };
    let (engine, handle) = SyncEngine::new(config);
    tokio::spawn(engine.run());
    handle
}

async fn wait_for_connection(rx: &mut broadcast::Receiver<EngineEvent>, want: ConnectionState) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for connection state")
            .expect("event stream closed");
        if let EngineEvent::ConnectionChanged(state) = event {
            if state == want {
                return;
            }
        }
    }
}

async fn wait_for_transcript_change(rx: &mut broadcast::Receiver<EngineEvent>) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for transcript change")
            .expect("event stream closed");
        if matches!(event, EngineEvent::TranscriptChanged) {
            return;
        }
    }
}

#[tokio::test]
async fn send_and_receive_over_real_websocket() {
    let mut server = TestServer::spawn().await;
    let handle = start_engine(server.url());
    let mut events = handle.subscribe();

    handle.connect().await.unwrap();
    wait_for_connection(&mut events, ConnectionState::Connected).await;

    // Server pushes a message; it lands in the transcript.
    server.push_message("welcome", "2024-01-01T00:00:00Z");
    wait_for_transcript_change(&mut events).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].text, "welcome");
    assert_eq!(snapshot[0].origin, Origin::Remote);

    // Client sends; the frame arrives at the server as a message event.
    handle.send_message("hello out there").await.unwrap();
    let frame = server.next_client_frame().await;
    let event = ClientEvent::from_json(&frame).unwrap();
    let ClientEvent::Message(wire) = event;
    assert_eq!(wire.text, "hello out there");

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot[1].delivery, Some(DeliveryState::Sent));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_event_kinds_are_discarded() {
    let mut server = TestServer::spawn().await;
    let handle = start_engine(server.url());
    let mut events = handle.subscribe();

    handle.connect().await.unwrap();
    wait_for_connection(&mut events, ConnectionState::Connected).await;

    // Not a message event; the client must stay live and keep reading.
    server.push_raw(r#"{"type":"presence","user":"bob"}"#);
    server.push_message("still here", "2024-01-01T00:00:00Z");
    wait_for_transcript_change(&mut events).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].text, "still here");
    assert_eq!(handle.engine_state().await.unwrap(), EngineState::Live);

    // The connection survived: a send still goes through.
    handle.send_message("ack").await.unwrap();
    let frame = server.next_client_frame().await;
    assert!(frame.contains("ack"));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    let mut server = TestServer::spawn().await;
    let handle = start_engine(server.url());
    let mut events = handle.subscribe();

    handle.connect().await.unwrap();
    wait_for_connection(&mut events, ConnectionState::Connected).await;

    server.drop_connection();
    wait_for_connection(&mut events, ConnectionState::Reconnecting).await;
    wait_for_connection(&mut events, ConnectionState::Connected).await;

    assert_eq!(handle.engine_state().await.unwrap(), EngineState::Live);

    // The new channel epoch carries traffic both ways.
    server.push_message("round two", "2024-01-01T00:01:00Z");
    wait_for_transcript_change(&mut events).await;
    handle.send_message("still talking").await.unwrap();
    let frame = server.next_client_frame().await;
    assert!(frame.contains("still talking"));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].text, "round two");
    assert_eq!(snapshot[1].delivery, Some(DeliveryState::Sent));

    handle.shutdown().await.unwrap();
}
