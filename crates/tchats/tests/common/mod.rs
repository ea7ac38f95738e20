#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tchat_common::handshake::client_url;
use tchat_common::{token, RoomId, ServerEvent, UserId};
use tchats::admission::{AdmissionGate, GateConfig};
use tchats::config::ServerConfig;
use tchats::server::ServerState;
use tchats::store::{FormatValidator, MemoryStore, RoomStore};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

pub type ClientStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        max_conns: 1000,
        max_message_size: 65_536,
        lookup_timeout_ms: 2000,
        ping_interval: 30,
        idle_timeout: 120,
        strict_tokens: false,
        seed: None,
    }
}

/// Tokens issued by [`seeded_store`].
#[derive(Clone, Debug)]
pub struct Tokens {
    /// Resolves to U1, participant of R1.
    pub u1: String,
    /// Resolves to U2, participant of R1.
    pub u2: String,
    /// Resolves to U3, not a participant of R1.
    pub u3: String,
    /// Expired token of U1.
    pub expired: String,
}

/// Room R1 = {U1, U2}; users U1, U2, U3 exist.
pub fn seeded_store() -> (Arc<MemoryStore>, Tokens) {
    let store = MemoryStore::new();
    for id in ["U1", "U2", "U3"] {
        store.insert_user(UserId::new(id), None);
    }
    let tokens = Tokens {
        u1: token::generate(),
        u2: token::generate(),
        u3: token::generate(),
        expired: token::generate(),
    };
    store.insert_token(tokens.u1.clone(), UserId::new("U1"), None);
    store.insert_token(tokens.u2.clone(), UserId::new("U2"), None);
    store.insert_token(tokens.u3.clone(), UserId::new("U3"), None);
    store.insert_token(tokens.expired.clone(), UserId::new("U1"), Some(1));
    store.insert_room(RoomId::new("R1"), [UserId::new("U1"), UserId::new("U2")]);
    (Arc::new(store), tokens)
}

pub fn make_state(config: ServerConfig, store: Arc<MemoryStore>) -> Arc<ServerState> {
    make_state_with_rooms(config, store.clone(), store)
}

pub fn make_state_with_rooms(
    config: ServerConfig,
    store: Arc<MemoryStore>,
    rooms: Arc<dyn RoomStore>,
) -> Arc<ServerState> {
    let gate_config: GateConfig = config.gate();
    let gate = AdmissionGate::new(Arc::new(FormatValidator), store, rooms, gate_config);
    Arc::new(ServerState::new(gate, config))
}

pub async fn spawn_server(state: Arc<ServerState>, listener: TcpListener) {
    tokio::spawn(async move {
        if let Err(e) = tchats::run(listener, state).await {
            eprintln!("server error in test: {e}");
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>, Tokens) {
    start_server_with(|_| {}).await
}

pub async fn start_server_with(
    tweak: impl FnOnce(&mut ServerConfig),
) -> (SocketAddr, Arc<ServerState>, Tokens) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    tweak(&mut config);
    let (store, tokens) = seeded_store();
    let state = make_state(config, store);
    spawn_server(state.clone(), listener).await;
    (addr, state, tokens)
}

pub struct TestClient {
    pub ws: ClientStream,
}

impl TestClient {
    /// Connect presenting token and room as query parameters.
    pub async fn connect(addr: &SocketAddr, token: Option<&str>, room: Option<&str>) -> Self {
        let url = client_url(&format!("ws://{addr}/"), token, room).unwrap();
        let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        Self { ws }
    }

    /// Connect presenting the token as an `Authorization: Bearer` header.
    pub async fn connect_with_header(addr: &SocketAddr, token: &str, room: Option<&str>) -> Self {
        let url = client_url(&format!("ws://{addr}/"), None, room).unwrap();
        let mut req = url.into_client_request().unwrap();
        req.headers_mut()
            .insert("Authorization", format!("Bearer {token}").parse().unwrap());
        let (ws, _) = tokio_tungstenite::connect_async(req).await.unwrap();
        Self { ws }
    }

    pub async fn recv_event(&mut self) -> ServerEvent {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("timeout waiting for event")
                .expect("stream ended before an event")
                .unwrap();
            match msg {
                Message::Text(text) => return ServerEvent::parse(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("expected text event, got {other:?}"),
            }
        }
    }

    /// Returns the next event, or `None` if nothing arrives within `timeout`.
    pub async fn recv_event_timeout(&mut self, timeout: Duration) -> Option<ServerEvent> {
        tokio::time::timeout(timeout, self.recv_event()).await.ok()
    }

    /// Wait for the server to close the connection.
    pub async fn expect_closed(&mut self) {
        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(other)) => panic!("expected close, got {other:?}"),
                }
            }
        })
        .await;
        assert!(closed.is_ok(), "server did not close the connection");
    }

    /// Round-trip a ping to prove the connection is still open.
    pub async fn assert_open(&mut self) {
        self.ws.send(Message::Ping(b"alive".to_vec())).await.unwrap();
        let pong = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Pong(_))) => return true,
                    Some(Ok(Message::Ping(_))) => {}
                    _ => return false,
                }
            }
        })
        .await;
        assert!(matches!(pong, Ok(true)), "connection should still be open");
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Poll until `check` holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..40 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
