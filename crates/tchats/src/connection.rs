use crate::admission::Session;
use crate::error::TchatsError;
use crate::metrics::gauges;
use crate::registry::{RoomRegistry, SessionHandle};
use crate::server::ServerState;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tchat_common::types::PROTOCOL_VERSION;
use tchat_common::{Handshake, RoomId, ServerEvent, SessionId};
use tokio::net::TcpStream;
use tokio::time::{interval, Duration};
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::{HeaderValue, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsRecv = SplitStream<WebSocketStream<TcpStream>>;

/// A live WebSocket connection as seen by the admission gate.
struct WsSession<'a> {
    id: SessionId,
    peer: SocketAddr,
    ws_tx: &'a mut WsSink,
    registry: &'a RoomRegistry,
    closed: bool,
}

#[async_trait]
impl Session for WsSession<'_> {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn join(&mut self, room: &RoomId) -> Result<(), TchatsError> {
        let handle = SessionHandle {
            session_id: self.id,
            peer: self.peer,
            joined_at: Instant::now(),
        };
        let _ = self.registry.join(room.clone(), handle);
        gauges::set_rooms_active(self.registry.room_count());
        Ok(())
    }

    async fn emit(&mut self, event: ServerEvent) -> Result<(), TchatsError> {
        if self.closed {
            return Err(TchatsError::ConnectionClosed);
        }
        let text = event.to_json()?;
        self.ws_tx.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TchatsError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: "admission rejected".into(),
        };
        self.ws_tx.send(Message::Close(Some(frame))).await?;
        Ok(())
    }
}

/// Echo our subprotocol back if the client offered it.
fn negotiate_protocol(req: &Request<()>, resp: &mut Response<()>) {
    let offered = req
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|list| list.split(',').map(str::trim).any(|p| p == PROTOCOL_VERSION));
    if offered {
        resp.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(PROTOCOL_VERSION),
        );
    }
}

fn handshake_from_request(req: &Request<()>) -> Handshake {
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    Handshake::from_request_parts(req.uri().query(), authorization)
}

/// Keep a non-rejected session open: answer pings, send keepalives, close
/// on idle. Client payloads are not relayed anywhere.
async fn run_session_loop(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    state: &ServerState,
    session_id: SessionId,
) -> Result<(), TchatsError> {
    let mut ping_interval = interval(Duration::from_secs(state.config.ping_interval));
    let idle_timeout = Duration::from_secs(state.config.idle_timeout);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            tracing::debug!("failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(TchatsError::WebSocket(e)),
                    Some(Ok(_)) => {
                        tracing::trace!(session = session_id, "ignoring client payload");
                    }
                }
            }
            _ = ping_interval.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::debug!(
                        session = session_id,
                        "idle timeout reached, closing connection"
                    );
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return Ok(());
                }
                if let Err(e) = ws_tx.send(Message::Ping(Vec::new())).await {
                    tracing::debug!("failed to send ping: {}", e);
                }
            }
        }
    }
}

/// Upgrade a TCP stream, run it through the admission gate, and keep it
/// open until the client leaves unless it was rejected.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<ServerState>,
) -> Result<(), TchatsError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(state.config.max_message_size),
        max_frame_size: Some(state.config.max_message_size),
        ..WebSocketConfig::default()
    };

    let handshake_cell = Arc::new(OnceLock::new());
    let cell = handshake_cell.clone();
    let ws_stream = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        move |req: &Request<()>, mut resp: Response<()>| {
            let _ = cell.set(handshake_from_request(req));
            negotiate_protocol(req, &mut resp);
            Ok(resp)
        },
        Some(ws_config),
    )
    .await?;

    let handshake: Handshake = handshake_cell.get().cloned().unwrap_or_default();
    let session_id = state.next_session_id();
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    gauges::inc_sessions_active();
    tracing::debug!(session = session_id, peer = %peer_addr, "session opened");

    let decision = {
        let mut session = WsSession {
            id: session_id,
            peer: peer_addr,
            ws_tx: &mut ws_tx,
            registry: &state.registry,
            closed: false,
        };
        state.gate.admit(&handshake, &mut session).await
    };

    let result = match decision {
        Ok(decision) if decision.is_terminal() => Ok(()),
        Ok(_) => run_session_loop(&mut ws_tx, &mut ws_rx, &state, session_id).await,
        Err(e) => Err(e),
    };

    let left = state.registry.leave_all(session_id);
    if !left.is_empty() {
        gauges::set_rooms_active(state.registry.room_count());
    }
    gauges::dec_sessions_active();
    tracing::debug!(session = session_id, rooms_left = left.len(), "session closed");

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_from_query_and_header() {
        let req = Request::builder()
            .uri("/?room=R1&token=fromquery")
            .header("authorization", "Bearer fromheader")
            .body(())
            .unwrap();
        let hs = handshake_from_request(&req);
        assert_eq!(hs.token.as_deref(), Some("fromheader"));
        assert_eq!(hs.room.as_deref(), Some("R1"));
    }

    #[test]
    fn handshake_without_query() {
        let req = Request::builder().uri("/").body(()).unwrap();
        assert_eq!(handshake_from_request(&req), Handshake::default());
    }

    #[test]
    fn protocol_echoed_when_offered() {
        let req = Request::builder()
            .header("sec-websocket-protocol", format!("chat, {PROTOCOL_VERSION}"))
            .body(())
            .unwrap();
        let mut resp = Response::new(());
        negotiate_protocol(&req, &mut resp);
        assert_eq!(
            resp.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            PROTOCOL_VERSION
        );
    }

    #[test]
    fn protocol_not_echoed_when_absent() {
        let req = Request::builder().body(()).unwrap();
        let mut resp = Response::new(());
        negotiate_protocol(&req, &mut resp);
        assert!(resp.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }
}
