//! Connect to a running tchats server, ask to join a room and print every
//! event the server sends until the connection closes.
//!
//! Usage: cargo run --example join_room -- ws://127.0.0.1:3000 <token> <room>

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tchat_common::handshake::client_url;
use tchat_common::types::PROTOCOL_VERSION;
use tchat_common::ServerEvent;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let base = args
        .next()
        .unwrap_or_else(|| "ws://127.0.0.1:3000".to_string());
    let token = args.next();
    let room = args.next();

    let url = client_url(&base, token.as_deref(), room.as_deref()).expect("invalid server url");
    let mut req = url.into_client_request().unwrap();
    req.headers_mut()
        .insert("Sec-WebSocket-Protocol", PROTOCOL_VERSION.parse().unwrap());

    let (ws, resp) = tokio_tungstenite::connect_async(req)
        .await
        .expect("WS connect failed");
    println!("connected ({})", resp.status());
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        match tokio::time::timeout(Duration::from_secs(10), ws_rx.next()).await {
            Err(_) => {
                println!("no event in 10s, leaving");
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            Ok(None) => {
                println!("stream ended");
                break;
            }
            Ok(Some(Err(e))) => {
                println!("connection error: {e}");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => match ServerEvent::parse(&text) {
                Ok(event) => println!("event: {event:?}"),
                Err(e) => println!("unparseable text frame ({e}): {text}"),
            },
            Ok(Some(Ok(Message::Close(frame)))) => {
                println!("closed by server: {frame:?}");
                break;
            }
            Ok(Some(Ok(Message::Ping(data)))) => {
                let _ = ws_tx.send(Message::Pong(data)).await;
            }
            Ok(Some(Ok(_))) => {}
        }
    }
}
