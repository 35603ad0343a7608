//! End-to-end relay tests against a real server and real WebSocket clients

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use wsrelay::{Config, Envelope, RelayServer};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const JOINED: &str = "/A new socket has connected. ";
const LEFT: &str = "/A socket has disconnected. ";

async fn start_relay(mut config: Config) -> SocketAddr {
    config.server.bind_addr = "127.0.0.1:0".parse().unwrap();
    let server = RelayServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.serve());
    addr
}

/// Next envelope delivered to `client`, skipping control frames
async fn next_envelope(client: &mut Client) -> Envelope {
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("read error");
        match frame {
            Message::Text(text) => return Envelope::decode(text.as_bytes()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn assert_silent(client: &mut Client) {
    let result = timeout(Duration::from_millis(200), client.next()).await;
    assert!(result.is_err(), "unexpected frame: {:?}", result);
}

/// Connect and read our own join notice, which carries the assigned id
async fn join(addr: SocketAddr) -> (Client, String) {
    let (mut client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    let notice = next_envelope(&mut client).await;
    assert!(notice.is_broadcast());
    assert_eq!(notice.content, format!("{}127.0.0.1", JOINED));
    assert!(!notice.sender.is_empty());
    (client, notice.sender)
}

async fn send(client: &mut Client, json: &str) {
    client.send(Message::Text(json.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_join_notice_reaches_everyone() {
    let addr = start_relay(Config::default()).await;

    let (mut a, id_a) = join(addr).await;
    let (_b, id_b) = join(addr).await;
    assert_ne!(id_a, id_b);

    let notice = next_envelope(&mut a).await;
    assert_eq!(notice.sender, id_b);
    assert_eq!(notice.content, format!("{}127.0.0.1", JOINED));
}

#[tokio::test]
async fn test_directed_message_reaches_only_recipient() {
    let addr = start_relay(Config::default()).await;

    let (mut a, id_a) = join(addr).await;
    let (mut b, id_b) = join(addr).await;
    let (mut c, id_c) = join(addr).await;

    // Drain join notices for later arrivals
    assert_eq!(next_envelope(&mut a).await.sender, id_b);
    assert_eq!(next_envelope(&mut a).await.sender, id_c);
    assert_eq!(next_envelope(&mut b).await.sender, id_c);

    send(&mut a, &format!(r#"{{"recipient":"{}","content":"hi"}}"#, id_c)).await;

    let received = next_envelope(&mut c).await;
    assert_eq!(received, Envelope::new(id_a.clone(), id_c.clone(), "hi"));
    assert_silent(&mut a).await;
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn test_broadcast_includes_sender() {
    let addr = start_relay(Config::default()).await;

    let (mut a, id_a) = join(addr).await;
    let (mut b, id_b) = join(addr).await;
    assert_eq!(next_envelope(&mut a).await.sender, id_b);

    send(&mut b, r#"{"content":"hello all"}"#).await;

    let expected = Envelope::new(id_b.clone(), "", "hello all");
    assert_eq!(next_envelope(&mut a).await, expected);
    assert_eq!(next_envelope(&mut b).await, expected);
}

#[tokio::test]
async fn test_sender_is_stamped_by_relay() {
    let addr = start_relay(Config::default()).await;

    let (mut a, id_a) = join(addr).await;
    let (mut b, id_b) = join(addr).await;
    assert_eq!(next_envelope(&mut a).await.sender, id_b);

    send(
        &mut a,
        &format!(r#"{{"sender":"spoofed","recipient":"{}","content":"x"}}"#, id_b),
    )
    .await;

    let received = next_envelope(&mut b).await;
    assert_eq!(received.sender, id_a);
    assert_eq!(received.content, "x");
}

#[tokio::test]
async fn test_unknown_recipient_is_dropped() {
    let addr = start_relay(Config::default()).await;

    let (mut a, _) = join(addr).await;
    send(&mut a, r#"{"recipient":"nobody","content":"lost"}"#).await;
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn test_leave_notice_on_close() {
    let addr = start_relay(Config::default()).await;

    let (mut a, id_a) = join(addr).await;
    let (mut b, id_b) = join(addr).await;
    assert_eq!(next_envelope(&mut a).await.sender, id_b);

    a.close(None).await.unwrap();

    let notice = next_envelope(&mut b).await;
    assert_eq!(notice.sender, id_a);
    assert!(notice.is_broadcast());
    assert_eq!(notice.content, format!("{}127.0.0.1", LEFT));
}

#[tokio::test]
async fn test_undecodable_frame_relays_empty_broadcast() {
    let addr = start_relay(Config::default()).await;

    let (mut a, id_a) = join(addr).await;
    send(&mut a, "not an envelope").await;

    let received = next_envelope(&mut a).await;
    assert_eq!(received, Envelope::new(id_a, "", ""));
}

#[tokio::test]
async fn test_strict_decoding_drops_bad_frames() {
    let mut config = Config::default();
    config.relay.strict_decoding = true;
    let addr = start_relay(config).await;

    let (mut a, id_a) = join(addr).await;
    send(&mut a, "not an envelope").await;
    send(&mut a, r#"{"content":"after"}"#).await;

    let received = next_envelope(&mut a).await;
    assert_eq!(received, Envelope::new(id_a, "", "after"));
}

#[tokio::test]
async fn test_custom_ws_path() {
    let mut config = Config::default();
    config.server.ws_path = "/relay".to_string();
    let addr = start_relay(config).await;

    assert!(connect_async(format!("ws://{}/ws", addr)).await.is_err());
    let (mut client, _) = connect_async(format!("ws://{}/relay", addr)).await.unwrap();
    assert!(next_envelope(&mut client).await.content.starts_with(JOINED));
}

#[tokio::test]
async fn test_health_endpoint_over_http() {
    let addr = start_relay(Config::default()).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut response = String::new();
    timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("ok"));
}
