mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Connect with the token in the query string (the header-less client path).
async fn connect(addr: SocketAddr, token: &str) -> WsStream {
    let url = format!("ws://{addr}/realtime?token={token}");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

async fn next_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse frame")
            }
            // Keepalive noise from the server.
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("expected text frame, got: {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn notify_reaches_connected_user() {
    let (addr, state) = common::start_server().await;
    let token = common::mint_session(7, &[]);

    let mut ws = connect(addr, &token).await;
    common::wait_until(|| state.hub.is_online(7)).await;

    let producer = common::mint_session(1, &[]);
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/notify"))
        .header("Authorization", format!("Bearer {producer}"))
        .json(&serde_json::json!({ "user_id": 7, "title": "Invoice ready", "link": "/billing" }))
        .send()
        .await
        .expect("notify request");
    assert_eq!(resp.status(), 200);

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "notification");
    assert_eq!(frame["payload"]["title"], "Invoice ready");
    assert_eq!(frame["payload"]["link"], "/billing");
}

#[tokio::test]
async fn app_level_ping_gets_pong() {
    let (addr, state) = common::start_server().await;
    let token = common::mint_session(8, &[]);

    let mut ws = connect(addr, &token).await;
    common::wait_until(|| state.hub.is_online(8)).await;

    ws.send(tungstenite::Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .expect("send ping");

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "pong");
    assert!(frame.get("payload").is_none());
}

#[tokio::test]
async fn unknown_inbound_event_is_ignored_not_fatal() {
    let (addr, state) = common::start_server().await;
    let token = common::mint_session(9, &[]);

    let mut ws = connect(addr, &token).await;
    common::wait_until(|| state.hub.is_online(9)).await;

    ws.send(tungstenite::Message::Text(
        r#"{"type":"typing_start","payload":{"channel":"c1"}}"#.into(),
    ))
    .await
    .expect("send unknown event");

    // The connection must survive: a ping afterwards still gets its pong.
    ws.send(tungstenite::Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .expect("send ping");
    let frame = next_json(&mut ws).await;
    assert_eq!(frame["type"], "pong");
}

#[tokio::test]
async fn upgrade_without_token_is_rejected() {
    let (addr, _state) = common::start_server().await;

    let url = format!("ws://{addr}/realtime");
    let err = tokio_tungstenite::connect_async(&url)
        .await
        .expect_err("upgrade should be rejected");
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 401),
        other => panic!("expected HTTP rejection, got: {other:?}"),
    }
}

#[tokio::test]
async fn upgrade_with_invalid_token_is_rejected() {
    let (addr, _state) = common::start_server().await;

    let url = format!("ws://{addr}/realtime?token=bogus");
    let err = tokio_tungstenite::connect_async(&url)
        .await
        .expect_err("upgrade should be rejected");
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 401),
        other => panic!("expected HTTP rejection, got: {other:?}"),
    }
}

#[tokio::test]
async fn session_cookie_authenticates_upgrade() {
    let (addr, state) = common::start_server().await;
    let token = common::mint_session(12, &[]);

    let mut request = format!("ws://{addr}/realtime")
        .into_client_request()
        .expect("build request");
    request.headers_mut().insert(
        "Cookie",
        format!("theme=dark; nimbus_session={token}")
            .parse()
            .unwrap(),
    );

    let (_ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws connect with cookie");
    common::wait_until(|| state.hub.is_online(12)).await;
}

#[tokio::test]
async fn second_connection_evicts_the_first() {
    let (addr, state) = common::start_server().await;
    let token = common::mint_session(7, &[]);

    let mut first = connect(addr, &token).await;
    common::wait_until(|| state.hub.is_online(7)).await;

    let mut second = connect(addr, &token).await;

    // The first socket is closed by the server.
    let msg = time::timeout(Duration::from_secs(5), first.next())
        .await
        .expect("timeout waiting for eviction");
    match msg {
        Some(Ok(tungstenite::Message::Close(_))) | None => {}
        other => panic!("expected close on evicted connection, got: {other:?}"),
    }

    // Only one connection remains and it receives deliveries.
    common::wait_until(|| state.hub.connected_count() == 1).await;
    state
        .notifier
        .notify_user(7, nimbus_common::events::NotificationPayload::new("hi"))
        .await;
    let frame = next_json(&mut second).await;
    assert_eq!(frame["type"], "notification");
}

#[tokio::test]
async fn org_broadcast_reaches_member_over_the_wire() {
    let (addr, state) = common::start_server().await;

    let member = common::mint_session(1, &[100]);
    let outsider = common::mint_session(2, &[200]);

    let mut member_ws = connect(addr, &member).await;
    let mut outsider_ws = connect(addr, &outsider).await;
    common::wait_until(|| state.hub.connected_count() == 2).await;
    assert_eq!(state.hub.org_user_count(100), 1);

    state.notifier.org_updated(100);

    let frame = next_json(&mut member_ws).await;
    assert_eq!(frame["type"], "org_update");
    assert_eq!(frame["payload"]["org_id"], 100);

    // The outsider hears nothing; a ping round-trip proves the silence isn't
    // just latency.
    outsider_ws
        .send(tungstenite::Message::Text(r#"{"type":"ping"}"#.into()))
        .await
        .expect("send ping");
    let frame = next_json(&mut outsider_ws).await;
    assert_eq!(frame["type"], "pong");
}

#[tokio::test]
async fn disconnect_takes_user_offline() {
    let (addr, state) = common::start_server().await;
    let token = common::mint_session(3, &[]);

    let ws = connect(addr, &token).await;
    common::wait_until(|| state.hub.is_online(3)).await;

    drop(ws);
    common::wait_until(|| !state.hub.is_online(3)).await;
    assert_eq!(state.hub.connected_count(), 0);
}
