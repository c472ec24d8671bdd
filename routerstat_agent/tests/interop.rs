//! A stock WebSocket client against the agent over loopback TCP.

use futures_util::{SinkExt, Stream, StreamExt};
use routerstat_agent::config::Config;
use routerstat_agent::{server, AppState};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn next_json<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let msg = timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("message within 5s")
        .expect("stream open")
        .expect("valid frame");
    match msg {
        Message::Text(s) => serde_json::from_str(&s).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn tungstenite_client_receives_snapshots() {
    let config = Config {
        interval_ms: 50,
        interface: "vlan2".into(),
        label: "wan".into(),
        proc_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/proc"),
        ..Config::default()
    };
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::procfs(config);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(server::serve(listener, state.clone(), async move {
        let _ = stop_rx.await;
    }));

    // connect_async verifies Sec-WebSocket-Accept
    let (mut ws, resp) = connect_async(format!("ws://{addr}/")).await.unwrap();
    assert_eq!(resp.status().as_u16(), 101);

    let first = next_json(&mut ws).await;
    assert_eq!(first["uptime"], 350735.47);
    assert_eq!(first["cpu"], serde_json::json!([0.20, 0.18, 0.12]));
    assert_eq!(first["memory"]["free"], 69936);
    assert_eq!(first["memory"]["total"], 255908);
    let wan = &first["bandwidth"]["wan"];
    assert_eq!(wan["receive"], 976329938704u64);
    assert_eq!(wan["transmit"], 56789012);
    assert!(wan["rx_rate"].is_null());

    // fixture never changes, so the rate is a real zero
    let second = next_json(&mut ws).await;
    assert_eq!(second["bandwidth"]["wan"]["rx_rate"].as_f64(), Some(0.0));
    assert_eq!(second["bandwidth"]["wan"]["tx_rate"].as_f64(), Some(0.0));
    assert!(second["timestamp"].as_f64() >= first["timestamp"].as_f64());

    // text from the client is ignored, streaming carries on
    ws.send(Message::Text("hello".into())).await.unwrap();
    let _ = next_json(&mut ws).await;
    assert_eq!(state.clients(), 1);

    ws.close(None).await.unwrap();
    drop(ws);

    let _ = stop_tx.send(());
    timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
