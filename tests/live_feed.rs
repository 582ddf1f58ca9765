use std::time::Duration;

use futures::SinkExt;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use coinwatch::config::FeedConfig;
use coinwatch::live::batch::{message_buffer, BatchProcessor, MessageBuffer};
use coinwatch::live::{ConnectionManager, ConnectionState, FeedHandle};
use coinwatch::market::{RefreshMode, TrackedAsset};
use coinwatch::notice::{Notice, NoticeSender};
use coinwatch::store::SharedStore;

fn tracked(symbol: &str, id: &str, price: f64) -> TrackedAsset {
    TrackedAsset {
        id: Some(id.to_string()),
        symbol: symbol.to_string(),
        name: symbol.to_string(),
        price: Some(price),
        change_percent_24h: None,
        market_cap: Some(1.0),
        volume_24h: None,
        supply: None,
        max_supply: None,
        logo: None,
        price_history: None,
        is_favorite: false,
        stale: false,
        error: None,
        last_updated: None,
    }
}

fn feed_config(ws_url: String) -> FeedConfig {
    FeedConfig {
        ws_url,
        reconnect_delay_ms: 100,
        batch_interval_ms: 50,
        subscription_limit: 5,
        default_symbols: vec!["BTC".to_string()],
    }
}

/// Accepts `connections` sequential clients, pushing one price message to
/// each before closing it cleanly.
async fn run_server(listener: TcpListener, connections: usize) {
    for _ in 0..connections {
        let (stream, _) = listener.accept().await.expect("accept");
        let mut socket = tokio_tungstenite::accept_async(stream)
            .await
            .expect("websocket handshake");
        socket
            .send(Message::Text(r#"{"bitcoin":"65000"}"#.to_string()))
            .await
            .expect("send price");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = socket.close(None).await;
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

struct Feed {
    handle: FeedHandle,
    store: SharedStore,
    buffer: MessageBuffer,
    notices: tokio::sync::mpsc::UnboundedReceiver<Notice>,
}

async fn start_feed(ws_url: String, assets: Vec<TrackedAsset>) -> Feed {
    let store = SharedStore::new(Vec::new());
    store.apply_refresh(assets, RefreshMode::Full);
    let buffer = message_buffer();
    let (notices_tx, notices) = NoticeSender::channel();
    let (handle, _task) = ConnectionManager::spawn(
        feed_config(ws_url),
        store.clone(),
        buffer.clone(),
        notices_tx,
    );
    Feed {
        handle,
        store,
        buffer,
        notices,
    }
}

#[tokio::test]
async fn feed_connects_processes_and_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(run_server(listener, 2));

    let mut feed = start_feed(
        format!("ws://{}/prices", addr),
        vec![tracked("BTC", "bitcoin", 60_000.0)],
    )
    .await;

    feed.handle.connect();
    wait_until("first connection", || {
        feed.handle.state() == ConnectionState::Connected
    })
    .await;

    let notice = feed.notices.recv().await.unwrap();
    assert_eq!(notice.title, "Live updates connected");

    // Raw messages land in the buffer; a batch tick publishes them.
    wait_until("buffered message", || !feed.buffer.lock().unwrap().is_empty()).await;
    let processor = BatchProcessor::new(feed.buffer.clone(), feed.store.clone());
    assert_eq!(processor.drain(), 1);
    let btc = feed.store.get("BTC").unwrap();
    assert_eq!(btc.price, Some(65_000.0));

    // Clean close: the manager schedules a reconnect and picks the feed
    // back up without a fresh connect() call.
    wait_until("reconnection", || {
        feed.handle.state() == ConnectionState::Connected
            && !feed.buffer.lock().unwrap().is_empty()
    })
    .await;

    feed.handle.shutdown();
    server.abort();
}

#[tokio::test]
async fn connect_aborts_when_no_asset_deserves_a_slot() {
    // Only an error item is tracked, so the priority subset is empty and no
    // connection should be opened (there is no server to reach anyway).
    let feed = start_feed(
        "ws://127.0.0.1:9/prices".to_string(),
        vec![TrackedAsset::not_found("XYZ", false)],
    )
    .await;

    feed.handle.connect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(feed.handle.state(), ConnectionState::Disconnected);

    feed.handle.shutdown();
}

#[tokio::test]
async fn failed_connection_surfaces_one_notice() {
    // Nothing listens on this port; the attempt must fail, notify once, and
    // leave the manager disconnected with a pending (escalated) reconnect.
    let mut feed = start_feed(
        "ws://127.0.0.1:9/prices".to_string(),
        vec![tracked("BTC", "bitcoin", 60_000.0)],
    )
    .await;

    feed.handle.connect();
    let notice = feed.notices.recv().await.unwrap();
    assert_eq!(notice.title, "Live updates disconnected");
    assert_eq!(feed.handle.state(), ConnectionState::Disconnected);

    feed.handle.shutdown();
}
