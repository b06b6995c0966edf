// tests/certstream.rs
//
// Drives the certstream source against a local WebSocket server.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use bpl_agent::comms::{queue, shutdown, EventReceiver};
use bpl_agent::config::CertstreamSettings;
use bpl_agent::model::Event;
use bpl_agent::sources::{CertstreamSource, ConnectionState};
use bpl_agent::stages::Source;

type Server = WebSocketStream<TcpStream>;

/// Accept connections forever, handing each to `handler` with its index.
async fn serve<F, Fut>(handler: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(usize, Server) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if let Ok(ws) = accept_async(tcp).await {
                tokio::spawn(handler(n, ws));
            }
        }
    });
    (url, accepted)
}

fn cert_update(cn: &str) -> Message {
    Message::Text(
        json!({
            "message_type": "certificate_update",
            "data": {
                "update_type": "X509LogEntry",
                "leaf_cert": {
                    "subject": { "CN": cn },
                    "extensions": { "subjectAltName": format!("DNS:{cn}, DNS:*.{cn}") }
                }
            }
        })
        .to_string(),
    )
}

/// Keep the connection open until the client goes away.
async fn hold(mut ws: Server) {
    while let Some(Ok(_)) = ws.next().await {}
}

fn source(url: &str) -> Arc<CertstreamSource> {
    let mut settings = CertstreamSettings::new(url, vec!["paypal".into(), "amazon".into()]);
    settings.reconnect_delay = Duration::from_millis(50);
    settings.idle_timeout = Duration::from_secs(5);
    Arc::new(CertstreamSource::new(settings))
}

async fn next_event(rx: &mut EventReceiver) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no event received")
        .expect("queue closed")
}

#[tokio::test]
async fn reconnects_after_server_drops_connection() {
    let (url, accepted) = serve(|n, mut ws| async move {
        if n == 0 {
            ws.send(cert_update("paypal-login.com")).await.unwrap();
            // Dropping without a close handshake.
        } else {
            ws.send(cert_update("amazon-verify.net")).await.unwrap();
            hold(ws).await;
        }
    })
    .await;

    let src = source(&url);
    let (trigger, signal) = shutdown::channel();
    let (publisher, mut rx) = queue::bounded(16, Duration::from_secs(1));
    let runner = {
        let src = Arc::clone(&src);
        tokio::spawn(async move { src.start(signal, publisher).await })
    };

    let first = next_event(&mut rx).await;
    assert_eq!(first.domain(), "paypal-login.com");
    assert_eq!(first.metadata_strings("matched_keywords"), vec!["paypal"]);

    let second = next_event(&mut rx).await;
    assert_eq!(second.domain(), "amazon-verify.net");
    assert!(accepted.load(Ordering::SeqCst) >= 2);
    assert_eq!(src.state(), ConnectionState::Streaming);

    trigger.trigger();
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("source ignored cancellation")
        .unwrap()
        .unwrap();
    assert_eq!(src.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn idle_connection_is_recycled() {
    let (url, accepted) = serve(|_, ws| hold(ws)).await;

    let mut settings = CertstreamSettings::new(url, vec!["paypal".into()]);
    settings.reconnect_delay = Duration::from_millis(20);
    settings.idle_timeout = Duration::from_millis(100);
    let src = Arc::new(CertstreamSource::new(settings));

    let (trigger, signal) = shutdown::channel();
    let (publisher, _rx) = queue::bounded(4, Duration::from_secs(1));
    let runner = {
        let src = Arc::clone(&src);
        tokio::spawn(async move { src.start(signal, publisher).await })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while accepted.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("source never reconnected after idling");

    trigger.trigger();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn reconnect_delay_is_fixed() {
    let delay = Duration::from_millis(100);
    let connected: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));

    // Every connection is dropped right after the handshake.
    let log = Arc::clone(&connected);
    let (url, _) = serve(move |_, ws| {
        log.lock().unwrap().push(Instant::now());
        async move { drop(ws) }
    })
    .await;

    let mut settings = CertstreamSettings::new(url, vec!["paypal".into()]);
    settings.reconnect_delay = delay;
    let src = Arc::new(CertstreamSource::new(settings));

    let (trigger, signal) = shutdown::channel();
    let (publisher, _rx) = queue::bounded(4, Duration::from_secs(1));
    let runner = {
        let src = Arc::clone(&src);
        tokio::spawn(async move { src.start(signal, publisher).await })
    };

    tokio::time::timeout(Duration::from_secs(10), async {
        while connected.lock().unwrap().len() < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("source stopped reconnecting");
    trigger.trigger();
    runner.await.unwrap().unwrap();

    let stamps = connected.lock().unwrap().clone();
    let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps.len() >= 4);
    for gap in &gaps {
        assert!(*gap >= delay, "reconnected after {gap:?}, before the {delay:?} delay");
        assert!(*gap < delay * 3, "gap {gap:?} grew well past the delay");
    }
    let spread = gaps.iter().max().unwrap().saturating_sub(*gaps.iter().min().unwrap());
    assert!(spread < delay, "gaps are not constant: {gaps:?}");
}

#[tokio::test]
async fn pings_are_answered_and_noise_is_skipped() {
    let (url, _) = serve(|_, mut ws| async move {
        ws.send(Message::Ping(vec![7, 7])).await.unwrap();
        let pong = loop {
            match ws.next().await {
                Some(Ok(Message::Pong(payload))) => break payload,
                Some(Ok(_)) => continue,
                _ => panic!("client went away before answering ping"),
            }
        };
        assert_eq!(pong, vec![7, 7]);

        ws.send(Message::Text("{not json".into())).await.unwrap();
        ws.send(Message::Text(json!({"message_type": "heartbeat"}).to_string()))
            .await
            .unwrap();
        ws.send(cert_update("example.org")).await.unwrap();
        ws.send(cert_update("secure-paypal.io")).await.unwrap();
        hold(ws).await;
    })
    .await;

    let src = source(&url);
    let (trigger, signal) = shutdown::channel();
    let (publisher, mut rx) = queue::bounded(16, Duration::from_secs(1));
    let runner = {
        let src = Arc::clone(&src);
        tokio::spawn(async move { src.start(signal, publisher).await })
    };

    let ev = next_event(&mut rx).await;
    assert_eq!(ev.domain(), "secure-paypal.io");
    assert_eq!(ev.data["cn"], "secure-paypal.io");

    trigger.trigger();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn closed_queue_ends_the_source() {
    let (url, _) = serve(|_, mut ws| async move {
        for i in 0..50 {
            if ws.send(cert_update(&format!("paypal-{i}.com"))).await.is_err() {
                return;
            }
        }
        hold(ws).await;
    })
    .await;

    let src = source(&url);
    let (_trigger, signal) = shutdown::channel();
    let (publisher, rx) = queue::bounded(1, Duration::from_secs(1));
    drop(rx);

    tokio::time::timeout(Duration::from_secs(5), src.start(signal, publisher))
        .await
        .expect("source kept running after the queue closed")
        .unwrap();
}
