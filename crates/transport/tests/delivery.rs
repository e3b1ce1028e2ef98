use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use footfall_transport::{
    Beacon, Delivery, Emitter, FetchTransport, QueuedTransport, RecordingTransport,
    TransportConfig,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout, Duration};

type Received = Arc<Mutex<Vec<String>>>;

async fn collect(State(received): State<Received>, body: String) -> StatusCode {
    received.lock().push(body);
    StatusCode::NO_CONTENT
}

async fn collector() -> (String, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/collect", post(collect))
        .with_state(received.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{}/collect", addr), received)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queued_beacons_are_delivered_before_shutdown_completes() {
    let (endpoint, received) = collector().await;
    let (transport, worker) = QueuedTransport::spawn(&TransportConfig::default()).unwrap();
    let emitter = Emitter::new(Arc::new(transport));

    for n in 0..3 {
        let delivery = emitter.emit(&Beacon::new(&endpoint, format!("{{\"n\":{}}}", n)));
        assert_eq!(delivery, Delivery::Primary);
    }
    worker.shutdown().await.unwrap();

    let bodies = received.lock().clone();
    assert_eq!(bodies, vec!["{\"n\":0}", "{\"n\":1}", "{\"n\":2}"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_fallback_delivers_when_queue_is_closed() {
    let (endpoint, received) = collector().await;
    let (queued, worker) = QueuedTransport::spawn(&TransportConfig::default()).unwrap();
    worker.shutdown().await.unwrap();

    let fetch = FetchTransport::new(&TransportConfig::default()).unwrap();
    let emitter = Emitter::with_fallback(Arc::new(queued), Arc::new(fetch));
    assert_eq!(
        emitter.emit(&Beacon::new(&endpoint, "{\"event_type\":\"pageview\"}")),
        Delivery::Fallback
    );

    timeout(Duration::from_secs(5), async {
        while received.lock().is_empty() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("fallback delivery");
}

#[test]
fn recording_transport_keeps_order() {
    let recording = RecordingTransport::new();
    let emitter = Emitter::new(Arc::new(recording.clone()));
    emitter.emit(&Beacon::new("a", "1"));
    emitter.emit(&Beacon::new("a", "2"));
    let bodies: Vec<String> = recording.drain().into_iter().map(|b| b.body).collect();
    assert_eq!(bodies, vec!["1", "2"]);
    assert!(recording.is_empty());
}
