use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use waypost_core::app::{AppBuilder, Connectivity, ConnectivitySignal};
use waypost_core::domain::{
    CapturedRequest, CoordinateField, DeliveryError, InterceptError, OutcomeKind, Submission,
    SubmitError, SubmitOutcome, ValidationError,
};
use waypost_core::impls::{
    HttpTransport, HttpTransportConfig, InMemoryQueue, ScriptedTransport, SqliteQueue,
    open_connection,
};
use waypost_core::ports::{DurableQueue, iterate};

#[tokio::test]
async fn reachable_endpoint_delivers_directly() {
    let store = Arc::new(InMemoryQueue::<Submission>::new());
    let transport = Arc::new(ScriptedTransport::reachable());
    let app = AppBuilder::new()
        .submission_store(store.clone())
        .request_queue(Arc::new(InMemoryQueue::new()))
        .transport(transport.clone())
        .build()
        .unwrap();

    let outcome = app.submit(-6.2, 106.8).await.unwrap();

    assert_eq!(outcome.kind(), OutcomeKind::Delivered);
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn queued_submission_survives_restart_and_drains_later() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("waypost.db");
    let transport = Arc::new(ScriptedTransport::unreachable());

    {
        let conn = open_connection(&db).await.unwrap();
        let app = AppBuilder::new()
            .submission_store(Arc::new(
                SqliteQueue::<Submission>::attach(conn.clone(), "offline_locations")
                    .await
                    .unwrap(),
            ))
            .request_queue(Arc::new(
                SqliteQueue::<CapturedRequest>::attach(conn, "intercepted_requests")
                    .await
                    .unwrap(),
            ))
            .transport(transport.clone())
            .build()
            .unwrap();

        let outcome = app.submit(-6.2, 106.8).await.unwrap();
        assert_eq!(outcome.kind(), OutcomeKind::Queued);
    }

    // process restart
    let conn = open_connection(&db).await.unwrap();
    let store = Arc::new(
        SqliteQueue::<Submission>::attach(conn.clone(), "offline_locations")
            .await
            .unwrap(),
    );
    let entries = iterate(&*store).collect().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].1.location.lat, -6.2);
    assert_eq!(entries[0].1.location.lng, 106.8);

    let signal = ConnectivitySignal::new(Connectivity::Offline);
    let app = AppBuilder::new()
        .submission_store(store.clone())
        .request_queue(Arc::new(
            SqliteQueue::<CapturedRequest>::attach(conn, "intercepted_requests")
                .await
                .unwrap(),
        ))
        .transport(transport.clone())
        .signal(signal.clone())
        .build()
        .unwrap();

    transport.set_reachable(true);
    signal.notify_online();
    let pass = app.drain().await.unwrap();

    assert_eq!(pass.report().unwrap().delivered, 1);
    assert!(store.is_empty().await.unwrap());
    assert_eq!(transport.delivered()[0].location.lng, 106.8);
}

#[tokio::test]
async fn out_of_range_latitude_is_rejected_without_side_effects() {
    let store = Arc::new(InMemoryQueue::<Submission>::new());
    let transport = Arc::new(ScriptedTransport::reachable());
    let app = AppBuilder::new()
        .submission_store(store.clone())
        .request_queue(Arc::new(InMemoryQueue::new()))
        .transport(transport.clone())
        .build()
        .unwrap();

    let err = app.submit(200.0, 106.8).await.unwrap_err();

    match err {
        SubmitError::Validation(e @ ValidationError::OutOfRange { .. }) => {
            assert_eq!(e.field(), CoordinateField::Latitude)
        }
        other => panic!("expected a latitude validation error, got {other:?}"),
    }
    assert!(store.is_empty().await.unwrap());
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn intercepted_requests_stay_out_of_the_submission_store() {
    let store = Arc::new(InMemoryQueue::<Submission>::new());
    let requests = Arc::new(InMemoryQueue::<CapturedRequest>::new());
    let transport = Arc::new(ScriptedTransport::unreachable());
    let app = AppBuilder::new()
        .submission_store(store.clone())
        .request_queue(requests.clone())
        .transport(transport.clone())
        .build()
        .unwrap();

    let request = CapturedRequest::new("POST", "http://localhost:3000/api/locations", Utc::now())
        .with_header("Content-Type", "application/json")
        .with_body(br#"{"lat":-6.2,"lng":106.8}"#.to_vec());
    let err = app.fetch(request.clone()).await.unwrap_err();
    assert!(matches!(err, InterceptError::Queued { .. }));
    assert!(store.is_empty().await.unwrap());
    assert_eq!(requests.len().await.unwrap(), 1);

    transport.set_reachable(true);
    let pass = app.replay().await.unwrap();
    assert_eq!(pass.report().unwrap().delivered, 1);
    assert_eq!(transport.forwarded(), vec![request]);
    assert!(requests.is_empty().await.unwrap());
}

/// Accepts one connection, reads the whole request, waits `delay`, then
/// answers 201 with an accepting body.
async fn slow_endpoint(delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }

        tokio::time::sleep(delay).await;
        let body = r#"{"success":true,"locationId":"abc"}"#;
        let response = format!(
            "HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });
    addr
}

fn http_app(addr: SocketAddr, store: Arc<InMemoryQueue<Submission>>) -> waypost_core::Waypost {
    let transport = HttpTransport::new(HttpTransportConfig {
        endpoint: format!("http://{addr}/api/locations"),
        ..Default::default()
    })
    .unwrap();
    AppBuilder::new()
        .submission_store(store)
        .request_queue(Arc::new(InMemoryQueue::new()))
        .transport(Arc::new(transport))
        .timeout(Duration::from_millis(500))
        .build()
        .unwrap()
}

#[tokio::test]
async fn per_call_timeout_overrides_a_shorter_client_timeout() {
    let addr = slow_endpoint(Duration::from_millis(1500)).await;
    let store = Arc::new(InMemoryQueue::<Submission>::new());
    let app = http_app(addr, store.clone());

    let outcome = app
        .submit_with_timeout(-6.2, 106.8, Duration::from_secs(10))
        .await
        .unwrap();

    match outcome {
        SubmitOutcome::Delivered(receipt) => {
            assert_eq!(receipt.location_id.as_deref(), Some("abc"))
        }
        other => panic!("expected delivery, got {other:?}"),
    }
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn slow_endpoint_past_the_deadline_is_queued_with_that_deadline() {
    let addr = slow_endpoint(Duration::from_secs(3)).await;
    let store = Arc::new(InMemoryQueue::<Submission>::new());
    let app = http_app(addr, store.clone());

    let outcome = app.submit(-6.2, 106.8).await.unwrap();

    match outcome {
        SubmitOutcome::Queued { reason, .. } => {
            assert_eq!(reason, DeliveryError::Timeout(Duration::from_millis(500)))
        }
        other => panic!("expected a queued outcome, got {other:?}"),
    }
    assert_eq!(store.len().await.unwrap(), 1);
}
