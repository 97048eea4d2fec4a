//! Drives a real listener over TCP with `reqwest`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dispatch::{sign, Delivery, EventDispatcher, SecretKey, SignatureAlgorithm};
use listener::{serve, serve_on, ListenerConfig, ListenerError};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};

#[tokio::test]
async fn live_listener_accepts_signed_delivery_and_shuts_down() {
    let secret = SecretKey::new("secret").unwrap();
    let dispatcher = Arc::new(
        EventDispatcher::new(secret.clone()).with_algorithm(SignatureAlgorithm::Sha256),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    dispatcher.register("push", move |delivery: &Delivery| {
        let _ = tx.send(delivery.clone());
    });

    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = socket.local_addr().unwrap();
    let config = ListenerConfig {
        path: "/hooks/github".to_owned(),
        ..ListenerConfig::default()
    };
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        serve_on(socket, dispatcher, &config, async move {
            let _ = stop_rx.await;
        })
        .await
    });

    let client = reqwest::Client::new();
    let url = format!("http://{address}/hooks/github");
    let body = br#"{"ref":"refs/heads/main"}"#.to_vec();

    let accepted = client
        .post(&url)
        .header("X-Hub-Signature-256", sign(SignatureAlgorithm::Sha256, &secret, &body))
        .header("X-GitHub-Event", "push")
        .header("X-GitHub-Delivery", "live-1")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), reqwest::StatusCode::OK);
    assert!(accepted.bytes().await.unwrap().is_empty());

    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("handler was not invoked in time")
        .expect("handler channel closed");
    assert_eq!(delivery.id.as_str(), "live-1");
    assert_eq!(delivery.body.as_ref(), body.as_slice());

    let rejected = client
        .post(&url)
        .header("X-Hub-Signature", sign(SignatureAlgorithm::Sha1, &secret, &body))
        .header("X-GitHub-Event", "push")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), reqwest::StatusCode::FORBIDDEN);

    let wrong_method = client.get(&url).send().await.unwrap();
    assert_eq!(wrong_method.status(), reqwest::StatusCode::NOT_FOUND);

    drop(client);
    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("listener did not shut down")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn serve_reports_bind_failures() {
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address: SocketAddr = occupied.local_addr().unwrap();
    let config = ListenerConfig {
        bind_address: address,
        ..ListenerConfig::default()
    };
    let dispatcher = Arc::new(EventDispatcher::new(SecretKey::new("secret").unwrap()));

    let result = serve(dispatcher, &config, std::future::ready(())).await;

    assert!(matches!(result, Err(ListenerError::Bind { address: a, .. }) if a == address));
}

#[tokio::test]
async fn serve_rejects_invalid_config_before_serving() {
    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ListenerConfig {
        path: "no-leading-slash".to_owned(),
        ..ListenerConfig::default()
    };
    let dispatcher = Arc::new(EventDispatcher::new(SecretKey::new("secret").unwrap()));

    let result = serve_on(socket, dispatcher, &config, std::future::ready(())).await;

    assert!(matches!(result, Err(ListenerError::InvalidPath { .. })));
}
