use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use printfarm_core::models::DeviceDescriptor;
use printfarm_core::resilience::timeout::TimeoutConfig;
use printfarm_device::{DeviceError, DeviceLink, OctoPrintLink, SocketEvent};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn test_socket_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let device = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let auth = ws.next().await.unwrap().unwrap();
        ws.send(Message::Text(r#"{"current":{"state":{"text":"Operational"}}}"#.to_string()))
            .await
            .unwrap();
        ws.send(Message::Binary(br#"{"history":{}}"#.to_vec())).await.unwrap();

        // Keep reading so queued pongs get flushed
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
        auth
    });

    let descriptor = DeviceDescriptor::new("prusa", format!("http://{addr}"), "key");
    let link = OctoPrintLink::new(&descriptor, TimeoutConfig::default()).unwrap();
    let mut socket = link.open_socket().await.unwrap();

    socket.send_text(r#"{"auth":"_api:S"}"#.to_string()).await.unwrap();
    assert_eq!(
        socket.next_event().await.unwrap().unwrap(),
        SocketEvent::Text(r#"{"current":{"state":{"text":"Operational"}}}"#.to_string())
    );
    assert_eq!(
        socket.next_event().await.unwrap().unwrap(),
        SocketEvent::Text(r#"{"history":{}}"#.to_string())
    );

    socket.ping().await.unwrap();
    assert_eq!(socket.next_event().await.unwrap().unwrap(), SocketEvent::Pong);

    socket.close().await;
    let auth = tokio::time::timeout(Duration::from_secs(5), device).await.unwrap().unwrap();
    assert_eq!(auth, Message::Text(r#"{"auth":"_api:S"}"#.to_string()));
}

#[tokio::test]
async fn test_open_fails_without_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let descriptor = DeviceDescriptor::new("prusa", format!("http://{addr}"), "key");
    let link = OctoPrintLink::new(&descriptor, TimeoutConfig::default()).unwrap();
    let err = link.open_socket().await.err().unwrap();
    assert!(matches!(err, DeviceError::Socket(_) | DeviceError::Timeout(_)), "{err}");
}
