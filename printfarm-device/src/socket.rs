//! Device event socket over tokio-tungstenite

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::client::endpoint;
use crate::error::{DeviceError, Result};
use crate::link::{EventSocket, SocketEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Event endpoint for a device base address (`http` → `ws`, `https` → `wss`)
pub fn socket_url(base: &Url) -> Result<Url> {
    let mut url = endpoint(base, "sockjs/websocket")?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(DeviceError::InvalidAddress(format!(
                "unsupported scheme '{other}'"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| DeviceError::InvalidAddress(format!("cannot switch {url} to {scheme}")))?;
    Ok(url)
}

pub struct TungsteniteSocket {
    stream: WsStream,
}

impl TungsteniteSocket {
    pub async fn connect(url: &Url, open_timeout: Duration) -> Result<Self> {
        let (stream, _) = tokio::time::timeout(open_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| DeviceError::Timeout(format!("opening {url}")))??;
        Ok(Self { stream })
    }
}

#[async_trait]
impl EventSocket for TungsteniteSocket {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        self.stream.send(Message::Ping(Vec::new())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<SocketEvent>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };
            match message {
                Message::Text(text) => return Some(Ok(SocketEvent::Text(text))),
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(SocketEvent::Text(text))),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                Message::Pong(_) => return Some(Ok(SocketEvent::Pong)),
                Message::Close(frame) => {
                    debug!(?frame, "Device closed socket");
                    return None;
                }
                // Pings are answered by tungstenite on the next write/flush
                Message::Ping(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "Error while closing socket");
        }
    }
}
