//! Seams between the session state machine and the device's wire protocol

use async_trait::async_trait;
use printfarm_core::models::{Orientation, PrinterColor};

use crate::Result;

/// What a handshake learns about the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    pub name: String,
    pub color: PrinterColor,
    /// Absolute camera stream URL; `None` when the device has no camera
    pub camera_url: Option<String>,
    pub orientation: Orientation,
}

/// Inbound traffic on an event socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Text(String),
    Pong,
}

/// REST handshake plus socket factory for one device
#[async_trait]
pub trait DeviceLink: Send + Sync {
    async fn fetch_settings(&self) -> Result<DeviceSettings>;

    /// Passive login; returns the credential to send as the socket's first frame
    async fn login(&self) -> Result<String>;

    async fn open_socket(&self) -> Result<Box<dyn EventSocket>>;
}

/// An open event socket
#[async_trait]
pub trait EventSocket: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;

    async fn ping(&mut self) -> Result<()>;

    /// Next inbound event; `None` once the socket is closed.
    ///
    /// Must be cancel-safe: dropping the future loses no data.
    async fn next_event(&mut self) -> Option<Result<SocketEvent>>;

    async fn close(&mut self);
}
