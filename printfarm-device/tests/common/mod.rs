//! In-memory device link for driving sessions under paused time

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use printfarm_core::config::{RelayConfig, SessionConfig};
use printfarm_core::models::{DeviceDescriptor, Orientation, PrinterColor};
use printfarm_device::{DeviceError, DeviceLink, DeviceSession, DeviceSettings, EventSocket, SocketEvent};
use printfarm_hub::BroadcastHub;
use printfarm_livestream::{MediaRelay, ProcessHandle, TranscodeRequest, TranscoderLauncher};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

/// What the fake device sends to the session
pub enum Inbound {
    Text(String),
    Close,
}

/// What the session sent to the fake device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Closed,
}

/// The device's end of one fake socket
pub struct RemoteEnd {
    pub inbound: mpsc::UnboundedSender<Inbound>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl RemoteEnd {
    pub fn send_text(&self, text: &str) {
        let _ = self.inbound.send(Inbound::Text(text.to_string()));
    }

    pub fn close(&self) {
        let _ = self.inbound.send(Inbound::Close);
    }

    /// Everything the session has sent so far
    pub fn sent(&mut self) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

pub struct FakeSocket {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<Outbound>,
    auto_pong: bool,
    pending_pongs: usize,
    stall_writes: Arc<AtomicBool>,
}

impl FakeSocket {
    async fn maybe_stall(&self) {
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl EventSocket for FakeSocket {
    async fn send_text(&mut self, text: String) -> printfarm_device::Result<()> {
        let _ = self.outbound.send(Outbound::Text(text));
        Ok(())
    }

    async fn ping(&mut self) -> printfarm_device::Result<()> {
        let _ = self.outbound.send(Outbound::Ping);
        self.maybe_stall().await;
        if self.auto_pong {
            self.pending_pongs += 1;
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<printfarm_device::Result<SocketEvent>> {
        if self.pending_pongs > 0 {
            self.pending_pongs -= 1;
            return Some(Ok(SocketEvent::Pong));
        }
        match self.inbound.recv().await {
            Some(Inbound::Text(text)) => Some(Ok(SocketEvent::Text(text))),
            Some(Inbound::Close) | None => None,
        }
    }

    async fn close(&mut self) {
        let _ = self.outbound.send(Outbound::Closed);
        self.maybe_stall().await;
    }
}

pub struct FakeLink {
    pub settings: Mutex<DeviceSettings>,
    pub fail_handshake: AtomicBool,
    pub auto_pong: bool,
    /// Pings and closes never complete while set
    pub stall_writes: Arc<AtomicBool>,
    remotes: mpsc::UnboundedSender<RemoteEnd>,
}

impl FakeLink {
    pub fn new(auto_pong: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Self {
            settings: Mutex::new(settings("Prusa MK3")),
            fail_handshake: AtomicBool::new(false),
            auto_pong,
            stall_writes: Arc::new(AtomicBool::new(false)),
            remotes: tx,
        };
        (Arc::new(link), rx)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_handshake.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceLink for FakeLink {
    async fn fetch_settings(&self) -> printfarm_device::Result<DeviceSettings> {
        if self.fail_handshake.load(Ordering::SeqCst) {
            return Err(DeviceError::Network("connection refused".to_string()));
        }
        Ok(self.settings.lock().clone())
    }

    async fn login(&self) -> printfarm_device::Result<String> {
        Ok("_api:SESSION".to_string())
    }

    async fn open_socket(&self) -> printfarm_device::Result<Box<dyn EventSocket>> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let _ = self.remotes.send(RemoteEnd {
            inbound: inbound_tx,
            outbound: outbound_rx,
        });
        Ok(Box::new(FakeSocket {
            inbound: inbound_rx,
            outbound: outbound_tx,
            auto_pong: self.auto_pong,
            pending_pongs: 0,
            stall_writes: self.stall_writes.clone(),
        }))
    }
}

/// Launcher whose transcoders never produce output and never exit
#[derive(Default)]
pub struct IdleLauncher {
    writers: Mutex<Vec<DuplexStream>>,
    pub requests: Mutex<Vec<TranscodeRequest>>,
}

#[async_trait]
impl TranscoderLauncher for IdleLauncher {
    async fn launch(&self, _printer: &str, request: &TranscodeRequest) -> printfarm_livestream::Result<ProcessHandle> {
        let (reader, writer) = tokio::io::duplex(64);
        self.writers.lock().push(writer);
        self.requests.lock().push(request.clone());
        Ok(ProcessHandle::new(reader, None))
    }
}

pub fn settings(name: &str) -> DeviceSettings {
    DeviceSettings {
        name: name.to_string(),
        color: PrinterColor::Orange,
        camera_url: None,
        orientation: Orientation::default(),
    }
}

pub fn session(
    slug: &str,
    link: Arc<FakeLink>,
    hub: &Arc<BroadcastHub>,
    launcher: Arc<IdleLauncher>,
) -> Arc<DeviceSession> {
    let publisher = hub.register_device(slug);
    let relay = Arc::new(MediaRelay::new(slug, &RelayConfig::default(), launcher));
    Arc::new(DeviceSession::new(
        DeviceDescriptor::new(slug, format!("http://{slug}.lan"), "key"),
        link,
        publisher,
        relay,
        SessionConfig::default(),
    ))
}
