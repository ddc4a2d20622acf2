//! Registry built on scripted device links and a canned transcoder

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use printfarm_core::config::{RelayConfig, SessionConfig};
use printfarm_core::models::{DeviceDescriptor, Orientation, PrinterColor};
use printfarm_device::{
    ConnectionState, DeviceLink, DeviceRegistry, DeviceSettings, EventSocket, SocketEvent,
};
use printfarm_hub::BroadcastHub;
use printfarm_livestream::{ProcessHandle, TranscodeRequest, TranscoderLauncher};
use tokio::io::AsyncWriteExt;

pub const STATUS: &str = r#"{"current":{"state":{"text":"Printing"}}}"#;

/// Device that answers pings and replays a fixed script of frames
pub struct ScriptedLink {
    settings: DeviceSettings,
    script: Vec<String>,
}

struct ScriptedSocket {
    inbound: VecDeque<String>,
    pongs: usize,
}

#[async_trait]
impl EventSocket for ScriptedSocket {
    async fn send_text(&mut self, _text: String) -> printfarm_device::Result<()> {
        Ok(())
    }

    async fn ping(&mut self) -> printfarm_device::Result<()> {
        self.pongs += 1;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<printfarm_device::Result<SocketEvent>> {
        if self.pongs > 0 {
            self.pongs -= 1;
            return Some(Ok(SocketEvent::Pong));
        }
        if let Some(text) = self.inbound.pop_front() {
            return Some(Ok(SocketEvent::Text(text)));
        }
        std::future::pending().await
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl DeviceLink for ScriptedLink {
    async fn fetch_settings(&self) -> printfarm_device::Result<DeviceSettings> {
        Ok(self.settings.clone())
    }

    async fn login(&self) -> printfarm_device::Result<String> {
        Ok("_api:SESSION".to_string())
    }

    async fn open_socket(&self) -> printfarm_device::Result<Box<dyn EventSocket>> {
        Ok(Box::new(ScriptedSocket {
            inbound: self.script.iter().cloned().collect(),
            pongs: 0,
        }))
    }
}

pub fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

/// ftyp + moov followed by `fragments` moof/mdat pairs
pub fn canned_stream(fragments: usize) -> Vec<u8> {
    let mut out = mp4_box(b"ftyp", b"isom");
    out.extend(mp4_box(b"moov", b"MOOV"));
    for i in 0..fragments {
        out.extend(mp4_box(b"moof", &[i as u8; 4]));
        out.extend(mp4_box(b"mdat", &[0, 0, 0, 3, 0x65, 0xAA, 0xBB]));
    }
    out
}

/// Transcoder that writes a fixed stream and then stays silent
pub struct CannedLauncher {
    stream: Vec<u8>,
}

#[async_trait]
impl TranscoderLauncher for CannedLauncher {
    async fn launch(&self, _printer: &str, _request: &TranscodeRequest) -> printfarm_livestream::Result<ProcessHandle> {
        let (reader, mut writer) = tokio::io::duplex(64 * 1024);
        let stream = self.stream.clone();
        tokio::spawn(async move {
            let _ = writer.write_all(&stream).await;
            std::future::pending::<()>().await;
        });
        Ok(ProcessHandle::new(reader, None))
    }
}

pub struct Device {
    pub slug: &'static str,
    pub name: &'static str,
    pub camera: bool,
    pub script: Vec<String>,
}

impl Device {
    pub fn new(slug: &'static str, name: &'static str, camera: bool) -> Self {
        Self {
            slug,
            name,
            camera,
            script: Vec::new(),
        }
    }

    pub fn with_status(mut self) -> Self {
        self.script.push(STATUS.to_string());
        self
    }
}

pub fn registry(devices: Vec<Device>, fragments: usize) -> Arc<DeviceRegistry> {
    let hub = Arc::new(BroadcastHub::new());
    let links = devices
        .into_iter()
        .map(|device| {
            let settings = DeviceSettings {
                name: device.name.to_string(),
                color: PrinterColor::Green,
                camera_url: device
                    .camera
                    .then(|| format!("http://{}.lan/webcam/?action=stream", device.slug)),
                orientation: Orientation::default(),
            };
            let link: Arc<dyn DeviceLink> = Arc::new(ScriptedLink {
                settings,
                script: device.script,
            });
            (
                DeviceDescriptor::new(device.slug, format!("http://{}.lan", device.slug), "key"),
                link,
            )
        })
        .collect();

    Arc::new(DeviceRegistry::with_links(
        hub,
        &SessionConfig::default(),
        &RelayConfig::default(),
        Arc::new(CannedLauncher {
            stream: canned_stream(fragments),
        }),
        links,
    ))
}

/// Wait until a session reaches `expected`
pub async fn wait_for_state(registry: &DeviceRegistry, slug: &str, expected: ConnectionState) {
    let session = &registry.get(slug).unwrap().session;
    session
        .watch_state()
        .wait_for(|state| *state == expected)
        .await
        .unwrap();
}

/// Wait until a relay has stored `count` fragments
pub async fn wait_for_fragments(registry: &DeviceRegistry, slug: &str, count: u64) {
    let relay = &registry.get(slug).unwrap().relay;
    tokio::time::timeout(Duration::from_secs(5), async {
        while relay.status().last_sequence.map_or(true, |last| last + 1 < count) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
