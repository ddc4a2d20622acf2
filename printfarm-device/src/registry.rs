//! Registry: one session + relay per configured printer, in registration order

use std::sync::Arc;

use indexmap::IndexMap;
use printfarm_core::config::{RelayConfig, SessionConfig};
use printfarm_core::models::DeviceDescriptor;
use printfarm_core::resilience::timeout::TimeoutConfig;
use printfarm_core::Config;
use printfarm_hub::BroadcastHub;
use printfarm_livestream::{FfmpegLauncher, MediaRelay, TranscoderLauncher};
use tracing::{info, warn};

use crate::client::OctoPrintLink;
use crate::link::DeviceLink;
use crate::session::DeviceSession;
use crate::Result;

/// The pieces owned for one printer
#[derive(Clone)]
pub struct DeviceEntry {
    pub session: Arc<DeviceSession>,
    pub relay: Arc<MediaRelay>,
}

/// Maps slugs to their session and relay. Fixed once built.
pub struct DeviceRegistry {
    hub: Arc<BroadcastHub>,
    devices: IndexMap<String, DeviceEntry>,
}

impl DeviceRegistry {
    /// Build production links and ffmpeg relays for every configured printer
    pub fn from_config(config: &Config, hub: Arc<BroadcastHub>) -> Result<Self> {
        let timeouts = TimeoutConfig::new().with_http_timeout(config.session.request_timeout());
        let launcher: Arc<dyn TranscoderLauncher> = Arc::new(FfmpegLauncher::new(config.relay.clone()));

        let mut devices = Vec::with_capacity(config.printers.len());
        for descriptor in config.devices() {
            let link: Arc<dyn DeviceLink> = Arc::new(OctoPrintLink::new(&descriptor, timeouts)?);
            devices.push((descriptor, link));
        }

        Ok(Self::with_links(hub, &config.session, &config.relay, launcher, devices))
    }

    /// Build from explicit links; duplicate slugs after the first are ignored
    pub fn with_links(
        hub: Arc<BroadcastHub>,
        session_config: &SessionConfig,
        relay_config: &RelayConfig,
        launcher: Arc<dyn TranscoderLauncher>,
        devices: Vec<(DeviceDescriptor, Arc<dyn DeviceLink>)>,
    ) -> Self {
        let mut entries = IndexMap::with_capacity(devices.len());
        for (descriptor, link) in devices {
            if entries.contains_key(&descriptor.slug) {
                warn!(printer = %descriptor.slug, "Duplicate printer slug, ignoring");
                continue;
            }

            let slug = descriptor.slug.clone();
            let publisher = hub.register_device(slug.clone());
            let relay = Arc::new(MediaRelay::new(slug.clone(), relay_config, launcher.clone()));
            let session = Arc::new(DeviceSession::new(
                descriptor,
                link,
                publisher,
                relay.clone(),
                session_config.clone(),
            ));
            entries.insert(slug, DeviceEntry { session, relay });
        }

        Self { hub, devices: entries }
    }

    /// Start every session's connection loop
    pub fn start(&self) {
        for (slug, entry) in &self.devices {
            if entry.session.start() {
                info!(printer = %slug, "Device session started");
            }
        }
    }

    /// Stop every session and relay
    pub fn shutdown(&self) {
        for entry in self.devices.values() {
            entry.session.shutdown();
        }
    }

    #[must_use]
    pub fn get(&self, slug: &str) -> Option<&DeviceEntry> {
        self.devices.get(slug)
    }

    /// Split a fragment file stem (`{slug}{seq}`) into its printer and sequence.
    ///
    /// The longest registered slug followed only by digits wins.
    #[must_use]
    pub fn resolve_fragment(&self, stem: &str) -> Option<(&str, &DeviceEntry, u64)> {
        self.devices
            .iter()
            .filter_map(|(slug, entry)| {
                let digits = stem.strip_prefix(slug.as_str())?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let sequence = digits.parse().ok()?;
                Some((slug.as_str(), entry, sequence))
            })
            .max_by_key(|(slug, _, _)| slug.len())
    }

    /// Entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeviceEntry)> {
        self.devices.iter().map(|(slug, entry)| (slug.as_str(), entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }
}
