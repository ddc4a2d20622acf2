use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use printfarm_core::models::{LiveEvent, SettingsSnapshot, StatusSnapshot};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One encoded event, shared by every viewer it is sent to
pub type Frame = Arc<str>;

/// Outbound channel of one viewer
pub type ViewerSender = mpsc::Sender<Frame>;

/// Handle for an attached viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewerId(u64);

impl std::fmt::Display for ViewerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "viewer-{}", self.0)
    }
}

/// Snapshots of one device, kept with their encoded form so a replay is
/// byte-identical to the original publish.
#[derive(Default)]
struct DeviceSlot {
    settings: Option<(SettingsSnapshot, Frame)>,
    status: Option<(StatusSnapshot, Frame)>,
}

#[derive(Default)]
struct HubState {
    /// Registration order is replay order
    devices: IndexMap<String, DeviceSlot>,
    viewers: IndexMap<ViewerId, ViewerSender>,
}

impl HubState {
    /// Best-effort fan-out. Full viewers miss this frame, closed ones are dropped.
    fn fan_out(&mut self, printer: &str, frame: &Frame) -> usize {
        let mut sent_count = 0;
        self.viewers.retain(|viewer_id, sender| match sender.try_send(frame.clone()) {
            Ok(()) => {
                sent_count += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(
                    printer = %printer,
                    viewer = %viewer_id,
                    "Viewer channel full, skipping event"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(viewer = %viewer_id, "Viewer channel closed, removing");
                false
            }
        });
        sent_count
    }
}

/// In-memory hub routing device events to every connected viewer.
///
/// Attach, detach and publish are serialized by one lock, so a viewer that
/// attaches mid-stream sees either the replayed snapshot or the live event,
/// never neither and never both.
#[derive(Default)]
pub struct BroadcastHub {
    state: Mutex<HubState>,
    next_viewer: AtomicU64,
}

impl BroadcastHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. Replay visits devices in registration order.
    ///
    /// Registering a slug twice returns a second publisher for the same slot.
    pub fn register_device(self: &Arc<Self>, printer: impl Into<String>) -> DevicePublisher {
        let printer = printer.into();
        self.state
            .lock()
            .devices
            .entry(printer.clone())
            .or_default();
        DevicePublisher {
            hub: Arc::clone(self),
            printer,
        }
    }

    /// Attach a viewer and replay current state to it.
    ///
    /// For each registered device the settings snapshot (if any) is sent,
    /// followed by its status snapshot (if any).
    pub fn attach(&self, sender: ViewerSender) -> ViewerId {
        let viewer_id = ViewerId(self.next_viewer.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.lock();

        let mut replayed = 0usize;
        for slot in state.devices.values() {
            let frames = slot
                .settings
                .as_ref()
                .map(|(_, frame)| frame)
                .into_iter()
                .chain(slot.status.as_ref().map(|(_, frame)| frame));
            for frame in frames {
                if sender.try_send(frame.clone()).is_ok() {
                    replayed += 1;
                } else {
                    warn!(viewer = %viewer_id, "Viewer could not take replay frame");
                }
            }
        }

        state.viewers.insert(viewer_id, sender);
        info!(
            viewer = %viewer_id,
            replayed,
            viewers = state.viewers.len(),
            "Viewer attached"
        );
        viewer_id
    }

    /// Remove a viewer. Unknown ids are ignored.
    pub fn detach(&self, viewer_id: ViewerId) {
        let mut state = self.state.lock();
        if state.viewers.shift_remove(&viewer_id).is_some() {
            info!(viewer = %viewer_id, viewers = state.viewers.len(), "Viewer detached");
        } else {
            debug!(viewer = %viewer_id, "Viewer already detached");
        }
    }

    /// Fan an event out to every attached viewer without touching snapshots.
    ///
    /// Returns the number of viewers that accepted it.
    pub fn publish(&self, event: &LiveEvent) -> usize {
        let Some(frame) = encode(event) else {
            return 0;
        };
        self.state.lock().fan_out(event.printer(), &frame)
    }

    #[must_use]
    pub fn viewer_count(&self) -> usize {
        self.state.lock().viewers.len()
    }

    fn settings(&self, printer: &str) -> Option<SettingsSnapshot> {
        self.state
            .lock()
            .devices
            .get(printer)
            .and_then(|slot| slot.settings.as_ref().map(|(s, _)| s.clone()))
    }

    fn status(&self, printer: &str) -> Option<StatusSnapshot> {
        self.state
            .lock()
            .devices
            .get(printer)
            .and_then(|slot| slot.status.as_ref().map(|(s, _)| s.clone()))
    }
}

fn encode(event: &LiveEvent) -> Option<Frame> {
    match event.encode() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(printer = %event.printer(), error = %e, "Failed to encode event");
            None
        }
    }
}

/// A device's handle into the hub. Holds the only write access to that
/// device's snapshots.
#[derive(Clone)]
pub struct DevicePublisher {
    hub: Arc<BroadcastHub>,
    printer: String,
}

impl DevicePublisher {
    #[must_use]
    pub fn printer(&self) -> &str {
        &self.printer
    }

    /// Publish the settings of a fresh handshake.
    ///
    /// Supersedes the previous settings and clears the last status, since it
    /// belonged to the previous connection.
    pub fn publish_settings(&self, settings: SettingsSnapshot) -> usize {
        let event = LiveEvent::Settings(settings);
        let Some(frame) = encode(&event) else {
            return 0;
        };
        let LiveEvent::Settings(settings) = event else {
            return 0;
        };

        let mut state = self.hub.state.lock();
        let slot = state.devices.entry(self.printer.clone()).or_default();
        slot.settings = Some((settings, frame.clone()));
        slot.status = None;
        state.fan_out(&self.printer, &frame)
    }

    /// Publish a raw device event wrapped as a status envelope.
    ///
    /// Only status-bearing payloads replace the stored snapshot. Returns
    /// whether the payload was status-bearing.
    pub fn publish_event(&self, payload: Value) -> bool {
        let status_bearing = StatusSnapshot::is_status_bearing(&payload);
        let event = LiveEvent::Status(StatusSnapshot {
            printer: self.printer.clone(),
            msg: payload,
        });
        let Some(frame) = encode(&event) else {
            return status_bearing;
        };

        let mut state = self.hub.state.lock();
        if status_bearing {
            if let LiveEvent::Status(status) = event {
                let slot = state.devices.entry(self.printer.clone()).or_default();
                slot.status = Some((status, frame.clone()));
            }
        }
        state.fan_out(&self.printer, &frame);
        status_bearing
    }

    #[must_use]
    pub fn current_settings(&self) -> Option<SettingsSnapshot> {
        self.hub.settings(&self.printer)
    }

    #[must_use]
    pub fn current_status(&self) -> Option<StatusSnapshot> {
        self.hub.status(&self.printer)
    }
}
