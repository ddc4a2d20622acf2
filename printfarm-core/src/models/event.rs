use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::device::{Orientation, PrinterColor};
use crate::Result;

/// Latest settings of one device, produced by each successful handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub printer: String,
    pub name: String,
    pub color: PrinterColor,
    pub webcam: Orientation,
}

/// Last status-bearing event of one device.
///
/// `msg` is the device's payload passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub printer: String,
    pub msg: Value,
}

impl StatusSnapshot {
    /// Whether a raw device event carries status data (`current` or `history`).
    #[must_use]
    pub fn is_status_bearing(payload: &Value) -> bool {
        payload
            .as_object()
            .is_some_and(|obj| obj.contains_key("current") || obj.contains_key("history"))
    }
}

/// Event delivered to live viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LiveEvent {
    Settings(SettingsSnapshot),
    Status(StatusSnapshot),
}

impl LiveEvent {
    #[must_use]
    pub fn printer(&self) -> &str {
        match self {
            Self::Settings(s) => &s.printer,
            Self::Status(s) => &s.printer,
        }
    }

    /// Encode once for fan-out to any number of viewers
    pub fn encode(&self) -> Result<Arc<str>> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }
}

impl From<SettingsSnapshot> for LiveEvent {
    fn from(value: SettingsSnapshot) -> Self {
        Self::Settings(value)
    }
}

impl From<StatusSnapshot> for LiveEvent {
    fn from(value: StatusSnapshot) -> Self {
        Self::Status(value)
    }
}
