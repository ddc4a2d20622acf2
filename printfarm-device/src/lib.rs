//! Printer connections: REST/WebSocket client, per-device sessions and the registry

pub mod client;
pub mod error;
pub mod link;
pub mod registry;
pub mod session;
pub mod socket;

pub use client::{OctoPrintClient, OctoPrintLink};
pub use error::{DeviceError, Result};
pub use link::{DeviceLink, DeviceSettings, EventSocket, SocketEvent};
pub use registry::{DeviceEntry, DeviceRegistry};
pub use session::{ConnectionState, DeviceSession, SessionInput};
