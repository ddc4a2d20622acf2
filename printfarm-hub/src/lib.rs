//! Live broadcast hub: fan-out of device events to viewers with late-join replay

pub mod hub;

pub use hub::{BroadcastHub, DevicePublisher, Frame, ViewerId, ViewerSender};
