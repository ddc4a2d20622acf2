//! Data model shared by every component

pub mod device;
pub mod event;

pub use device::{DeviceDescriptor, Orientation, PrinterColor};
pub use event::{LiveEvent, SettingsSnapshot, StatusSnapshot};
