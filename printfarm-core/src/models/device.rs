use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// One configured printer. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub slug: String,
    pub address: String,
    pub api_key: String,
}

impl DeviceDescriptor {
    pub fn new(slug: impl Into<String>, address: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            address: address.into(),
            api_key: api_key.into(),
        }
    }

    /// Parsed base address of the device
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.address)
            .map_err(|e| Error::InvalidInput(format!("{}: {e}", self.address)))
    }
}

/// Camera orientation flags, applied by the transcoder at relay start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Orientation {
    #[serde(default)]
    pub flip_h: bool,
    #[serde(default)]
    pub flip_v: bool,
    #[serde(default, rename = "rotate90")]
    pub rotate_90: bool,
}

impl Orientation {
    /// Video filters that realize this orientation, in application order
    #[must_use]
    pub fn filters(&self) -> Vec<&'static str> {
        let mut filters = Vec::new();
        if self.flip_h {
            filters.push("hflip");
        }
        if self.flip_v {
            filters.push("vflip");
        }
        if self.rotate_90 {
            filters.push("transpose=2");
        }
        filters
    }
}

/// Display color a device reports for itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterColor {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Violet,
    Black,
    White,
    #[default]
    Default,
}

impl PrinterColor {
    /// Lenient parse: anything unrecognized is `Default`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "red" => Self::Red,
            "orange" => Self::Orange,
            "yellow" => Self::Yellow,
            "green" => Self::Green,
            "blue" => Self::Blue,
            "violet" => Self::Violet,
            "black" => Self::Black,
            "white" => Self::White,
            _ => Self::Default,
        }
    }
}
