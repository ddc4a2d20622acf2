use config::{Config as ConfigBuilder, Environment, File};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::models::DeviceDescriptor;
use crate::Result;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub session: SessionConfig,
    pub relay: RelayConfig,
    /// Configured printers keyed by slug, in file order
    pub printers: IndexMap<String, PrinterConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 1234,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Timers driving each device connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub retry_delay_ms: u64,
    pub ping_interval_ms: u64,
    pub pong_timeout_ms: u64,
    pub status_watchdog_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 5_000,
            ping_interval_ms: 10_000,
            pong_timeout_ms: 20_000,
            status_watchdog_ms: 30_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub const fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    #[must_use]
    pub const fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    #[must_use]
    pub const fn status_watchdog(&self) -> Duration {
        Duration::from_millis(self.status_watchdog_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Webcam relay (transcoder + fragment store) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub ffmpeg_path: String,
    pub restart_delay_ms: u64,
    /// Fragments listed in the playlist
    pub playlist_size: usize,
    /// Fragments kept in memory beyond the playlist window
    pub playlist_extra: usize,
    pub width: u32,
    pub height: u32,
    pub crf: u32,
    pub fragment_duration_us: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            restart_delay_ms: 5_000,
            playlist_size: 4,
            playlist_extra: 0,
            width: 640,
            height: 480,
            crf: 36,
            fragment_duration_us: 6_000_000,
        }
    }
}

impl RelayConfig {
    #[must_use]
    pub const fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Total number of fragments retained by the store
    #[must_use]
    pub const fn retained_fragments(&self) -> usize {
        self.playlist_size + self.playlist_extra
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub address: String,
    pub apikey: String,
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // PRINTFARM_SERVER__HTTP_PORT=8080, PRINTFARM_LOGGING__LEVEL=debug, ...
        builder = builder.add_source(
            Environment::with_prefix("PRINTFARM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Device descriptors in registration (file) order
    #[must_use]
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.printers
            .iter()
            .map(|(slug, printer)| DeviceDescriptor {
                slug: slug.clone(),
                address: printer.address.clone(),
                api_key: printer.apikey.clone(),
            })
            .collect()
    }

    /// Check the configuration for values the server cannot run with.
    ///
    /// Returns every problem found rather than stopping at the first one.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.printers.is_empty() {
            errors.push("No printers configured".to_string());
        }

        for (slug, printer) in &self.printers {
            if !is_valid_slug(slug) {
                errors.push(format!(
                    "Printer slug '{slug}' must be non-empty and must not contain '/' or whitespace"
                ));
            }
            if let Some(other) = self.printers.keys().find(|other| is_fragment_prefix(other, slug)) {
                errors.push(format!(
                    "Printer slug '{slug}' is '{other}' followed by digits, so their fragment names collide"
                ));
            }
            match url::Url::parse(&printer.address) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => errors.push(format!(
                    "Printer '{slug}' address must be http(s), got scheme '{}'",
                    url.scheme()
                )),
                Err(e) => errors.push(format!(
                    "Printer '{slug}' address '{}' is not a valid URL: {e}",
                    printer.address
                )),
            }
            if printer.apikey.is_empty() {
                errors.push(format!("Printer '{slug}' has an empty apikey"));
            }
        }

        let session = &self.session;
        if session.retry_delay_ms == 0
            || session.ping_interval_ms == 0
            || session.status_watchdog_ms == 0
            || session.request_timeout_ms == 0
        {
            errors.push("Session timers must be greater than zero".to_string());
        }
        if session.pong_timeout_ms <= session.ping_interval_ms {
            errors.push(format!(
                "session.pong_timeout_ms ({}) must exceed session.ping_interval_ms ({})",
                session.pong_timeout_ms, session.ping_interval_ms
            ));
        }

        if !(2..=20).contains(&self.relay.playlist_size) {
            errors.push(format!(
                "relay.playlist_size must be between 2 and 20, got {}",
                self.relay.playlist_size
            ));
        }
        if self.relay.playlist_extra > 10 {
            errors.push(format!(
                "relay.playlist_extra must be between 0 and 10, got {}",
                self.relay.playlist_extra
            ));
        }
        if self.relay.restart_delay_ms == 0 {
            errors.push("relay.restart_delay_ms must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Slugs appear as a single path segment under `/webcam/`.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && !slug.chars().any(|c| c == '/' || c.is_whitespace())
}

/// True when `slug` is `prefix` plus one or more digits. Fragment files are
/// named `{slug}{seq}.m4s`, so such a pair cannot be told apart.
fn is_fragment_prefix(prefix: &str, slug: &str) -> bool {
    slug.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}
