//! OctoPrint-compatible REST client
//!
//! Only the two calls a handshake needs: `GET /api/settings` and a passive
//! `POST /api/login`.

use async_trait::async_trait;
use printfarm_core::models::{DeviceDescriptor, Orientation, PrinterColor};
use printfarm_core::resilience::timeout::TimeoutConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::error::{check_response, json_with_limit, DeviceError, Result};
use crate::link::{DeviceLink, DeviceSettings, EventSocket};
use crate::socket::{socket_url, TungsteniteSocket};

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Default, Deserialize)]
struct SettingsResponse {
    #[serde(default)]
    appearance: Appearance,
    #[serde(default)]
    webcam: Webcam,
}

#[derive(Debug, Default, Deserialize)]
struct Appearance {
    #[serde(default)]
    name: String,
    #[serde(default)]
    color: String,
}

#[derive(Debug, Default, Deserialize)]
struct Webcam {
    #[serde(default, rename = "streamUrl")]
    stream_url: Option<String>,
    #[serde(flatten)]
    orientation: Orientation,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    name: String,
    session: Option<String>,
}

/// Join `path` under the base address, keeping any sub-path the device is mounted at
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path)?)
}

/// REST client for one device
pub struct OctoPrintClient {
    base: Url,
    api_key: HeaderValue,
    client: Client,
}

impl OctoPrintClient {
    pub fn new(descriptor: &DeviceDescriptor, timeouts: TimeoutConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.http)
            .build()?;
        Self::with_client(descriptor, client)
    }

    /// Build on an existing (shared) reqwest client
    pub fn with_client(descriptor: &DeviceDescriptor, client: Client) -> Result<Self> {
        let mut api_key = HeaderValue::from_str(&descriptor.api_key)
            .map_err(|e| DeviceError::InvalidAddress(format!("api key: {e}")))?;
        api_key.set_sensitive(true);
        Ok(Self {
            base: descriptor.base_url()?,
            api_key,
            client,
        })
    }

    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, self.api_key.clone());
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Fetch display settings and camera configuration
    pub async fn settings(&self) -> Result<DeviceSettings> {
        let url = endpoint(&self.base, "api/settings")?;
        let response = self
            .client
            .get(url)
            .headers(self.build_headers())
            .send()
            .await?;
        let response = check_response(response)?;
        let settings: SettingsResponse = json_with_limit(response).await?;

        let camera_url = match settings.webcam.stream_url.as_deref().map(str::trim) {
            Some(stream) if !stream.is_empty() => Some(self.base.join(stream)?.to_string()),
            _ => None,
        };

        Ok(DeviceSettings {
            name: settings.appearance.name,
            color: PrinterColor::parse(&settings.appearance.color),
            camera_url,
            orientation: settings.webcam.orientation,
        })
    }

    /// Passive login, returning the `{name}:{session}` socket credential
    pub async fn passive_login(&self) -> Result<String> {
        let url = endpoint(&self.base, "api/login")?;
        let response = self
            .client
            .post(url)
            .headers(self.build_headers())
            .json(&json!({ "passive": true }))
            .send()
            .await?;
        let response = check_response(response)?;
        let login: LoginResponse = json_with_limit(response).await?;

        let session = login
            .session
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DeviceError::Parse("Missing session in login response".to_string()))?;
        Ok(format!("{}:{session}", login.name))
    }
}

/// Production [`DeviceLink`]: REST via reqwest, events via tungstenite
pub struct OctoPrintLink {
    client: OctoPrintClient,
    socket_url: Url,
    timeouts: TimeoutConfig,
}

impl OctoPrintLink {
    pub fn new(descriptor: &DeviceDescriptor, timeouts: TimeoutConfig) -> Result<Self> {
        let client = OctoPrintClient::new(descriptor, timeouts)?;
        let socket_url = socket_url(client.base())?;
        Ok(Self {
            client,
            socket_url,
            timeouts,
        })
    }

    #[must_use]
    pub fn socket_url(&self) -> &Url {
        &self.socket_url
    }
}

#[async_trait]
impl DeviceLink for OctoPrintLink {
    async fn fetch_settings(&self) -> Result<DeviceSettings> {
        self.client.settings().await
    }

    async fn login(&self) -> Result<String> {
        self.client.passive_login().await
    }

    async fn open_socket(&self) -> Result<Box<dyn EventSocket>> {
        let socket = TungsteniteSocket::connect(&self.socket_url, self.timeouts.socket_open).await?;
        Ok(Box::new(socket))
    }
}
