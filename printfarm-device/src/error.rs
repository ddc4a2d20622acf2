//! Device client error types

use thiserror::Error;

/// Largest REST response body accepted from a device (2 MiB)
const MAX_RESPONSE_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status} for {url}")]
    Http { status: reqwest::StatusCode, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Socket error: {0}")]
    Socket(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Check HTTP response status before processing body.
pub fn check_response(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        return Err(DeviceError::Http {
            status,
            url: resp.url().to_string(),
        });
    }
    Ok(resp)
}

/// Read a JSON body, refusing oversized responses.
pub async fn json_with_limit<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if let Some(cl) = response.content_length() {
        if cl as usize > MAX_RESPONSE_SIZE {
            return Err(DeviceError::Parse(format!("response of {cl} bytes is too large")));
        }
    }
    let bytes = response.bytes().await?;
    if bytes.len() > MAX_RESPONSE_SIZE {
        return Err(DeviceError::Parse(format!(
            "response of {} bytes is too large",
            bytes.len()
        )));
    }
    serde_json::from_slice(&bytes).map_err(Into::into)
}

impl From<reqwest::Error> for DeviceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DeviceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DeviceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(err.to_string())
    }
}

impl From<url::ParseError> for DeviceError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}

impl From<printfarm_core::Error> for DeviceError {
    fn from(err: printfarm_core::Error) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}
