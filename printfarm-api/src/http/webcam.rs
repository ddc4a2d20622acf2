//! Webcam HLS endpoints
//!
//! Every asset lives directly under `/webcam/`:
//! - `{slug}.m3u8` - live playlist
//! - `init-{slug}.mp4` - initialization segment
//! - `{slug}{sequence}.m4s` - one fragment
//!
//! Slugs may end in digits, so a fragment name is split against the
//! registered slugs rather than at the first trailing digit.
//!
//! Assets that exist but are not produced yet answer 503 so players retry.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use bytes::Bytes;
use tracing::debug;

use crate::http::{AppError, AppResult, AppState};

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const MP4_CONTENT_TYPE: &str = "video/mp4";

const PLAYLIST_RETRY_AFTER: &str = "1.0";
const INIT_RETRY_AFTER: &str = "4.0";

/// A file name under `/webcam/`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebcamAsset<'a> {
    Playlist(&'a str),
    Initialization(&'a str),
    /// File stem of a fragment: slug and sequence still joined
    Fragment(&'a str),
}

impl<'a> WebcamAsset<'a> {
    #[must_use]
    pub fn parse(file: &'a str) -> Option<Self> {
        if let Some(slug) = file.strip_suffix(".m3u8") {
            return (!slug.is_empty()).then_some(Self::Playlist(slug));
        }
        if let Some(slug) = file.strip_prefix("init-").and_then(|rest| rest.strip_suffix(".mp4")) {
            return (!slug.is_empty()).then_some(Self::Initialization(slug));
        }
        let stem = file.strip_suffix(".m4s")?;
        stem.ends_with(|c: char| c.is_ascii_digit())
            .then_some(Self::Fragment(stem))
    }
}

pub fn create_webcam_router() -> Router<AppState> {
    Router::new().route("/webcam/{file}", get(handle_webcam))
}

async fn handle_webcam(Path(file): Path<String>, State(state): State<AppState>) -> AppResult<Response> {
    let asset = WebcamAsset::parse(&file)
        .ok_or_else(|| AppError::not_found(format!("Unknown webcam asset '{file}'")))?;

    if let WebcamAsset::Fragment(stem) = asset {
        let (slug, entry, sequence) = state
            .registry
            .resolve_fragment(stem)
            .ok_or_else(|| AppError::not_found(format!("Unknown webcam asset '{file}'")))?;
        let fragment = entry.relay.fragment(sequence).ok_or_else(|| {
            debug!(printer = %slug, sequence, "Fragment not retained");
            AppError::unavailable(format!("Fragment {sequence} not available"))
        })?;
        return media_response(MP4_CONTENT_TYPE, fragment.data);
    }

    let (WebcamAsset::Playlist(slug) | WebcamAsset::Initialization(slug)) = asset else {
        return Err(AppError::not_found(format!("Unknown webcam asset '{file}'")));
    };
    let entry = state
        .registry
        .get(slug)
        .ok_or_else(|| AppError::not_found(format!("Unknown printer '{slug}'")))?;

    match asset {
        WebcamAsset::Playlist(_) => {
            if !entry.session.has_camera() {
                return Err(AppError::not_found(format!("Printer '{slug}' has no camera")));
            }
            let playlist = entry
                .relay
                .playlist_with(|name| format!("/webcam/{name}"))
                .ok_or_else(|| {
                    AppError::unavailable("Playlist not ready").with_retry_after(PLAYLIST_RETRY_AFTER)
                })?;
            media_response(PLAYLIST_CONTENT_TYPE, Bytes::from(playlist))
        }
        _ => {
            let segment = entry.relay.initialization_segment().ok_or_else(|| {
                AppError::unavailable("Initialization segment not ready").with_retry_after(INIT_RETRY_AFTER)
            })?;
            media_response(MP4_CONTENT_TYPE, segment)
        }
    }
}

fn media_response(content_type: &'static str, data: Bytes) -> AppResult<Response> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(data))
        .map_err(|_| AppError::internal("Failed to build response"))
}
