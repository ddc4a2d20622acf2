//! Webcam relay: supervises a transcoder and serves its output as HLS fMP4
//!
//! ```text
//! camera ──> ffmpeg (fMP4 on stdout) ──> Mp4Fragmenter ──> FragmentStore
//!                                                              │
//!                                   HTTP: init / playlist / fragment
//! ```

pub mod error;
pub mod fragment;
pub mod relay;

pub use error::{RelayError, Result};
pub use fragment::{Fragment, FragmentStore, Mp4Fragmenter};
pub use relay::{FfmpegLauncher, MediaRelay, ProcessHandle, RelayStatus, TranscodeRequest, TranscoderLauncher};
