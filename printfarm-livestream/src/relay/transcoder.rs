use std::pin::Pin;
use std::process::Stdio;

use async_trait::async_trait;
use printfarm_core::config::RelayConfig;
use printfarm_core::models::Orientation;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::{RelayError, Result};

/// What to transcode: fixed for the lifetime of a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub source_url: String,
    pub orientation: Orientation,
}

/// A running transcoder: its fMP4 output plus the process that owns it.
///
/// Replaced wholesale on every restart.
pub struct ProcessHandle {
    pub output: Pin<Box<dyn AsyncRead + Send>>,
    child: Option<Child>,
}

impl ProcessHandle {
    pub fn new(output: impl AsyncRead + Send + 'static, child: Option<Child>) -> Self {
        Self {
            output: Box::pin(output),
            child,
        }
    }

    /// Drop the output pipe, kill the process if still alive and reap it.
    pub async fn terminate(self) {
        let Self { output, child } = self;
        drop(output);

        let Some(mut child) = child else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) => debug!(%status, "Transcoder already exited"),
            Ok(None) => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill transcoder");
                }
            }
            Err(e) => warn!(error = %e, "Failed to poll transcoder status"),
        }
    }
}

/// Starts transcoder processes
#[async_trait]
pub trait TranscoderLauncher: Send + Sync {
    async fn launch(&self, printer: &str, request: &TranscodeRequest) -> Result<ProcessHandle>;
}

/// Launches `ffmpeg` producing fragmented MP4 on stdout
pub struct FfmpegLauncher {
    config: RelayConfig,
}

impl FfmpegLauncher {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Full ffmpeg argument list for one request
    #[must_use]
    pub fn args(&self, request: &TranscodeRequest) -> Vec<String> {
        let c = &self.config;
        let mut filters = vec!["hqdn3d"];
        filters.extend(request.orientation.filters());
        let fragment_duration = c.fragment_duration_us.to_string();

        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "warning",
            "-re",
            "-probesize",
            "1048576",
            "-analyzeduration",
            "10000000",
            "-use_wallclock_as_timestamps",
            "1",
            "-i",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        args.push(request.source_url.clone());
        args.extend(
            [
                "-an",
                "-c:v",
                "libx264",
                "-s",
                format!("{}x{}", c.width, c.height).as_str(),
                "-vf",
                filters.join(",").as_str(),
                "-tune",
                "zerolatency",
                "-min_frag_duration",
                fragment_duration.as_str(),
                "-frag_duration",
                fragment_duration.as_str(),
                "-crf",
                c.crf.to_string().as_str(),
                "-preset",
                "veryfast",
                "-profile:v",
                "baseline",
                "-level:v",
                "3.1",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+frag_keyframe+empty_moov+default_base_moof",
                "-f",
                "mp4",
                "pipe:1",
            ]
            .into_iter()
            .map(String::from),
        );
        args
    }
}

#[async_trait]
impl TranscoderLauncher for FfmpegLauncher {
    async fn launch(&self, printer: &str, request: &TranscodeRequest) -> Result<ProcessHandle> {
        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(self.args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RelayError::Spawn)?;

        if let Some(stderr) = child.stderr.take() {
            let printer = printer.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(printer = %printer, "ffmpeg: {line}");
                }
            });
        }

        let stdout = child.stdout.take().ok_or(RelayError::MissingOutput)?;
        Ok(ProcessHandle::new(stdout, Some(child)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(orientation: Orientation) -> TranscodeRequest {
        TranscodeRequest {
            source_url: "http://10.0.0.5/webcam/?action=stream".to_string(),
            orientation,
        }
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> &'a str {
        let index = args.iter().position(|a| a == flag).unwrap();
        &args[index + 1]
    }

    #[test]
    fn test_default_args() {
        let launcher = FfmpegLauncher::new(RelayConfig::default());
        let args = launcher.args(&request(Orientation::default()));

        assert_eq!(arg_after(&args, "-i"), "http://10.0.0.5/webcam/?action=stream");
        assert_eq!(arg_after(&args, "-s"), "640x480");
        assert_eq!(arg_after(&args, "-vf"), "hqdn3d");
        assert_eq!(arg_after(&args, "-crf"), "36");
        assert_eq!(arg_after(&args, "-frag_duration"), "6000000");
        assert_eq!(
            arg_after(&args, "-movflags"),
            "+frag_keyframe+empty_moov+default_base_moof"
        );
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_orientation_filters_follow_denoise() {
        let launcher = FfmpegLauncher::new(RelayConfig::default());
        let args = launcher.args(&request(Orientation {
            flip_h: true,
            flip_v: false,
            rotate_90: true,
        }));

        assert_eq!(arg_after(&args, "-vf"), "hqdn3d,hflip,transpose=2");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let launcher = FfmpegLauncher::new(RelayConfig {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..RelayConfig::default()
        });

        let result = launcher.launch("prusa", &request(Orientation::default())).await;
        assert!(matches!(result, Err(RelayError::Spawn(_))));
    }
}
