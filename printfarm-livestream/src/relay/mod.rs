//! Media relay: one supervised transcoder per camera feeding a [`FragmentStore`]

mod transcoder;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use printfarm_core::config::RelayConfig;
use printfarm_core::models::Orientation;
use printfarm_core::{supervise, RestartPolicy};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use transcoder::{FfmpegLauncher, ProcessHandle, TranscodeRequest, TranscoderLauncher};

use crate::fragment::{Fragment, FragmentStore, Mp4Fragmenter, Mp4Output};
use crate::Result;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Point-in-time view of a relay, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    /// A transcoder process is currently producing output
    pub running: bool,
    pub restarts: u32,
    pub last_sequence: Option<u64>,
}

struct RelayShared {
    printer: String,
    store: FragmentStore,
    launcher: Arc<dyn TranscoderLauncher>,
    running: AtomicBool,
    restarts: AtomicU32,
}

/// Keeps a fragmented video feed available for one device.
///
/// The transcoder is crash-only: on error or end of stream it is killed and,
/// after the restart delay, the store is reset and a fresh process started.
/// Fragments cached from the previous run stay readable during the delay.
pub struct MediaRelay {
    shared: Arc<RelayShared>,
    policy: RestartPolicy,
    started: Mutex<Option<TranscodeRequest>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MediaRelay {
    pub fn new(printer: impl Into<String>, config: &RelayConfig, launcher: Arc<dyn TranscoderLauncher>) -> Self {
        let printer = printer.into();
        Self {
            shared: Arc::new(RelayShared {
                store: FragmentStore::new(printer.clone(), config.playlist_size, config.playlist_extra),
                printer,
                launcher,
                running: AtomicBool::new(false),
                restarts: AtomicU32::new(0),
            }),
            policy: RestartPolicy::fixed(config.restart_delay()),
            started: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Start the transcoder if it is not running yet. Returns whether this call started it.
    ///
    /// Source and orientation are fixed by the first call; later calls with
    /// different values are logged and ignored.
    pub fn ensure_started(&self, source_url: impl Into<String>, orientation: Orientation) -> bool {
        let request = TranscodeRequest {
            source_url: source_url.into(),
            orientation,
        };

        let mut started = self.started.lock();
        if let Some(current) = started.as_ref() {
            if *current != request {
                warn!(
                    printer = %self.shared.printer,
                    "Camera settings changed, relay keeps its original source and orientation"
                );
            }
            return false;
        }
        *started = Some(request.clone());

        info!(
            printer = %self.shared.printer,
            source = %request.source_url,
            orientation = ?request.orientation,
            "Starting media relay"
        );

        let shared = self.shared.clone();
        let policy = self.policy;
        let handle = tokio::spawn(async move {
            let name = format!("relay:{}", shared.printer);
            supervise(&name, policy, |attempt| {
                let shared = shared.clone();
                let request = request.clone();
                async move { shared.run_transcoder(attempt, &request).await }
            })
            .await;
        });
        *self.task.lock() = Some(handle);
        true
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.lock().is_some()
    }

    #[must_use]
    pub fn initialization_segment(&self) -> Option<Bytes> {
        self.shared.store.initialization_segment()
    }

    #[must_use]
    pub fn playlist(&self) -> Option<String> {
        self.shared.store.playlist()
    }

    pub fn playlist_with<F>(&self, gen_url: F) -> Option<String>
    where
        F: FnMut(&str) -> String,
    {
        self.shared.store.playlist_with(gen_url)
    }

    #[must_use]
    pub fn fragment(&self, sequence: u64) -> Option<Fragment> {
        self.shared.store.fragment(sequence)
    }

    #[must_use]
    pub fn status(&self) -> RelayStatus {
        RelayStatus {
            running: self.shared.running.load(Ordering::SeqCst),
            restarts: self.shared.restarts.load(Ordering::SeqCst),
            last_sequence: self.shared.store.last_sequence(),
        }
    }

    /// Stop supervising; the transcoder is killed when its handle drops.
    pub fn shutdown(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            self.shared.running.store(false, Ordering::SeqCst);
            info!(printer = %self.shared.printer, "Media relay stopped");
        }
    }
}

impl Drop for MediaRelay {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

impl RelayShared {
    /// One transcoder lifetime: launch, pump its output into the store, tear down.
    async fn run_transcoder(&self, attempt: u32, request: &TranscodeRequest) -> Result<()> {
        if attempt > 1 {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            info!(printer = %self.printer, attempt, "Restarting transcoder");
        }
        // Fresh process, fresh stream: numbering restarts at 0
        self.store.reset();

        let mut process = self.launcher.launch(&self.printer, request).await?;
        self.running.store(true, Ordering::SeqCst);

        let result = self.pump(&mut process).await;

        self.running.store(false, Ordering::SeqCst);
        process.terminate().await;
        match &result {
            Ok(()) => info!(printer = %self.printer, "Transcoder output ended"),
            Err(e) => warn!(printer = %self.printer, error = %e, "Transcoder failed"),
        }
        result
    }

    async fn pump(&self, process: &mut ProcessHandle) -> Result<()> {
        let mut fragmenter = Mp4Fragmenter::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let n = process.output.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            for output in fragmenter.push(&buf[..n])? {
                match output {
                    Mp4Output::Initialization(segment) => {
                        debug!(printer = %self.printer, size = segment.len(), "Initialization segment ready");
                        self.store.set_initialization(segment);
                    }
                    Mp4Output::Fragment { data, keyframe } => {
                        let fragment = self.store.push_fragment(data, keyframe);
                        debug!(
                            printer = %self.printer,
                            sequence = fragment.sequence,
                            duration = fragment.duration,
                            keyframe,
                            "Fragment stored"
                        );
                    }
                }
            }
        }
    }
}
