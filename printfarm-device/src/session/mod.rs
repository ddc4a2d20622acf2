//! Device session: the self-healing connection to one printer
//!
//! A session runs one connection at a time under a fixed-delay
//! [`RestartPolicy`]. Each connection:
//!
//! 1. fetches settings and logs in passively (REST),
//! 2. opens the event socket, publishes settings and sends the credential,
//! 3. pings on an interval and closes the socket if pongs stop arriving,
//! 4. closes the socket if no status arrives before the watchdog fires.
//!
//! Per-socket timers live on the connection's stack frame, so they are gone
//! as soon as the socket is.

mod state;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use printfarm_core::config::SessionConfig;
use printfarm_core::models::{DeviceDescriptor, SettingsSnapshot, StatusSnapshot};
use printfarm_core::{supervise, RestartPolicy};
use printfarm_hub::DevicePublisher;
use printfarm_livestream::MediaRelay;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub use state::{ConnectionState, SessionInput};

use crate::link::{DeviceLink, DeviceSettings, EventSocket, SocketEvent};
use crate::{DeviceError, Result};

pub struct DeviceSession {
    descriptor: DeviceDescriptor,
    link: Arc<dyn DeviceLink>,
    publisher: DevicePublisher,
    relay: Arc<MediaRelay>,
    config: SessionConfig,
    state: watch::Sender<ConnectionState>,
    camera_url: RwLock<Option<String>>,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceSession {
    pub fn new(
        descriptor: DeviceDescriptor,
        link: Arc<dyn DeviceLink>,
        publisher: DevicePublisher,
        relay: Arc<MediaRelay>,
        config: SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            descriptor,
            link,
            publisher,
            relay,
            config,
            state,
            camera_url: RwLock::new(None),
            started: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    /// Begin the connect/retry loop. Only the first call has any effect.
    ///
    /// The first connection attempt is made immediately.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let session = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let name = format!("device:{}", session.descriptor.slug);
            let policy = RestartPolicy::fixed(session.config.retry_delay());
            supervise(&name, policy, |attempt| {
                let session = Arc::clone(&session);
                async move { session.connect_once(attempt).await }
            })
            .await;
        });
        *self.task.lock() = Some(handle);
        true
    }

    /// Abort the connection loop and the relay
    pub fn shutdown(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            info!(printer = %self.descriptor.slug, "Device session stopped");
        }
        self.relay.shutdown();
    }

    #[must_use]
    pub fn slug(&self) -> &str {
        &self.descriptor.slug
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver observing every state change
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current_settings(&self) -> Option<SettingsSnapshot> {
        self.publisher.current_settings()
    }

    #[must_use]
    pub fn current_status(&self) -> Option<StatusSnapshot> {
        self.publisher.current_status()
    }

    /// Camera URL from the latest handshake
    #[must_use]
    pub fn camera_url(&self) -> Option<String> {
        self.camera_url.read().clone()
    }

    #[must_use]
    pub fn has_camera(&self) -> bool {
        self.camera_url.read().is_some()
    }

    #[must_use]
    pub fn relay(&self) -> &Arc<MediaRelay> {
        &self.relay
    }

    fn apply(&self, input: SessionInput) -> ConnectionState {
        let slug = &self.descriptor.slug;
        let mut current = ConnectionState::Disconnected;
        self.state.send_if_modified(|state| match state.next(input) {
            Some(next) => {
                let changed = next != *state;
                if changed {
                    debug!(printer = %slug, from = %state, to = %next, "State transition");
                }
                *state = next;
                current = next;
                changed
            }
            None => {
                debug!(printer = %slug, state = %state, ?input, "Ignoring input in this state");
                current = *state;
                false
            }
        });
        current
    }

    /// One full connection lifetime, from handshake to socket close
    async fn connect_once(&self, attempt: u32) -> Result<()> {
        let slug = &self.descriptor.slug;
        self.apply(SessionInput::Connect);
        debug!(printer = %slug, attempt, "Connecting to printer");

        let (settings, credential, mut socket) = match self.handshake().await {
            Ok(handshake) => handshake,
            Err(e) => {
                warn!(
                    printer = %slug,
                    attempt,
                    error = %e,
                    retry_in_ms = self.config.retry_delay_ms,
                    "Failed to connect to printer"
                );
                self.apply(SessionInput::HandshakeFailed);
                return Err(e);
            }
        };

        let state = self.apply(SessionInput::SocketOpened);
        info!(printer = %slug, attempt, state = %state, "Connected to printer");
        self.on_open(&settings);

        let result = self.run_socket(socket.as_mut(), credential).await;
        if tokio::time::timeout(self.config.ping_interval(), socket.close()).await.is_err() {
            debug!(printer = %slug, "Socket close stalled, dropping it");
        }
        self.apply(SessionInput::SocketClosed);

        info!(
            printer = %slug,
            retry_in_ms = self.config.retry_delay_ms,
            "Lost connection to printer"
        );
        result
    }

    async fn handshake(&self) -> Result<(DeviceSettings, String, Box<dyn EventSocket>)> {
        let settings = self.link.fetch_settings().await?;
        let credential = self.link.login().await?;
        let socket = self.link.open_socket().await?;
        Ok((settings, credential, socket))
    }

    /// Publish fresh settings and bring up the camera relay
    fn on_open(&self, settings: &DeviceSettings) {
        let slug = &self.descriptor.slug;
        let name = if settings.name.is_empty() {
            slug.clone()
        } else {
            settings.name.clone()
        };
        self.publisher.publish_settings(SettingsSnapshot {
            printer: slug.clone(),
            name,
            color: settings.color,
            webcam: settings.orientation,
        });

        *self.camera_url.write() = settings.camera_url.clone();
        if let Some(camera_url) = &settings.camera_url {
            self.relay.ensure_started(camera_url.clone(), settings.orientation);
        }
    }

    async fn run_socket(&self, socket: &mut dyn EventSocket, credential: String) -> Result<()> {
        let slug = &self.descriptor.slug;

        socket.send_text(json!({ "auth": credential }).to_string()).await?;
        self.apply(SessionInput::CredentialSent);

        let ping_interval = self.config.ping_interval();
        let pong_timeout = self.config.pong_timeout();

        let mut heartbeat = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let pong_deadline = tokio::time::sleep(pong_timeout);
        tokio::pin!(pong_deadline);
        let watchdog = tokio::time::sleep(self.config.status_watchdog());
        tokio::pin!(watchdog);
        let mut awaiting_status = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    // A stalled write must not hold off the pong deadline
                    tokio::time::timeout(ping_interval, socket.ping())
                        .await
                        .map_err(|_| DeviceError::Timeout("ping".to_string()))??;
                }
                () = &mut pong_deadline => {
                    let missed = pong_timeout.as_millis() / ping_interval.as_millis().max(1);
                    warn!(printer = %slug, "Missed {missed} heartbeats, closing socket");
                    return Err(DeviceError::Timeout("heartbeat".to_string()));
                }
                () = &mut watchdog, if awaiting_status => {
                    warn!(
                        printer = %slug,
                        watchdog_ms = self.config.status_watchdog_ms,
                        "No status received from printer, closing socket"
                    );
                    return Err(DeviceError::Timeout("status watchdog".to_string()));
                }
                event = socket.next_event() => match event {
                    None => return Ok(()),
                    Some(Err(e)) => return Err(e),
                    Some(Ok(SocketEvent::Pong)) => {
                        self.apply(SessionInput::Pong);
                        pong_deadline.as_mut().reset(Instant::now() + pong_timeout);
                    }
                    Some(Ok(SocketEvent::Text(text))) => {
                        if self.handle_text(&text) && awaiting_status {
                            awaiting_status = false;
                            debug!(printer = %slug, "First status received, watchdog disarmed");
                        }
                    }
                },
            }
        }
    }

    /// Publish one inbound frame. Returns whether it carried status.
    fn handle_text(&self, text: &str) -> bool {
        let payload: Value = match serde_json::from_str(text) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(printer = %self.descriptor.slug, error = %e, "Ignoring undecodable frame");
                return false;
            }
        };
        let status_bearing = self.publisher.publish_event(payload);
        if status_bearing {
            self.apply(SessionInput::StatusReceived);
        }
        status_bearing
    }
}
