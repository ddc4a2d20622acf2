//! Resilience patterns for unreliable upstreams
//!
//! Device connections and transcoder processes are both "crash-only": when
//! they fail they are torn down and started again after a fixed delay.
//! [`supervise`] is the shared loop for that, parameterized by a
//! [`RestartPolicy`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

pub mod timeout {
    //! Timeout configuration for external calls

    use std::time::Duration;

    /// Default timeout for device REST requests
    pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default timeout for establishing a TCP connection
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default timeout for the event socket upgrade
    pub const SOCKET_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

    /// Timeout configuration
    #[derive(Debug, Clone, Copy)]
    pub struct TimeoutConfig {
        pub http: Duration,
        pub connect: Duration,
        pub socket_open: Duration,
    }

    impl Default for TimeoutConfig {
        fn default() -> Self {
            Self {
                http: HTTP_REQUEST_TIMEOUT,
                connect: CONNECT_TIMEOUT,
                socket_open: SOCKET_OPEN_TIMEOUT,
            }
        }
    }

    impl TimeoutConfig {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Set HTTP request timeout
        #[must_use]
        pub const fn with_http_timeout(mut self, timeout: Duration) -> Self {
            self.http = timeout;
            self
        }

        /// Set TCP connect timeout
        #[must_use]
        pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
            self.connect = timeout;
            self
        }

        /// Set socket upgrade timeout
        #[must_use]
        pub const fn with_socket_open_timeout(mut self, timeout: Duration) -> Self {
            self.socket_open = timeout;
            self
        }
    }
}

/// How a supervised task is restarted after it ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Pause between the end of one run and the start of the next
    pub delay: Duration,
    /// `None` restarts forever
    pub max_restarts: Option<u32>,
}

impl RestartPolicy {
    /// Fixed delay, unbounded restarts
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_restarts: None,
        }
    }

    #[must_use]
    pub const fn with_max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = Some(max);
        self
    }

    fn allows(&self, restarts: u32) -> bool {
        self.max_restarts.map_or(true, |max| restarts < max)
    }
}

/// Run `task` over and over according to `policy`.
///
/// The task receives the 1-based attempt number. Both `Ok` and `Err` outcomes
/// count as "the task ended" and lead to a restart after `policy.delay`; the
/// first run starts immediately. Returns the number of restarts performed,
/// which only happens once `max_restarts` is exhausted.
pub async fn supervise<F, Fut, E>(name: &str, policy: RestartPolicy, mut task: F) -> u32
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut restarts = 0u32;
    loop {
        let attempt = restarts + 1;
        match task(attempt).await {
            Ok(()) => info!(task = %name, attempt, "Supervised task ended"),
            Err(e) => warn!(task = %name, attempt, error = %e, "Supervised task failed"),
        }

        if !policy.allows(restarts) {
            warn!(task = %name, restarts, "Restart limit reached, giving up");
            return restarts;
        }

        info!(
            task = %name,
            delay_ms = policy.delay.as_millis() as u64,
            "Restarting after delay"
        );
        tokio::time::sleep(policy.delay).await;
        restarts += 1;
    }
}
