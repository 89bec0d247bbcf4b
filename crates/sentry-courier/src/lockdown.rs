// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Failure-triggered exponential backoff for a fragile remote sink.
//!
//! After a transport failure the decorator enters a lockdown window: the
//! failing task sleeps for the current delay, concurrent senders wait for
//! the window to pass, and the delay doubles up to a ceiling. A successful
//! delivery resets the delay to its base value.

use crate::config::PipelineConfig;
use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::event::Event;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::error;

/// Observability hook invoked with every transport failure.
pub type FailureHook = Arc<dyn Fn(&ConnectionError) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct LockdownState {
    /// Delay applied to the next failure.
    delay: Duration,
    /// End of the current lockdown window, if one is open.
    until: Option<Instant>,
}

/// Connection decorator adding per-instance exponential backoff.
///
/// The sleep runs on whichever task called `send`; composed under the
/// async decorator that is always a delivery worker, never a producer.
pub struct LockdownConnection<C> {
    inner: C,
    base: Duration,
    max: Duration,
    state: Mutex<LockdownState>,
    notify: Notify,
    failure_hook: Option<FailureHook>,
}

impl<C: Connection> LockdownConnection<C> {
    pub fn new(inner: C, base: Duration, max: Duration) -> Self {
        Self {
            inner,
            base,
            max,
            state: Mutex::new(LockdownState {
                delay: base,
                until: None,
            }),
            notify: Notify::new(),
            failure_hook: None,
        }
    }

    pub fn from_config(inner: C, config: &PipelineConfig) -> Self {
        Self::new(inner, config.base_backoff, config.max_backoff)
    }

    /// Install a hook observing transport failures (metrics, alerting).
    /// Failures are otherwise swallowed after being logged.
    pub fn with_failure_hook(mut self, hook: FailureHook) -> Self {
        self.failure_hook = Some(hook);
        self
    }

    /// Block until no lockdown window is open.
    ///
    /// Waiters are woken early whenever the state changes so they re-read
    /// the window instead of sleeping out a stale one.
    async fn wait_for_window(&self) {
        loop {
            #[allow(clippy::expect_used)]
            let until = self.state.lock().expect("lock poisoned").until;
            let Some(until) = until else {
                return;
            };
            if until <= Instant::now() {
                #[allow(clippy::expect_used)]
                let mut state = self.state.lock().expect("lock poisoned");
                if state.until == Some(until) {
                    state.until = None;
                }
                return;
            }
            tokio::select! {
                () = sleep_until(until) => {}
                () = self.notify.notified() => {}
            }
        }
    }

    async fn lockdown(&self) {
        let delay = {
            #[allow(clippy::expect_used)]
            let mut state = self.state.lock().expect("lock poisoned");
            let delay = state.delay;
            state.until = Some(Instant::now() + delay);
            delay
        };
        self.notify.notify_waiters();

        // The failing task absorbs the wait.
        sleep(delay).await;

        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("lock poisoned");
        state.delay = (state.delay * 2).min(self.max);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl<C: Connection> Connection for LockdownConnection<C> {
    async fn send(&self, event: Event) -> Result<(), ConnectionError> {
        self.wait_for_window().await;

        match self.inner.send(event).await {
            Ok(()) => {
                #[allow(clippy::expect_used)]
                let mut state = self.state.lock().expect("lock poisoned");
                // Isolated failures must not ratchet the backoff upward.
                state.delay = self.base;
                state.until = None;
                Ok(())
            }
            Err(e) => {
                error!("Failed to deliver an event, entering lockdown: {e}");
                if let Some(hook) = &self.failure_hook {
                    hook(&e);
                }
                self.lockdown().await;
                // The failure is handled here; it is not re-raised.
                Ok(())
            }
        }
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        self.inner.close().await
    }
}
