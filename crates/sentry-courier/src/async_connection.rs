// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Non-blocking delivery in front of any connection.
//!
//! ```text
//!   producers
//!       │ send() — enqueue, return immediately
//!       v
//!   ┌──────────────────┐
//!   │ DispatchService  │ bounded pending queue, discard-oldest overflow
//!   └────────┬─────────┘
//!            │ semaphore-bounded workers
//!            v
//!   ┌──────────────────┐
//!   │ inner Connection │ (lockdown decorator → transport)
//!   └──────────────────┘
//! ```
//!
//! Producers hand events to [`AsyncConnection`], which feeds a dispatcher
//! task through an unbounded command channel. The dispatcher owns the
//! pending queue and a fixed-size worker pool; a transport failure never
//! reaches a producer. When the queue is full the oldest pending event is
//! discarded in favor of the newest: stale error reports lose diagnostic
//! value faster than they gain it by being retried.

use crate::config::PipelineConfig;
use crate::connection::Connection;
use crate::error::ConnectionError;
use crate::event::Event;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Options for the async decorator.
#[derive(Debug, Clone)]
pub struct AsyncOptions {
    /// Number of concurrent delivery workers.
    pub worker_count: usize,
    /// Cap on pending sends; `None` means unbounded.
    pub queue_capacity: Option<usize>,
    /// Whether `close()` drains pending and in-flight sends.
    pub graceful_shutdown: bool,
    /// Upper bound on the graceful drain.
    pub shutdown_timeout: Option<Duration>,
}

impl AsyncOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            worker_count: config.worker_count,
            queue_capacity: config.queue_capacity,
            graceful_shutdown: config.graceful_shutdown,
            shutdown_timeout: config.shutdown_timeout,
        }
    }
}

impl Default for AsyncOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

enum PipelineCommand {
    Send(Event),
    Close {
        graceful: bool,
        ack: oneshot::Sender<Result<(), ConnectionError>>,
    },
}

/// Connection decorator making `send` non-blocking for producers.
pub struct AsyncConnection {
    tx: mpsc::UnboundedSender<PipelineCommand>,
    graceful: bool,
    shutdown_timeout: Option<Duration>,
    closed: AtomicBool,
}

impl AsyncConnection {
    /// Wrap `inner` and spawn the dispatcher on the current runtime.
    pub fn new(inner: Arc<dyn Connection>, options: AsyncOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let service = DispatchService {
            inner,
            rx,
            pending: VecDeque::new(),
            queue_capacity: options.queue_capacity,
            permits: Arc::new(Semaphore::new(options.worker_count.max(1))),
            inflight: JoinSet::new(),
            cancel: CancellationToken::new(),
        };
        tokio::spawn(service.run());

        Self {
            tx,
            graceful: options.graceful_shutdown,
            shutdown_timeout: options.shutdown_timeout,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connection for AsyncConnection {
    /// Enqueue the event and return immediately. Transport failures never
    /// surface here; sending on a closed pipeline does.
    async fn send(&self, event: Event) -> Result<(), ConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        self.tx
            .send(PipelineCommand::Send(event))
            .map_err(|_| ConnectionError::Closed)
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(PipelineCommand::Close {
                graceful: self.graceful,
                ack: ack_tx,
            })
            .map_err(|_| {
                ConnectionError::CloseFailed("dispatcher already stopped".to_string())
            })?;

        let ack = match self.shutdown_timeout {
            Some(limit) => timeout(limit, ack_rx).await.map_err(|_| {
                ConnectionError::CloseFailed("graceful shutdown timed out".to_string())
            })?,
            None => ack_rx.await,
        };
        ack.map_err(|_| {
            ConnectionError::CloseFailed("dispatcher stopped before acknowledging".to_string())
        })?
    }
}

/// Dispatcher owning the pending queue and the worker pool.
struct DispatchService {
    inner: Arc<dyn Connection>,
    rx: mpsc::UnboundedReceiver<PipelineCommand>,
    pending: VecDeque<Event>,
    queue_capacity: Option<usize>,
    permits: Arc<Semaphore>,
    inflight: JoinSet<()>,
    cancel: CancellationToken,
}

impl DispatchService {
    async fn run(mut self) {
        debug!("Delivery dispatcher started");

        loop {
            self.pump();

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(PipelineCommand::Send(event)) => self.enqueue(event),
                    Some(PipelineCommand::Close { graceful, ack }) => {
                        let result = self.shutdown(graceful).await;
                        if ack.send(result).is_err() {
                            error!("Failed to send close acknowledgement - receiver dropped");
                        }
                        break;
                    }
                    None => {
                        // Every handle dropped without an explicit close.
                        let _ = self.shutdown(true).await;
                        break;
                    }
                },
                Some(_) = self.inflight.join_next(), if !self.inflight.is_empty() => {}
            }
        }

        debug!("Delivery dispatcher stopped");
    }

    fn enqueue(&mut self, event: Event) {
        if let Some(capacity) = self.queue_capacity {
            if self.pending.len() >= capacity {
                self.pending.pop_front();
                warn!("Pending queue is full, discarding the oldest queued event");
            }
        }
        self.pending.push_back(event);
    }

    /// Hand pending events to workers while permits are available.
    fn pump(&mut self) {
        while !self.pending.is_empty() {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                break;
            };
            let Some(event) = self.pending.pop_front() else {
                break;
            };
            let inner = Arc::clone(&self.inner);
            let cancel = self.cancel.clone();
            self.inflight.spawn(async move {
                let _permit = permit;
                tokio::select! {
                    () = cancel.cancelled() => {
                        warn!("Abandoning an in-flight event delivery");
                    }
                    result = inner.send(event) => {
                        if let Err(e) = result {
                            error!("Failed to deliver an event: {e}");
                        }
                    }
                }
            });
        }
    }

    async fn shutdown(&mut self, graceful: bool) -> Result<(), ConnectionError> {
        // Intake is closed; fold any commands already buffered into the
        // pending queue so a graceful drain covers them.
        self.rx.close();
        while let Ok(command) = self.rx.try_recv() {
            match command {
                PipelineCommand::Send(event) => self.enqueue(event),
                PipelineCommand::Close { ack, .. } => {
                    let _ = ack.send(Ok(()));
                }
            }
        }

        if graceful {
            while !self.pending.is_empty() || !self.inflight.is_empty() {
                self.pump();
                self.inflight.join_next().await;
            }
        } else {
            if !self.pending.is_empty() {
                warn!("Abandoning {} queued events", self.pending.len());
            }
            self.pending.clear();
            self.cancel.cancel();
            while self.inflight.join_next().await.is_some() {}
        }

        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBuilder;
    use std::sync::Mutex;

    /// Connection recording delivered messages; deliveries optionally wait
    /// on a gate so tests can hold workers busy.
    struct RecordingConnection {
        delivered: Mutex<Vec<String>>,
        gate: Option<Arc<Semaphore>>,
        fail_sends: bool,
        closed: AtomicBool,
    }

    impl RecordingConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                gate: None,
                fail_sends: false,
                closed: AtomicBool::new(false),
            })
        }

        fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                gate: Some(gate),
                fail_sends: false,
                closed: AtomicBool::new(false),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                gate: None,
                fail_sends: true,
                closed: AtomicBool::new(false),
            })
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().expect("lock poisoned").clone()
        }
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        async fn send(&self, event: Event) -> Result<(), ConnectionError> {
            if let Some(gate) = &self.gate {
                let permit = gate.acquire().await;
                drop(permit);
            }
            if self.fail_sends {
                return Err(ConnectionError::SendFailed("intake unreachable".into()));
            }
            self.delivered
                .lock()
                .expect("lock poisoned")
                .push(event.message().unwrap_or_default().to_string());
            Ok(())
        }

        async fn close(&self) -> Result<(), ConnectionError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(message: &str) -> Event {
        EventBuilder::new().message(message).build()
    }

    fn options(workers: usize, capacity: Option<usize>, graceful: bool) -> AsyncOptions {
        AsyncOptions {
            worker_count: workers,
            queue_capacity: capacity,
            graceful_shutdown: graceful,
            shutdown_timeout: None,
        }
    }

    #[tokio::test]
    async fn test_graceful_close_drains_pending() {
        let inner = RecordingConnection::new();
        let connection = AsyncConnection::new(inner.clone(), options(2, None, true));

        for i in 0..20 {
            connection.send(event(&format!("e{i}"))).await.expect("send failed");
        }
        connection.close().await.expect("close failed");

        let mut delivered = inner.delivered();
        delivered.sort();
        assert_eq!(delivered.len(), 20);
        assert!(inner.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_overflow_discards_oldest_pending() {
        let gate = Arc::new(Semaphore::new(0));
        let inner = RecordingConnection::gated(Arc::clone(&gate));
        let connection =
            AsyncConnection::new(inner.clone(), options(1, Some(2), true));

        // e0 occupies the single worker (blocked on the gate); e1 and e2
        // fill the queue; e3 displaces e1, the oldest pending event.
        for i in 0..4 {
            connection.send(event(&format!("e{i}"))).await.expect("send failed");
            tokio::task::yield_now().await;
        }

        gate.add_permits(10);
        connection.close().await.expect("close failed");

        assert_eq!(inner.delivered(), vec!["e0", "e2", "e3"]);
    }

    #[tokio::test]
    async fn test_transport_failure_never_reaches_producer() {
        let inner = RecordingConnection::failing();
        let connection = AsyncConnection::new(inner.clone(), options(1, None, true));

        connection.send(event("doomed")).await.expect("send failed");
        connection.close().await.expect("close failed");
        assert!(inner.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_immediate_close_abandons_queued_work() {
        let gate = Arc::new(Semaphore::new(0));
        let inner = RecordingConnection::gated(Arc::clone(&gate));
        let connection =
            AsyncConnection::new(inner.clone(), options(1, None, false));

        for i in 0..5 {
            connection.send(event(&format!("e{i}"))).await.expect("send failed");
        }
        tokio::task::yield_now().await;

        // The gate is never opened; immediate close must not wait for it.
        connection.close().await.expect("close failed");

        assert!(inner.delivered().is_empty());
        assert!(inner.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let inner = RecordingConnection::new();
        let connection = AsyncConnection::new(inner.clone(), options(1, None, true));

        connection.close().await.expect("close failed");
        let result = connection.send(event("late")).await;
        assert!(matches!(result, Err(ConnectionError::Closed)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let inner = RecordingConnection::new();
        let connection = AsyncConnection::new(inner.clone(), options(1, None, true));

        connection.close().await.expect("close failed");
        connection.close().await.expect("second close failed");
    }
}
