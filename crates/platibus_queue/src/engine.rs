//! Queue dispatch engine
//!
//! One engine instance owns one queue. Enqueued rows are persisted and
//! handed to a dispatcher task over a channel; the dispatcher fans work out
//! to at most `concurrency_limit` concurrent attempts, gated by a semaphore.
//! A non-acknowledged attempt sleeps `retry_delay` and tries again until the
//! row is acknowledged (deleted), abandoned (retained, dead-lettered) or the
//! queue is closed (row left pending for the next open).
//!
//! Two rules keep the engine honest:
//! - a row key enters the in-flight set before any attempt and leaves it
//!   after the last, so no two workers ever hold the same row;
//! - every storage update for an attempt completes before the listener runs,
//!   and the listener always runs outside storage operations.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use platibus_message::headers::names;
use platibus_message::Message;
use platibus_security::{Principal, SecurityTokenService};
use platibus_utils::{DiagnosticEvent, DiagnosticEventKind, DiagnosticEventSink};
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::listener::{DeliveryContext, QueueListener};
use crate::options::QueueOptions;
use crate::store::{QueueStore, QueuedMessageRecord};

/// Handoff capacity used when no bounded buffer is configured; enqueue
/// applies backpressure instead of failing at this size.
const DEFAULT_HANDOFF_CAPACITY: usize = 1024;

const SOURCE: &str = "message-queue";

enum Attempt {
    /// The row reached a terminal state (or vanished); stop driving it.
    Terminal,
    /// Not acknowledged with attempts remaining; retry after the delay.
    Retry,
}

pub struct MessageQueue {
    inner: Arc<Inner>,
    tx: mpsc::Sender<u64>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    bounded: bool,
    enqueue_lock: Mutex<()>,
}

struct Inner {
    name: String,
    store: QueueStore,
    listener: Arc<dyn QueueListener>,
    options: QueueOptions,
    tokens: Arc<dyn SecurityTokenService>,
    sink: Arc<dyn DiagnosticEventSink>,
    in_flight: Mutex<HashSet<u64>>,
}

impl MessageQueue {
    /// Open (or re-open) a queue: initialize its storage, start the
    /// dispatcher, and feed every row that was pending at the last shutdown
    /// back through dispatch with its attempt count intact.
    pub async fn open(
        name: impl Into<String>,
        db: &sled::Db,
        listener: Arc<dyn QueueListener>,
        options: QueueOptions,
        tokens: Arc<dyn SecurityTokenService>,
        sink: Arc<dyn DiagnosticEventSink>,
    ) -> Result<Self, QueueError> {
        options.validate()?;
        let name = name.into();
        let store = QueueStore::open(db, &name)?;
        let pending = store.pending_keys()?;

        let bounded = options.handoff_buffer.is_some();
        let capacity = options.handoff_buffer.unwrap_or(DEFAULT_HANDOFF_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let inner = Arc::new(Inner {
            name: name.clone(),
            store,
            listener,
            options,
            tokens,
            sink,
            in_flight: Mutex::new(HashSet::new()),
        });

        tracker.spawn(run_dispatcher(
            Arc::clone(&inner),
            rx,
            cancel.clone(),
            tracker.clone(),
        ));

        // Recovery feed runs in the background so a large backlog cannot
        // block open behind a slow listener.
        if !pending.is_empty() {
            let feed_tx = tx.clone();
            let feed_cancel = cancel.clone();
            tracker.spawn(async move {
                for key in pending {
                    tokio::select! {
                        _ = feed_cancel.cancelled() => return,
                        sent = feed_tx.send(key) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }

        inner.sink.emit(
            DiagnosticEvent::new(SOURCE, DiagnosticEventKind::ComponentInitialized)
                .queue(name),
        );

        Ok(Self {
            inner,
            tx,
            cancel,
            tracker,
            bounded,
            enqueue_lock: Mutex::new(()),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Persist a message and hand it to dispatch.
    ///
    /// The message's `SecurityToken` header is replaced: a fresh token is
    /// issued for `principal` (expiring no later than the message itself),
    /// or the header is dropped when there is no principal to capture.
    pub async fn enqueue(
        &self,
        message: &Message,
        principal: Option<&Principal>,
    ) -> Result<(), QueueError> {
        if self.cancel.is_cancelled() {
            return Err(QueueError::Closed {
                queue: self.inner.name.clone(),
            });
        }
        let mut headers = message.headers().clone();
        match principal {
            Some(principal) => {
                let token = self.inner.tokens.issue(principal, headers.expires())?;
                headers.set_security_token(token);
            }
            None => {
                headers.remove(names::SECURITY_TOKEN);
            }
        }
        let message = message.with_headers(headers);

        let permit = if self.bounded {
            match self.tx.try_reserve() {
                Ok(permit) => permit,
                Err(mpsc::error::TrySendError::Full(())) => {
                    return Err(QueueError::QueueFull {
                        queue: self.inner.name.clone(),
                    })
                }
                Err(mpsc::error::TrySendError::Closed(())) => {
                    return Err(QueueError::Closed {
                        queue: self.inner.name.clone(),
                    })
                }
            }
        } else {
            self.tx.reserve().await.map_err(|_| QueueError::Closed {
                queue: self.inner.name.clone(),
            })?
        };

        let message_id = {
            // Insertion order and handoff order must agree for FIFO selection.
            let _guard = self.enqueue_lock.lock().expect("enqueue lock poisoned");
            let key = self.inner.store.insert(&self.inner.name, &message)?;
            permit.send(key);
            message.headers().message_id().unwrap_or_default().to_string()
        };

        if self.inner.options.is_durable {
            self.inner.store.flush().await?;
        }

        self.inner.sink.emit(
            DiagnosticEvent::new(SOURCE, DiagnosticEventKind::MessageEnqueued)
                .queue(self.inner.name.clone())
                .message_id(message_id),
        );
        Ok(())
    }

    /// Stop dispatch and wait for in-flight attempts to finish or observe
    /// cancellation. Pending rows stay pending.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Pending row count, for introspection and tests.
    pub fn pending_count(&self) -> Result<usize, QueueError> {
        Ok(self.inner.store.rows()?.iter().filter(|r| r.is_pending()).count())
    }

    /// Find a row by message id; abandoned rows are retained and visible
    /// here for forensics.
    pub fn find(&self, message_id: &str) -> Result<Option<QueuedMessageRecord>, QueueError> {
        Ok(self
            .inner
            .store
            .rows()?
            .into_iter()
            .find(|r| r.message_id == message_id))
    }
}

async fn run_dispatcher(
    inner: Arc<Inner>,
    mut rx: mpsc::Receiver<u64>,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    let semaphore = Arc::new(Semaphore::new(inner.options.concurrency_limit));
    loop {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let key = tokio::select! {
            _ = cancel.cancelled() => break,
            key = rx.recv() => match key {
                Some(key) => key,
                None => break,
            },
        };
        let inner = Arc::clone(&inner);
        let cancel = cancel.clone();
        tracker.spawn(async move {
            let _permit = permit;
            inner.process(key, cancel).await;
        });
    }
}

impl Inner {
    async fn process(&self, key: u64, cancel: CancellationToken) {
        if !self.begin_flight(key) {
            return;
        }
        self.drive(key, &cancel).await;
        self.end_flight(key);
    }

    fn begin_flight(&self, key: u64) -> bool {
        self.in_flight.lock().expect("in-flight set poisoned").insert(key)
    }

    fn end_flight(&self, key: u64) {
        self.in_flight.lock().expect("in-flight set poisoned").remove(&key);
    }

    /// Drive one row until it is terminal or the queue closes. Storage
    /// errors are logged and treated as non-acknowledgement; the retry
    /// delay applies before the next attempt.
    async fn drive(&self, key: u64, cancel: &CancellationToken) {
        loop {
            match self.attempt(key, cancel).await {
                Ok(Attempt::Terminal) => return,
                Ok(Attempt::Retry) => {}
                Err(e) => {
                    warn!(queue = %self.name, key, error = %e, "storage error during dispatch");
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.options.retry_delay) => {}
            }
        }
    }

    async fn attempt(&self, key: u64, cancel: &CancellationToken) -> Result<Attempt, QueueError> {
        let Some(mut row) = self.store.get(key)? else {
            return Ok(Attempt::Terminal);
        };
        if row.is_terminal() {
            return Ok(Attempt::Terminal);
        }

        if self.expired(&row) {
            self.abandon(key, &mut row).await?;
            self.sink.emit(
                DiagnosticEvent::new(SOURCE, DiagnosticEventKind::MessageExpired)
                    .queue(self.name.clone())
                    .message_id(row.message_id.clone()),
            );
            return Ok(Attempt::Terminal);
        }

        // A recovered row may already have exhausted its attempts (stopped
        // between the last attempt and its abandonment)
        if row.attempts >= self.options.max_attempts {
            self.abandon(key, &mut row).await?;
            self.sink.emit(
                DiagnosticEvent::new(SOURCE, DiagnosticEventKind::DeadLetter)
                    .queue(self.name.clone())
                    .message_id(row.message_id.clone())
                    .detail(format!("abandoned after {} attempts", row.attempts)),
            );
            return Ok(Attempt::Terminal);
        }

        row.attempts += 1;
        self.store.update(key, &row)?;

        let message = match row.to_message() {
            Ok(message) => message,
            Err(e) => {
                // Undecodable headers can never be delivered; dead-letter the row.
                self.abandon(key, &mut row).await?;
                self.sink.emit(
                    DiagnosticEvent::new(SOURCE, DiagnosticEventKind::DeadLetter)
                        .queue(self.name.clone())
                        .message_id(row.message_id.clone())
                        .detail(e.to_string()),
                );
                return Ok(Attempt::Terminal);
            }
        };

        let principal = self.reconstitute_principal(&message);
        let mut context = DeliveryContext::new(self.name.clone(), principal, row.attempts);
        let outcome = self
            .listener
            .message_received(&message, &mut context, cancel.child_token())
            .await;

        let acknowledged = match outcome {
            Ok(()) => context.acknowledged() || self.options.auto_acknowledge,
            Err(e) => {
                debug!(queue = %self.name, key, error = %e, "listener error; not acknowledged");
                false
            }
        };

        if acknowledged {
            self.store.remove(key)?;
            if self.options.is_durable {
                self.store.flush().await?;
            }
            self.sink.emit(
                DiagnosticEvent::new(SOURCE, DiagnosticEventKind::MessageAcknowledged)
                    .queue(self.name.clone())
                    .message_id(row.message_id.clone()),
            );
            return Ok(Attempt::Terminal);
        }

        self.sink.emit(
            DiagnosticEvent::new(SOURCE, DiagnosticEventKind::MessageNotAcknowledged)
                .queue(self.name.clone())
                .message_id(row.message_id.clone())
                .detail(format!("attempt {} of {}", row.attempts, self.options.max_attempts)),
        );

        if row.attempts >= self.options.max_attempts {
            self.abandon(key, &mut row).await?;
            self.sink.emit(
                DiagnosticEvent::new(SOURCE, DiagnosticEventKind::DeadLetter)
                    .queue(self.name.clone())
                    .message_id(row.message_id.clone())
                    .detail(format!("abandoned after {} attempts", row.attempts)),
            );
            return Ok(Attempt::Terminal);
        }

        Ok(Attempt::Retry)
    }

    fn expired(&self, row: &QueuedMessageRecord) -> bool {
        let now_ms = Utc::now().timestamp_millis();
        if matches!(row.expires_ms, Some(expires) if expires <= now_ms) {
            return true;
        }
        match self.options.ttl {
            Some(ttl) => row.enqueued_ms + ttl.as_millis() as i64 <= now_ms,
            None => false,
        }
    }

    async fn abandon(&self, key: u64, row: &mut QueuedMessageRecord) -> Result<(), QueueError> {
        row.abandoned_ms = Some(Utc::now().timestamp_millis());
        self.store.update(key, row)?;
        if self.options.is_durable {
            self.store.flush().await?;
        }
        Ok(())
    }

    fn reconstitute_principal(&self, message: &Message) -> Option<Principal> {
        let token = message.headers().security_token()?;
        match self.tokens.validate(token) {
            Ok(principal) => Some(principal),
            Err(e) => {
                warn!(queue = %self.name, error = %e, "security token rejected; dispatching without principal");
                None
            }
        }
    }
}
