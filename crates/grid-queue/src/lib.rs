//! Ordered holding area for new-session requests that could not be
//! satisfied immediately.
//!
//! The queue never blocks: `poll` reports the absence of a match as a
//! normal outcome, and waiting-with-timeout belongs to the caller holding
//! the request's result channel. Every entry carries a deadline; overdue
//! entries are swept lazily on access (and explicitly by the servicing
//! loop) and their callers observe a timeout exactly once.
//!
//! Per-request state machine: Pending → { Matched | Cancelled | TimedOut },
//! all terminal. Terminality is enforced structurally: the result channel
//! is a oneshot consumed by whichever transition fires first, and the
//! entry leaves the deque at the same moment.

#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use grid_proto::{Capabilities, ProtoError, RequestId, Session};

/// Why a queued request ended without a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The request waited longer than the configured timeout.
    #[error("timed out waiting for capacity")]
    Timeout,

    /// The request was cancelled before it could be matched.
    #[error("request cancelled")]
    Cancelled,
}

/// The terminal outcome delivered on a request's result channel.
pub type QueueOutcome = Result<Session, QueueError>;

/// A pending request removed from the queue for a matching attempt.
///
/// Whoever polls an entry owns its terminal transition: either
/// [`QueueEntry::complete`] it with a session, or hand it back with
/// [`NewSessionQueue::requeue_front`].
#[derive(Debug)]
pub struct QueueEntry {
    /// The request's id.
    pub id: RequestId,
    /// The capabilities the client asked for.
    pub capabilities: Capabilities,
    /// When the request was first enqueued.
    pub enqueued_at: DateTime<Utc>,
    seq: u64,
    deadline: Instant,
    tx: oneshot::Sender<QueueOutcome>,
}

impl QueueEntry {
    /// Deliver the matched session to the waiting caller.
    ///
    /// A dropped receiver (the caller gave up) is tolerated; the session
    /// it carried is returned so the caller of `complete` can release it.
    pub fn complete(self, session: Session) -> Result<(), Session> {
        self.tx.send(Ok(session)).map(|()| ()).map_err(|outcome| {
            match outcome {
                Ok(session) => session,
                // We only ever send Ok here.
                Err(_) => unreachable!(),
            }
        })
    }

    /// Whether the entry's deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn finish(self, error: QueueError) {
        // The receiver may already be gone; either way the state is terminal.
        let _ = self.tx.send(Err(error));
    }
}

/// Read-only view of a pending entry, used by prioritizers.
#[derive(Debug, Clone)]
pub struct PendingRequest<'a> {
    /// The request's id.
    pub id: RequestId,
    /// The requested capabilities.
    pub capabilities: &'a Capabilities,
    /// When the request was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Monotonic enqueue sequence number.
    pub seq: u64,
}

/// Pluggable dequeue-order policy.
///
/// Entries the policy reports as equal are dequeued in enqueue order, so
/// a policy only has to express its preference, not a total order.
pub trait RequestPrioritizer: Send + Sync + std::fmt::Debug {
    /// Compare two pending requests; `Less` polls first.
    fn compare(&self, a: &PendingRequest<'_>, b: &PendingRequest<'_>) -> Ordering;
}

/// Default policy: first in, first out by enqueue sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoOrder;

impl RequestPrioritizer for FifoOrder {
    fn compare(&self, a: &PendingRequest<'_>, b: &PendingRequest<'_>) -> Ordering {
        a.seq.cmp(&b.seq)
    }
}

/// Resolve a request prioritizer by configured name.
///
/// # Errors
///
/// Returns an error if the name does not correspond to a known policy.
pub fn request_prioritizer_from_name(
    name: &str,
) -> Result<Arc<dyn RequestPrioritizer>, ProtoError> {
    match name {
        "fifo" => Ok(Arc::new(FifoOrder)),
        other => Err(ProtoError::UnknownPlugin {
            kind: "request prioritizer",
            name: other.to_string(),
        }),
    }
}

/// The new-session queue.
#[derive(Debug)]
pub struct NewSessionQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    timeout: Duration,
    prioritizer: Arc<dyn RequestPrioritizer>,
    seq: AtomicU64,
}

impl NewSessionQueue {
    /// Create a queue whose entries expire after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::with_prioritizer(timeout, Arc::new(FifoOrder))
    }

    /// Create a queue with a custom dequeue-order policy.
    #[must_use]
    pub fn with_prioritizer(timeout: Duration, prioritizer: Arc<dyn RequestPrioritizer>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            timeout,
            prioritizer,
            seq: AtomicU64::new(0),
        }
    }

    /// The configured per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a pending request.
    ///
    /// Returns the request's id and the channel on which its terminal
    /// outcome will arrive. Never blocks past registration.
    pub fn enqueue(&self, capabilities: Capabilities) -> (RequestId, oneshot::Receiver<QueueOutcome>) {
        let (tx, rx) = oneshot::channel();
        let entry = QueueEntry {
            id: RequestId::new(),
            capabilities,
            enqueued_at: Utc::now(),
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            deadline: Instant::now() + self.timeout,
            tx,
        };
        let id = entry.id;
        debug!(request_id = %id, "request queued");
        self.entries.lock().push_back(entry);
        (id, rx)
    }

    /// Remove and return the next matching pending request, in priority
    /// order (default FIFO). Returns `None` without blocking when nothing
    /// matches. Overdue entries encountered along the way are expired.
    pub fn poll(&self, matcher: &dyn Fn(&Capabilities) -> bool) -> Option<QueueEntry> {
        let expired = {
            let mut entries = self.entries.lock();
            let expired = Self::drain_expired(&mut entries);

            let best = entries
                .iter()
                .enumerate()
                .filter(|(_, e)| matcher(&e.capabilities))
                .min_by(|(_, a), (_, b)| {
                    self.prioritizer
                        .compare(&Self::view(a), &Self::view(b))
                        .then_with(|| a.seq.cmp(&b.seq))
                })
                .map(|(i, _)| i);

            match best {
                Some(index) => {
                    let entry = entries.remove(index);
                    drop(entries);
                    Self::finish_expired(expired);
                    return entry;
                }
                None => expired,
            }
        };
        Self::finish_expired(expired);
        None
    }

    /// Return a polled entry to the head of the queue, keeping its
    /// original timestamps. Used when a reservation race was lost after
    /// dequeueing.
    pub fn requeue_front(&self, entry: QueueEntry) {
        debug!(request_id = %entry.id, "request returned to queue head");
        self.entries.lock().push_front(entry);
    }

    /// Cancel a pending request. Idempotent: cancelling an id that is no
    /// longer pending returns `false`.
    pub fn remove(&self, id: RequestId) -> bool {
        let entry = {
            let mut entries = self.entries.lock();
            entries
                .iter()
                .position(|e| e.id == id)
                .and_then(|i| entries.remove(i))
        };
        match entry {
            Some(entry) => {
                debug!(request_id = %id, "request cancelled");
                entry.finish(QueueError::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Number of live pending requests. Sweeps overdue entries first.
    pub fn size(&self) -> usize {
        let (expired, len) = {
            let mut entries = self.entries.lock();
            let expired = Self::drain_expired(&mut entries);
            (expired, entries.len())
        };
        Self::finish_expired(expired);
        len
    }

    /// Whether no requests are pending.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Cancel all pending requests.
    pub fn clear(&self) {
        let drained: Vec<QueueEntry> = self.entries.lock().drain(..).collect();
        for entry in drained {
            entry.finish(QueueError::Cancelled);
        }
    }

    /// Explicitly sweep overdue entries, delivering their timeouts.
    /// Returns how many expired.
    pub fn expire_overdue(&self) -> usize {
        let expired = {
            let mut entries = self.entries.lock();
            Self::drain_expired(&mut entries)
        };
        let count = expired.len();
        Self::finish_expired(expired);
        count
    }

    fn drain_expired(entries: &mut VecDeque<QueueEntry>) -> Vec<QueueEntry> {
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut index = 0;
        while index < entries.len() {
            if entries[index].deadline <= now {
                if let Some(entry) = entries.remove(index) {
                    expired.push(entry);
                }
            } else {
                index += 1;
            }
        }
        expired
    }

    fn finish_expired(expired: Vec<QueueEntry>) {
        for entry in expired {
            warn!(request_id = %entry.id, "queued request timed out");
            entry.finish(QueueError::Timeout);
        }
    }

    fn view(entry: &QueueEntry) -> PendingRequest<'_> {
        PendingRequest {
            id: entry.id,
            capabilities: &entry.capabilities,
            enqueued_at: entry.enqueued_at,
            seq: entry.seq,
        }
    }
}
