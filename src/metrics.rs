//! Process-wide gateway counters.
//!
//! Plain relaxed atomics; readers take a [`Snapshot`] when they want a
//! consistent-enough view for a status line or a shutdown summary.
use std::sync::atomic::{AtomicU64, Ordering};

static MESSAGES_QUEUED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_SENT: AtomicU64 = AtomicU64::new(0);
static MESSAGES_REQUEUED: AtomicU64 = AtomicU64::new(0);
static PROBE_FAILURES: AtomicU64 = AtomicU64::new(0);
static REQUESTS_REJECTED: AtomicU64 = AtomicU64::new(0);

pub fn inc_messages_queued() {
    MESSAGES_QUEUED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_messages_sent() {
    MESSAGES_SENT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_messages_requeued() {
    MESSAGES_REQUEUED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_probe_failures() {
    PROBE_FAILURES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_requests_rejected() {
    REQUESTS_REJECTED.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub messages_queued: u64,
    pub messages_sent: u64,
    pub messages_requeued: u64,
    pub probe_failures: u64,
    pub requests_rejected: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        messages_queued: MESSAGES_QUEUED.load(Ordering::Relaxed),
        messages_sent: MESSAGES_SENT.load(Ordering::Relaxed),
        messages_requeued: MESSAGES_REQUEUED.load(Ordering::Relaxed),
        probe_failures: PROBE_FAILURES.load(Ordering::Relaxed),
        requests_rejected: REQUESTS_REJECTED.load(Ordering::Relaxed),
    }
}
