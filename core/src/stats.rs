//! Per-thread tracking statistics.
//!
//! Counters are plain thread-local cells. Sessions are processed by a single worker thread, so
//! each worker accumulates its own set and reports it through [snapshot].

use std::cell::Cell;

use serde::Serialize;

thread_local! {
    pub(crate) static SEGMENTS: Cell<u64> = const { Cell::new(0) };
    pub(crate) static SEGMENT_BYTES: Cell<u64> = const { Cell::new(0) };
    pub(crate) static SESSIONS_CREATED: Cell<u64> = const { Cell::new(0) };
    pub(crate) static SESSIONS_CLOSED: Cell<u64> = const { Cell::new(0) };
    pub(crate) static SESSIONS_RESET: Cell<u64> = const { Cell::new(0) };
    pub(crate) static SESSIONS_RESTARTED: Cell<u64> = const { Cell::new(0) };
    pub(crate) static MIDSTREAM_PICKUPS: Cell<u64> = const { Cell::new(0) };
    pub(crate) static ALERTS: Cell<u64> = const { Cell::new(0) };
    pub(crate) static DISCARDS: Cell<u64> = const { Cell::new(0) };
    pub(crate) static OVERLAPS: Cell<u64> = const { Cell::new(0) };
    pub(crate) static QUEUE_LIMIT_HITS: Cell<u64> = const { Cell::new(0) };
    pub(crate) static PAWS_REJECTS: Cell<u64> = const { Cell::new(0) };
    pub(crate) static BYTES_FLUSHED: Cell<u64> = const { Cell::new(0) };
    pub(crate) static BYTES_DISCARDED: Cell<u64> = const { Cell::new(0) };
}

pub(crate) trait StatExt: Sized {
    fn inc(&'static self) {
        self.inc_by(1);
    }
    fn inc_by(&'static self, val: u64);
}

impl StatExt for std::thread::LocalKey<Cell<u64>> {
    fn inc_by(&'static self, val: u64) {
        self.set(self.get() + val);
    }
}

/// Counters accumulated by the calling thread.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStats {
    pub segments: u64,
    pub segment_bytes: u64,
    pub sessions_created: u64,
    pub sessions_closed: u64,
    pub sessions_reset: u64,
    pub sessions_restarted: u64,
    pub midstream_pickups: u64,
    pub alerts: u64,
    pub discards: u64,
    pub overlaps: u64,
    pub queue_limit_hits: u64,
    pub paws_rejects: u64,
    pub bytes_flushed: u64,
    pub bytes_discarded: u64,
}

/// Returns the counters of the calling thread.
pub fn snapshot() -> StreamStats {
    StreamStats {
        segments: SEGMENTS.get(),
        segment_bytes: SEGMENT_BYTES.get(),
        sessions_created: SESSIONS_CREATED.get(),
        sessions_closed: SESSIONS_CLOSED.get(),
        sessions_reset: SESSIONS_RESET.get(),
        sessions_restarted: SESSIONS_RESTARTED.get(),
        midstream_pickups: MIDSTREAM_PICKUPS.get(),
        alerts: ALERTS.get(),
        discards: DISCARDS.get(),
        overlaps: OVERLAPS.get(),
        queue_limit_hits: QUEUE_LIMIT_HITS.get(),
        paws_rejects: PAWS_REJECTS.get(),
        bytes_flushed: BYTES_FLUSHED.get(),
        bytes_discarded: BYTES_DISCARDED.get(),
    }
}
