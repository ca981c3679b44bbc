//! Named alert events.
//!
//! Alerts are fire-and-forget signals. Handlers record them on the session's [EventLogger] while a
//! packet is being processed, and the session logs and returns them once processing is complete.

use crate::stats::{StatExt, ALERTS};
use crate::tcp::segment::Direction;

use serde::Serialize;
use strum_macros::{Display, IntoStaticStr};

/// Anomalies raised by the tracking core.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "kebab_case")]
pub enum TcpAlert {
    /// SYN on a connection that is already established or closing.
    RepeatedSyn,
    /// Payload carried on a SYN where the target policy discards it.
    DataOnSyn,
    /// Data sent on a connection that is no longer accepting data.
    DataOnClosed,
    /// Data sent on a connection after it was reset.
    DataAfterReset,
    /// RST segment carrying payload.
    DataAfterRst,
    /// Data sent by an endpoint beyond its own FIN.
    DataAfterFin,
    /// RST outside of the receive window.
    BadRst,
    /// FIN beyond a previously recorded final FIN sequence.
    #[strum(serialize = "bad-fin-sequence")]
    BadFin,
    /// Timestamp older than the highest one recorded (PAWS).
    BadTimestamp,
    /// Timestamps were negotiated but the segment carries none.
    NoTimestamp,
    /// Data outside of the receive window.
    BadSegment,
    /// Advertised window larger than the configured maximum.
    WindowTooLarge,
    /// Window slam evasion pattern.
    WindowSlam,
    /// Overlap count exceeded the configured limit.
    ExcessiveOverlaps,
    /// Overlapping segments carried different bytes for the same sequence range.
    InconsistentOverlap,
    /// Link address of the client side changed mid-session.
    SessionHijackClient,
    /// Link address of the server side changed mid-session.
    SessionHijackServer,
    /// Data segment without the ACK flag.
    DataWithoutFlags,
    /// Too many consecutive small segments.
    SmallSegments,
    /// Reassembly queue limits exceeded.
    ReassemblyLimit,
    /// Handshake ACK does not acknowledge the SYN.
    InvalidAck,
    /// Urgent pointer and URG flag are inconsistent with the payload.
    BadUrgentPointer,
    /// Invalid TCP option combination.
    BadOptions,
    /// Traffic on a session that did not start with a three-way handshake.
    #[strum(serialize = "no-3whs")]
    No3whs,
}

/// Collects the alerts raised while processing one packet.
#[derive(Debug, Default)]
pub struct EventLogger {
    events: Vec<TcpAlert>,
}

impl EventLogger {
    pub fn new() -> Self {
        EventLogger { events: vec![] }
    }

    /// Records `alert` for the current packet. Repeated alerts are collapsed.
    #[inline]
    pub fn set_tcp_event(&mut self, alert: TcpAlert) {
        if !self.events.contains(&alert) {
            self.events.push(alert);
        }
    }

    #[inline]
    pub fn has(&self, alert: TcpAlert) -> bool {
        self.events.contains(&alert)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Logs and drains the alerts recorded for the current packet.
    pub fn log_tcp_events(&mut self, dir: Direction) -> Vec<TcpAlert> {
        for alert in self.events.iter() {
            let name: &'static str = alert.into();
            log::warn!("tcp alert {} ({:?})", name, dir);
        }
        ALERTS.inc_by(self.events.len() as u64);
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
