//! TCP session.
//!
//! A [StreamSession] owns the two [StreamTracker]s of one TCP connection and drives every packet
//! of the flow through the state machine. The external flow table creates one session per flow,
//! passes it each decoded segment with [StreamSession::process], and removes it once the returned
//! [ProcessOutcome] reports it torn down (or once [StreamSession::is_idle] says so).
//!
//! ## Example
//! ```
//! use std::sync::Arc;
//! use streamtrack_core::config::default_config;
//! use streamtrack_core::tcp::normalizer::Normalizer;
//! use streamtrack_core::tcp::segment::{Direction, SegmentDescriptor, ACK, SYN};
//! use streamtrack_core::tcp::session::{FlushedData, StreamSession};
//!
//! let config = Arc::new(default_config());
//! let norm = Arc::new(Normalizer::new(&config));
//! let mut session = StreamSession::new(config, norm);
//! let mut delivered: Vec<FlushedData> = vec![];
//!
//! let syn = SegmentDescriptor::new(Direction::FromClient, 100, 0, SYN, 1024, &[]);
//! session.process(&syn, &mut delivered);
//! let synack = SegmentDescriptor::new(Direction::FromServer, 500, 101, SYN | ACK, 1024, &[]);
//! session.process(&synack, &mut delivered);
//! let data = SegmentDescriptor::new(Direction::FromClient, 101, 501, ACK, 1024, b"GET /");
//! session.process(&data, &mut delivered);
//! assert_eq!(delivered[0].payload, b"GET /");
//! ```

pub(crate) mod context;
#[cfg(test)]
mod tests;

pub use self::context::SessionFlags;

use self::context::{SessionCore, TrackerCtx};
use crate::config::{FlushPolicy, StreamConfig};
use crate::stats::*;
use crate::tcp::actions::{NormAction, PacketAction};
use crate::tcp::event::TcpAlert;
use crate::tcp::normalizer::Normalizer;
use crate::tcp::segment::{Direction, SegmentDescriptor};
use crate::tcp::state::{ConnectionState, StateMachine};
use crate::tcp::tracker::StreamTracker;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Reassembled bytes handed to inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedData {
    /// Direction the bytes were sent in.
    pub dir: Direction,
    /// Sequence number of the first byte.
    pub seq: u32,
    pub payload: Vec<u8>,
}

/// Consumer of reassembled data.
pub trait Inspector {
    fn inspect(&mut self, data: FlushedData);
}

impl Inspector for Vec<FlushedData> {
    fn inspect(&mut self, data: FlushedData) {
        self.push(data);
    }
}

/// Adapts a closure to [Inspector].
pub struct InspectFn<F>(pub F);

impl<F> Inspector for InspectFn<F>
where
    F: FnMut(FlushedData),
{
    fn inspect(&mut self, data: FlushedData) {
        (self.0)(data)
    }
}

/// Result of processing one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub actions: PacketAction,
    pub norm: NormAction,
    /// Payload bytes to keep if `NormAction::TrimPayload` was requested.
    pub trim_len: Option<usize>,
    pub alerts: Vec<TcpAlert>,
    pub flushed_bytes: usize,
    /// Payload bytes dropped undelivered, e.g. data beyond a hole when the session was reset or
    /// torn down.
    pub discarded_bytes: usize,
    /// The session was released and must not be used for this flow anymore.
    pub torn_down: bool,
}

impl ProcessOutcome {
    #[inline]
    pub fn has_alert(&self, alert: TcpAlert) -> bool {
        self.alerts.contains(&alert)
    }
}

/// Bytes surfaced and dropped by a forced teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub flushed_bytes: usize,
    pub discarded_bytes: usize,
}

/* --------------------------------------------------------------------------------- */

/// Tracking state of one TCP connection.
#[derive(Debug)]
pub struct StreamSession {
    client: StreamTracker,
    server: StreamTracker,
    tsm: StateMachine,
    core: SessionCore,
    initialized: bool,
}

impl StreamSession {
    pub fn new(config: Arc<StreamConfig>, norm: Arc<Normalizer>) -> Self {
        StreamSession {
            client: StreamTracker::new(Direction::FromClient, config.clone(), norm.clone()),
            server: StreamTracker::new(Direction::FromServer, config.clone(), norm.clone()),
            tsm: StateMachine::new(),
            core: SessionCore::new(config, norm),
            initialized: false,
        }
    }

    /// Tracker of the endpoint that opened the connection.
    #[inline]
    pub fn client(&self) -> &StreamTracker {
        &self.client
    }

    #[inline]
    pub fn server(&self) -> &StreamTracker {
        &self.server
    }

    /// Direction the TCP client sends in.
    #[inline]
    pub fn client_dir(&self) -> Direction {
        self.core.client_dir
    }

    /// Coarse connection state of the whole session.
    #[inline]
    pub fn base_state(&self) -> ConnectionState {
        self.core.base_state
    }

    #[inline]
    pub fn flags(&self) -> SessionFlags {
        self.core.flags
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.core.flags.contains(SessionFlags::Closed)
    }

    /// State of the endpoint sending in `dir`.
    pub fn talker_state(&self, dir: Direction) -> ConnectionState {
        self.tracker(dir).state()
    }

    /// State of the endpoint receiving in `dir`.
    pub fn listener_state(&self, dir: Direction) -> ConnectionState {
        self.tracker(dir.reverse()).state()
    }

    /// Returns `true` if nothing was seen on the session for longer than the configured idle
    /// timeout.
    pub fn is_idle(&self, now: Duration) -> bool {
        let idle = now.saturating_sub(self.core.last_seen);
        idle.as_secs() > self.core.config.idle_timeout_secs
    }

    fn tracker(&self, tx_dir: Direction) -> &StreamTracker {
        if self.client.tx_dir() == tx_dir {
            &self.client
        } else {
            &self.server
        }
    }

    fn tracker_mut(&mut self, tx_dir: Direction) -> &mut StreamTracker {
        if self.client.tx_dir() == tx_dir {
            &mut self.client
        } else {
            &mut self.server
        }
    }

    /// Runs `f` with the talker and listener of a segment sent in `dir`.
    fn with_ctx<R>(&mut self, dir: Direction, f: impl FnOnce(&mut TrackerCtx<'_>) -> R) -> R {
        let (talker, listener) = if self.client.tx_dir() == dir {
            (&mut self.client, &mut self.server)
        } else {
            (&mut self.server, &mut self.client)
        };
        let mut cx = TrackerCtx {
            talker,
            listener,
            ssn: &mut self.core,
        };
        f(&mut cx)
    }

    /* --------------------------------------------------------------------------------- */

    /// Processes one segment of the flow. Reassembled data that becomes available is handed to
    /// `inspector` before returning.
    pub fn process<I>(&mut self, tsd: &SegmentDescriptor, inspector: &mut I) -> ProcessOutcome
    where
        I: Inspector + ?Sized,
    {
        SEGMENTS.inc();
        SEGMENT_BYTES.inc_by(tsd.len() as u64);
        self.core.begin_packet(tsd.pkt_time());

        let fresh = !self.initialized;
        if fresh && !self.setup(tsd) {
            if self.core.config.require_3whs && !tsd.is_rst() {
                self.core.tel.set_tcp_event(TcpAlert::No3whs);
            }
            return self.finish(tsd, inspector);
        }

        if !fresh
            && (self.client.state() == ConnectionState::Listen
                || self.server.state() == ConnectionState::Listen)
        {
            log::error!(
                "initialized session with a tracker in listen: client {} server {}",
                self.client.state(),
                self.server.state()
            );
            self.teardown_into_outbox();
            return self.finish(tsd, inspector);
        }

        if !self.pre_checks(tsd) {
            if fresh {
                self.initialized = false;
            }
            return self.finish(tsd, inspector);
        }

        self.dispatch(tsd);
        if self.core.restart_requested {
            self.restart(tsd);
            self.dispatch(tsd);
        }

        self.post_flush(tsd);
        if self.core.teardown_requested {
            self.teardown_into_outbox();
        }
        self.finish(tsd, inspector)
    }

    /// Picks the session up from its first packet. Returns `false` if the packet cannot start
    /// tracking.
    fn setup(&mut self, tsd: &SegmentDescriptor) -> bool {
        let client_dir = if tsd.is_syn_only() {
            tsd.dir()
        } else if tsd.is_rst() || self.core.config.require_3whs {
            return false;
        } else if tsd.is_syn_ack() {
            tsd.dir().reverse()
        } else {
            tsd.dir()
        };

        self.reset_trackers(client_dir);
        self.core.flags = SessionFlags::none();
        self.core.update_perf_base_state(ConnectionState::Listen);
        if !tsd.is_syn_only() {
            self.core.flags |= SessionFlags::Midstream;
            MIDSTREAM_PICKUPS.inc();
            log::debug!("midstream pickup on {:?} segment", tsd.dir());
        }
        SESSIONS_CREATED.inc();
        self.initialized = true;
        true
    }

    fn reset_trackers(&mut self, client_dir: Direction) {
        let config = self.core.config.clone();
        let norm = self.core.norm.clone();
        let client_mac = self.tracker(client_dir).mac;
        let server_mac = self.tracker(client_dir.reverse()).mac;
        self.client = StreamTracker::new(client_dir, config.clone(), norm.clone());
        self.server = StreamTracker::new(client_dir.reverse(), config, norm);
        self.client.mac = client_mac;
        self.server.mac = server_mac;
        self.core.client_dir = client_dir;
    }

    /// Checks run before the state machine. Returns `false` if the packet was dropped.
    fn pre_checks(&mut self, tsd: &SegmentDescriptor) -> bool {
        let check_hijack = self.core.config.check_session_hijacking;
        let ecn = self.client.ecn_enabled;
        self.with_ctx(tsd.dir(), |cx| {
            if check_hijack {
                cx.check_for_session_hijack(tsd);
            }
            let norm = cx.ssn.norm.clone();
            if !norm.handle_urgent(tsd, &mut cx.ssn.disp) {
                cx.set_alert(TcpAlert::BadUrgentPointer);
            }
            if !norm.handle_options(tsd, &mut cx.ssn.disp) {
                cx.set_alert(TcpAlert::BadOptions);
            }
            norm.ecn_stripper(tsd, ecn, &mut cx.ssn.disp);
            !cx.ssn.disp.is_dropped()
        })
    }

    fn dispatch(&mut self, tsd: &SegmentDescriptor) {
        let (talker, listener) = if self.client.tx_dir() == tsd.dir() {
            (&mut self.client, &mut self.server)
        } else {
            (&mut self.server, &mut self.client)
        };
        if !self.tsm.eval(tsd, talker, listener, &mut self.core) {
            log::debug!("{:?} segment stopped at talker, seq {}", tsd.dir(), tsd.seq());
        }
    }

    /// Starts a new incarnation of the connection on the same flow, opened by the sender of
    /// `tsd`.
    fn restart(&mut self, tsd: &SegmentDescriptor) {
        log::info!("session restarted by SYN from {:?}", tsd.dir());
        self.flush_all_into_outbox();
        let discarded = self.client.discard_queue() + self.server.discard_queue();
        self.core.note_discarded(discarded);

        self.reset_trackers(tsd.dir());
        self.core.flags = SessionFlags::none();
        self.core.restart_requested = false;
        self.core.teardown_requested = false;
        self.core.update_perf_base_state(ConnectionState::Listen);
        SESSIONS_RESTARTED.inc();
    }

    /// Opportunistic flush after the state machine ran.
    fn post_flush(&mut self, tsd: &SegmentDescriptor) {
        let flush_policy = self.core.config.flush_policy;
        let (talker, listener) = if self.client.tx_dir() == tsd.dir() {
            (&mut self.client, &mut self.server)
        } else {
            (&mut self.server, &mut self.client)
        };
        if tsd.is_ack() {
            let acked = talker.flush_acked();
            self.core.outbox.extend(acked);
        }
        if flush_policy == FlushPolicy::OnData {
            let ready = listener.flush(None, false);
            self.core.outbox.extend(ready);
        }
    }

    fn flush_all_into_outbox(&mut self) {
        let client_data = self.client.flush(None, false);
        let server_data = self.server.flush(None, false);
        self.core.outbox.extend(client_data);
        self.core.outbox.extend(server_data);
    }

    /// Flush-then-release teardown requested by the state machine.
    fn teardown_into_outbox(&mut self) {
        self.flush_all_into_outbox();
        self.release();
        self.core.disp.set_action(PacketAction::SessionClosed);
    }

    /// Drops everything queued and returns the session to its initial state.
    fn release(&mut self) -> usize {
        let discarded = self.client.discard_queue() + self.server.discard_queue();
        self.core.note_discarded(discarded);
        self.client = self.client.renew();
        self.server = self.server.renew();
        self.initialized = false;
        self.core.flags = SessionFlags::Closed;
        self.core.update_perf_base_state(ConnectionState::Closed);
        SESSIONS_CLOSED.inc();
        log::debug!("session released, {} bytes discarded", discarded);
        discarded
    }

    /// Delivers the outbox and builds the outcome of the packet.
    fn finish<I>(&mut self, tsd: &SegmentDescriptor, inspector: &mut I) -> ProcessOutcome
    where
        I: Inspector + ?Sized,
    {
        let mut flushed_bytes = 0;
        for data in self.core.outbox.drain(..) {
            flushed_bytes += data.payload.len();
            inspector.inspect(data);
        }
        BYTES_FLUSHED.inc_by(flushed_bytes as u64);

        let disp = &self.core.disp;
        ProcessOutcome {
            actions: disp.actions,
            norm: disp.norm,
            trim_len: disp.trim_len,
            alerts: self.core.tel.log_tcp_events(tsd.dir()),
            flushed_bytes,
            discarded_bytes: self.core.discarded,
            torn_down: disp.actions.contains(PacketAction::SessionClosed),
        }
    }

    /* --------------------------------------------------------------------------------- */

    /// Delivers contiguous queued data of both directions.
    pub fn flush<I>(&mut self, inspector: &mut I) -> usize
    where
        I: Inspector + ?Sized,
    {
        self.flush_server(inspector) + self.flush_client(inspector)
    }

    /// Delivers contiguous data queued at the client, i.e. the server to client stream.
    pub fn flush_client<I>(&mut self, inspector: &mut I) -> usize
    where
        I: Inspector + ?Sized,
    {
        deliver(self.client.flush(None, false), inspector)
    }

    /// Delivers contiguous data queued at the server, i.e. the client to server stream.
    pub fn flush_server<I>(&mut self, inspector: &mut I) -> usize
    where
        I: Inspector + ?Sized,
    {
        deliver(self.server.flush(None, false), inspector)
    }

    /// Delivers contiguous data queued at the endpoint sending in `dir`.
    pub fn flush_talker<I>(&mut self, dir: Direction, inspector: &mut I) -> usize
    where
        I: Inspector + ?Sized,
    {
        deliver(self.tracker_mut(dir).flush(None, false), inspector)
    }

    /// Delivers contiguous data queued at the endpoint receiving in `dir`.
    pub fn flush_listener<I>(&mut self, dir: Direction, inspector: &mut I) -> usize
    where
        I: Inspector + ?Sized,
    {
        deliver(self.tracker_mut(dir.reverse()).flush(None, false), inspector)
    }

    /// Forced teardown, typically on flow timeout or eviction. Contiguous data is surfaced first
    /// if an inspector is given. Everything else is discarded.
    pub fn cleanup_session(&mut self, surface: Option<&mut dyn Inspector>) -> CleanupReport {
        let mut report = CleanupReport::default();
        if !self.initialized {
            return report;
        }
        if let Some(inspector) = surface {
            report.flushed_bytes = self.flush(inspector);
            BYTES_FLUSHED.inc_by(report.flushed_bytes as u64);
        }
        report.discarded_bytes = self.release();
        report
    }

    /// Stops queuing data sent in `dir`. Connection state is still tracked.
    pub fn ignore_data(&mut self, dir: Direction) {
        let listener = self.tracker_mut(dir.reverse());
        listener.ignore_data = true;
        let discarded = listener.discard_queue();
        self.core.note_discarded(discarded);
        log::debug!("ignoring {:?} data, {} bytes discarded", dir, discarded);
    }
}

fn deliver<I>(chunks: Vec<FlushedData>, inspector: &mut I) -> usize
where
    I: Inspector + ?Sized,
{
    let mut bytes = 0;
    for data in chunks {
        bytes += data.payload.len();
        inspector.inspect(data);
    }
    bytes
}
