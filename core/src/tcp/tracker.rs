//! Per-direction stream tracking.
//!
//! A session owns two [StreamTracker]s, one per endpoint. Each tracker records what its endpoint
//! has sent (`iss`, `snd_una`, `snd_nxt`) and what it has received (`irs`, `rcv_nxt`,
//! `r_win_base`), the window it advertises, the options it negotiated, and the queue of data
//! sent *to* it that has not been flushed to inspection yet.

use crate::config::StreamConfig;
use crate::stats::{StatExt, OVERLAPS};
use crate::tcp::event::TcpAlert;
use crate::tcp::normalizer::Normalizer;
use crate::tcp::reassembly::{InsertReport, ReassemblyError, ReassemblyQueue};
use crate::tcp::segment::{Direction, SegmentDescriptor};
use crate::tcp::seq::*;
use crate::tcp::session::FlushedData;
use crate::tcp::state::{ConnectionState, TcpEvent};

use std::sync::Arc;
use std::time::Duration;

/// Largest shift allowed by RFC 7323.
const MAX_WSCALE: u8 = 14;

/// Result of offering a data segment to the receiving tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// Queued without touching existing data.
    Accepted,
    /// Queued, and overlapped data already queued.
    Overlapped(InsertReport),
    /// Queued beyond a hole.
    Gap,
    /// Entirely below the acknowledged floor. Never queued.
    Duplicate,
    /// Starts at or beyond the right edge of the receive window. Never queued.
    OutOfWindow,
}

/// State of one endpoint of a TCP connection.
#[derive(Debug)]
pub struct StreamTracker {
    pub(crate) state: ConnectionState,
    pub(crate) event: TcpEvent,
    /// Direction of the segments this endpoint sends.
    tx_dir: Direction,

    pub(crate) iss: u32,
    pub(crate) irs: u32,
    pub(crate) snd_una: u32,
    pub(crate) snd_nxt: u32,
    /// Window advertised by the peer, as last seen by this endpoint.
    pub(crate) snd_wnd: u32,
    pub(crate) rcv_nxt: u32,
    /// Highest sequence number this endpoint acknowledged.
    pub(crate) r_win_base: u32,
    /// Scaled window this endpoint advertises.
    pub(crate) rcv_wnd: u32,
    pub(crate) window_known: bool,
    pub(crate) window_reopens: u32,

    pub(crate) wscale: Option<u8>,
    pub(crate) wscale_ok: bool,
    pub(crate) mss: u16,
    pub(crate) tstamp_sent: bool,
    pub(crate) tstamp_ok: bool,
    pub(crate) ts_last: Option<u32>,
    pub(crate) ts_last_packet: Duration,
    pub(crate) ecn_enabled: bool,

    /// Sequence number of the FIN this endpoint sent.
    pub(crate) fin_seq_sent: Option<u32>,
    /// Sequence number of the FIN this endpoint received.
    pub(crate) fin_final_seq: Option<u32>,

    pub(crate) reassembler: ReassemblyQueue,
    pub(crate) retransmits: u32,
    pub(crate) overlap_count: u32,
    pub(crate) small_seg_count: u32,
    pub(crate) ignore_data: bool,
    pub(crate) queue_terminated: bool,
    pub(crate) mac: Option<[u8; 6]>,

    config: Arc<StreamConfig>,
    norm: Arc<Normalizer>,
}

impl StreamTracker {
    pub fn new(tx_dir: Direction, config: Arc<StreamConfig>, norm: Arc<Normalizer>) -> Self {
        StreamTracker {
            state: ConnectionState::Listen,
            event: TcpEvent::AckRecv,
            tx_dir,
            iss: 0,
            irs: 0,
            snd_una: 0,
            snd_nxt: 0,
            snd_wnd: 0,
            rcv_nxt: 0,
            r_win_base: 0,
            rcv_wnd: 0,
            window_known: false,
            window_reopens: 0,
            wscale: None,
            wscale_ok: false,
            mss: 0,
            tstamp_sent: false,
            tstamp_ok: false,
            ts_last: None,
            ts_last_packet: Duration::ZERO,
            ecn_enabled: false,
            fin_seq_sent: None,
            fin_final_seq: None,
            reassembler: ReassemblyQueue::new(config.max_queued_bytes, config.max_queued_segs),
            retransmits: 0,
            overlap_count: 0,
            small_seg_count: 0,
            ignore_data: false,
            queue_terminated: false,
            mac: None,
            config,
            norm,
        }
    }

    /// Returns a fresh tracker for a new incarnation of the connection. The link address is kept
    /// so hijack detection carries over.
    pub(crate) fn renew(&self) -> Self {
        let mut fresh = StreamTracker::new(self.tx_dir, self.config.clone(), self.norm.clone());
        fresh.mac = self.mac;
        fresh
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[inline]
    pub fn event(&self) -> TcpEvent {
        self.event
    }

    #[inline]
    pub fn tx_dir(&self) -> Direction {
        self.tx_dir
    }

    #[inline]
    pub fn rcv_nxt(&self) -> u32 {
        self.rcv_nxt
    }

    #[inline]
    pub fn r_win_base(&self) -> u32 {
        self.r_win_base
    }

    #[inline]
    pub fn rcv_wnd(&self) -> u32 {
        self.rcv_wnd
    }

    #[inline]
    pub fn fin_final_seq(&self) -> Option<u32> {
        self.fin_final_seq
    }

    #[inline]
    pub fn queued_bytes(&self) -> usize {
        self.reassembler.queued_bytes()
    }

    #[inline]
    pub fn queued_segments(&self) -> usize {
        self.reassembler.len()
    }

    #[inline]
    pub(crate) fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            log::debug!("{:?} tracker: {:?} -> {:?}", self.tx_dir, self.state, state);
            self.state = state;
        }
    }

    /// Classifies `tsd` for this tracker. The talker gets the `*Sent` event, the listener the
    /// `*Recv` one.
    pub fn set_tcp_event(&mut self, tsd: &SegmentDescriptor, talker: bool) {
        use TcpEvent::*;
        let (sent, recv) = if tsd.is_syn_only() {
            (SynSent, SynRecv)
        } else if tsd.is_syn_ack() {
            (SynAckSent, SynAckRecv)
        } else if tsd.is_rst() {
            (RstSent, RstRecv)
        } else if tsd.is_fin() {
            (FinSent, FinRecv)
        } else if tsd.has_data() {
            (DataSegSent, DataSegRecv)
        } else {
            (AckSent, AckRecv)
        };
        self.event = if talker { sent } else { recv };
    }

    /// Advertised window of `tsd`, scaled if window scaling was negotiated.
    fn scaled_window(&self, tsd: &SegmentDescriptor) -> u32 {
        let wnd = tsd.window() as u32;
        if tsd.is_syn() || !self.wscale_ok {
            return wnd;
        }
        wnd << self.wscale.unwrap_or(0).min(MAX_WSCALE)
    }

    fn record_options(&mut self, tsd: &SegmentDescriptor) {
        self.wscale = tsd.wscale();
        if let Some(mss) = tsd.mss() {
            self.mss = mss;
        }
        if let Some(ts) = tsd.timestamp() {
            self.tstamp_sent = true;
            self.ts_last = Some(ts.tsval);
            self.ts_last_packet = tsd.pkt_time();
        }
    }

    fn set_rcv_base(&mut self, seq: u32) {
        self.rcv_nxt = seq;
        self.r_win_base = seq;
        if self.reassembler.frontier().is_none() {
            self.reassembler.set_frontier(seq);
        }
    }

    /// Window scaling and timestamps are only in effect if both endpoints offered them.
    pub(crate) fn negotiate(&mut self, peer: &StreamTracker) {
        self.wscale_ok = self.wscale.is_some() && peer.wscale.is_some();
        self.tstamp_ok = self.tstamp_sent && peer.tstamp_sent;
    }

    /* --------------------------------------------------------------------------------- */

    /// This endpoint sent the initial SYN.
    pub fn init_on_syn_sent(&mut self, tsd: &SegmentDescriptor) {
        self.record_syn_sent(tsd);
        self.set_state(ConnectionState::SynSent);
    }

    /// Send sequence space of a SYN this endpoint sent. The state is left alone.
    pub(crate) fn record_syn_sent(&mut self, tsd: &SegmentDescriptor) {
        self.iss = tsd.seq();
        self.snd_una = tsd.seq();
        self.snd_nxt = tsd.end_seq();
        self.rcv_wnd = tsd.window() as u32;
        self.window_known = true;
        self.ecn_enabled = tsd.has_ecn_flags();
        self.record_options(tsd);
    }

    /// This endpoint received the initial SYN. A SYN with a new ISN replaces the receive
    /// sequence space, so anything still queued is discarded. Returns the number of discarded
    /// bytes.
    pub fn init_on_syn_recv(&mut self, tsd: &SegmentDescriptor) -> usize {
        let discarded = if self.reassembler.frontier().is_some() && tsd.seq() != self.irs {
            self.reassembler.reset()
        } else {
            0
        };
        self.irs = tsd.seq();
        self.set_rcv_base(tsd.seq().wrapping_add(1));
        self.snd_wnd = tsd.window() as u32;
        self.set_state(ConnectionState::SynRecv);
        discarded
    }

    /// This endpoint sent a SYN/ACK, either answering a SYN or as the first packet seen.
    pub fn init_on_synack_sent(&mut self, tsd: &SegmentDescriptor) {
        self.iss = tsd.seq();
        self.snd_una = tsd.seq();
        self.snd_nxt = tsd.end_seq();
        self.irs = tsd.ack().wrapping_sub(1);
        if self.reassembler.frontier().is_none() {
            self.set_rcv_base(tsd.ack());
        } else {
            self.r_win_base = seq_max(self.r_win_base, tsd.ack());
            self.rcv_nxt = seq_max(self.rcv_nxt, tsd.ack());
        }
        self.rcv_wnd = tsd.window() as u32;
        self.window_known = true;
        self.record_options(tsd);
        self.set_state(ConnectionState::SynRecv);
    }

    /// This endpoint received a SYN/ACK acknowledging its SYN.
    pub fn init_on_synack_recv(&mut self, tsd: &SegmentDescriptor) {
        self.irs = tsd.seq();
        self.set_rcv_base(tsd.seq().wrapping_add(1));
        if self.state == ConnectionState::Listen {
            self.iss = tsd.ack().wrapping_sub(1);
            self.snd_nxt = tsd.ack();
        }
        self.snd_una = tsd.ack();
        self.snd_wnd = tsd.window() as u32;
        self.set_state(ConnectionState::Established);
    }

    /// First packet seen is an ACK sent by this endpoint.
    pub fn init_on_3whs_ack_sent(&mut self, tsd: &SegmentDescriptor) {
        self.iss = tsd.seq().wrapping_sub(1);
        self.snd_una = tsd.seq();
        self.snd_nxt = tsd.end_seq();
        self.irs = tsd.ack().wrapping_sub(1);
        self.set_rcv_base(tsd.ack());
        self.rcv_wnd = tsd.window() as u32;
        self.window_known = true;
        self.record_options(tsd);
        self.tstamp_ok = self.tstamp_sent;
        self.set_state(ConnectionState::Established);
    }

    /// First packet seen is an ACK received by this endpoint.
    pub fn init_on_3whs_ack_recv(&mut self, tsd: &SegmentDescriptor) {
        self.irs = tsd.seq().wrapping_sub(1);
        self.set_rcv_base(tsd.seq());
        self.iss = tsd.ack().wrapping_sub(1);
        self.snd_una = tsd.ack();
        self.snd_nxt = tsd.ack();
        self.snd_wnd = tsd.window() as u32;
        self.set_state(ConnectionState::Established);
    }

    /// First packet seen is a data segment sent by this endpoint.
    pub fn init_on_data_seg_sent(&mut self, tsd: &SegmentDescriptor) {
        self.init_on_3whs_ack_sent(tsd);
    }

    /// First packet seen is a data segment received by this endpoint.
    pub fn init_on_data_seg_recv(&mut self, tsd: &SegmentDescriptor) {
        self.init_on_3whs_ack_recv(tsd);
    }

    /* --------------------------------------------------------------------------------- */

    /// Bookkeeping for a segment this endpoint sent: acknowledgment, advertised window and send
    /// sequence.
    pub fn update_tracker_ack_sent(&mut self, tsd: &SegmentDescriptor) {
        if tsd.is_ack() {
            self.r_win_base = seq_max(self.r_win_base, tsd.ack());
            self.rcv_nxt = seq_max(self.rcv_nxt, self.r_win_base);
        }
        let wnd = self.scaled_window(tsd);
        if self.window_known && self.rcv_wnd == 0 && wnd > 0 {
            self.window_reopens += 1;
        }
        self.rcv_wnd = wnd;
        self.window_known = true;
        if seq_gt(tsd.end_seq(), self.snd_nxt) {
            self.snd_nxt = tsd.end_seq();
        }
    }

    /// Bookkeeping for a segment this endpoint received. `peer_wnd` is the window the sender
    /// advertised.
    pub fn update_tracker_ack_recv(&mut self, tsd: &SegmentDescriptor, peer_wnd: u32) {
        if tsd.is_ack() && seq_gt(tsd.ack(), self.snd_una) {
            self.snd_una = tsd.ack();
            if seq_gt(self.snd_una, self.snd_nxt) {
                self.snd_nxt = self.snd_una;
            }
        }
        self.snd_wnd = peer_wnd;
    }

    /// Returns `true` once the FIN this endpoint sent was acknowledged.
    #[inline]
    pub fn fin_acked(&self) -> bool {
        match self.fin_seq_sent {
            Some(fin) => seq_gt(self.snd_una, fin),
            None => false,
        }
    }

    /// Records the FIN this endpoint sent.
    pub fn update_on_fin_sent(&mut self, tsd: &SegmentDescriptor) {
        let fin_seq = tsd.fin_seq();
        self.fin_seq_sent = Some(match self.fin_seq_sent {
            Some(prev) => seq_min(prev, fin_seq),
            None => fin_seq,
        });
        if seq_gt(tsd.end_seq(), self.snd_nxt) {
            self.snd_nxt = tsd.end_seq();
        }
    }

    /// Records the FIN this endpoint received. Returns `false` if the FIN lies beyond a
    /// previously received one, or entirely below what this endpoint already acknowledged.
    pub fn update_on_fin_recv(&mut self, tsd: &SegmentDescriptor) -> bool {
        let fin_seq = tsd.fin_seq();
        if let Some(final_seq) = self.fin_final_seq {
            return seq_leq(fin_seq, final_seq);
        }
        if seq_lt(tsd.end_seq(), self.r_win_base) {
            return false;
        }
        self.fin_final_seq = Some(fin_seq);
        if fin_seq == self.rcv_nxt {
            self.rcv_nxt = fin_seq.wrapping_add(1);
        }
        true
    }

    /// Validates a RST received by this endpoint. An accepted RST closes the tracker.
    pub fn update_on_rst(&mut self, tsd: &SegmentDescriptor) -> bool {
        let valid = if self.state == ConnectionState::SynSent {
            tsd.is_ack() && tsd.ack() == self.iss.wrapping_add(1)
        } else {
            let wnd = if self.window_known { self.rcv_wnd } else { 0 };
            self.norm.validate_rst(tsd, self.rcv_nxt, wnd)
        };
        if valid {
            self.set_state(ConnectionState::Closed);
        } else {
            log::debug!(
                "Bad RST. seq: {} rcv_nxt: {} rcv_wnd: {}",
                tsd.seq(),
                self.rcv_nxt,
                self.rcv_wnd
            );
        }
        valid
    }

    /* --------------------------------------------------------------------------------- */

    /// PAWS check of a segment sent by this endpoint against the highest timestamp it sent
    /// before (RFC 7323, section 5).
    pub fn validate_timestamp(&self, tsd: &SegmentDescriptor) -> bool {
        if !self.config.paws || !self.tstamp_ok || tsd.is_rst() {
            return true;
        }
        let (ts, last) = match (tsd.timestamp(), self.ts_last) {
            (Some(ts), Some(last)) => (ts, last),
            _ => return true,
        };
        if !self.norm.checks_tsval(ts.tsval) || seq_geq(ts.tsval, last) {
            return true;
        }
        // an idle connection's recorded timestamp is no longer trusted
        let idle = tsd.pkt_time().saturating_sub(self.ts_last_packet);
        if idle.as_secs() > self.config.paws_idle_limit_secs {
            return true;
        }
        log::debug!("PAWS reject. tsval: {} last: {}", ts.tsval, last);
        false
    }

    /// Records the timestamp of a segment sent by this endpoint if it is the newest one.
    pub fn update_ts_last(&mut self, tsd: &SegmentDescriptor) {
        if let Some(ts) = tsd.timestamp() {
            if !self.norm.checks_tsval(ts.tsval) {
                return;
            }
            if self.ts_last.map_or(true, |last| seq_geq(ts.tsval, last)) {
                self.ts_last = Some(ts.tsval);
                self.ts_last_packet = tsd.pkt_time();
            }
        }
    }

    /// Window checks for a segment sent by this endpoint. `from_client` tells whether this
    /// endpoint is the TCP client.
    pub fn check_window_slam(
        &mut self,
        tsd: &SegmentDescriptor,
        from_client: bool,
        midstream: bool,
    ) -> Option<TcpAlert> {
        let config = &self.config;
        if config.max_window > 0 && self.rcv_wnd > config.max_window {
            return Some(TcpAlert::WindowTooLarge);
        }
        if from_client
            && !midstream
            && tsd.is_ack()
            && !(tsd.is_syn() || tsd.is_fin() || tsd.is_rst())
            && tsd.ack() == self.irs.wrapping_add(1)
            && (tsd.window() as u32) <= config.window_slam_max
        {
            return Some(TcpAlert::WindowSlam);
        }
        if config.max_window_reopens > 0 && self.window_reopens > config.max_window_reopens {
            self.window_reopens = 0;
            return Some(TcpAlert::WindowSlam);
        }
        None
    }

    /// Counts consecutive small segments received. Returns `true` when the configured count is
    /// reached.
    pub fn count_small_segment(&mut self, tsd: &SegmentDescriptor) -> bool {
        let small = &self.config.small_segments;
        if small.count == 0 || !tsd.has_data() {
            return false;
        }
        if tsd.len() as u32 <= small.maximum_size {
            self.small_seg_count += 1;
            if self.small_seg_count >= small.count {
                self.small_seg_count = 0;
                return true;
            }
        } else {
            self.small_seg_count = 0;
        }
        false
    }

    /// Number of payload bytes the receive window admits from `seq`, if the window is known.
    pub fn window_room(&self, seq: u32) -> Option<usize> {
        if !self.window_known {
            return None;
        }
        let right_edge = self.r_win_base.wrapping_add(self.rcv_wnd);
        if seq_geq(seq, right_edge) {
            Some(0)
        } else {
            Some(seq_distance(seq, right_edge) as usize)
        }
    }

    /// Offers the first `keep` payload bytes of a segment received by this endpoint to the
    /// reassembly queue.
    pub fn accept_segment(
        &mut self,
        tsd: &SegmentDescriptor,
        keep: usize,
    ) -> Result<SegmentOutcome, ReassemblyError> {
        let payload = &tsd.payload()[..keep.min(tsd.len())];
        let seq = tsd.data_seq();
        if payload.is_empty() {
            return Ok(SegmentOutcome::Accepted);
        }
        let end = seq.wrapping_add(payload.len() as u32);

        let floor = match self.reassembler.frontier() {
            Some(frontier) => seq_max(frontier, self.r_win_base),
            None => self.r_win_base,
        };
        if seq_leq(end, floor) {
            self.retransmits += 1;
            log::debug!("Dropping old segment. cur: {} floor: {}", seq, floor);
            return Ok(SegmentOutcome::Duplicate);
        }
        // zero-window probes are tolerated
        let probe = self.rcv_wnd == 0 && seq == self.r_win_base;
        if self.window_known && !probe {
            let right_edge = self.r_win_base.wrapping_add(self.rcv_wnd);
            if seq_geq(seq, right_edge) {
                log::debug!("Out of window segment. cur: {} edge: {}", seq, right_edge);
                return Ok(SegmentOutcome::OutOfWindow);
            }
        }

        let contiguous = self.reassembler.contiguous_end();
        let report = self
            .reassembler
            .insert(seq, payload, self.norm.overlap_rule())?;
        if report.duplicate {
            self.retransmits += 1;
            return Ok(SegmentOutcome::Duplicate);
        }
        if let Some(end) = self.reassembler.contiguous_end() {
            self.rcv_nxt = seq_max(self.rcv_nxt, end);
        }
        if report.overlaps > 0 {
            self.overlap_count += report.overlaps;
            OVERLAPS.inc_by(report.overlaps as u64);
            if report.retransmit {
                self.retransmits += 1;
            }
            return Ok(SegmentOutcome::Overlapped(report));
        }
        match contiguous {
            Some(c) if seq_gt(seq, c) => Ok(SegmentOutcome::Gap),
            _ => Ok(SegmentOutcome::Accepted),
        }
    }

    /// Releases queued data up to `limit`, tagged with the direction it was sent in.
    pub fn flush(&mut self, limit: Option<u32>, skip_gaps: bool) -> Vec<FlushedData> {
        let dir = self.tx_dir.reverse();
        self.reassembler
            .flush(limit, skip_gaps)
            .into_iter()
            .map(|chunk| FlushedData {
                dir,
                seq: chunk.seq,
                payload: chunk.payload,
            })
            .collect()
    }

    /// Releases everything this endpoint acknowledged, jumping over data the sensor missed.
    pub fn flush_acked(&mut self) -> Vec<FlushedData> {
        if !self.window_known {
            return vec![];
        }
        self.flush(Some(self.r_win_base), true)
    }

    /// Discards everything queued. Returns the number of discarded bytes.
    pub fn discard_queue(&mut self) -> usize {
        self.reassembler.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::tcp::segment::*;

    fn trackers() -> (StreamTracker, StreamTracker) {
        let config = Arc::new(default_config());
        let norm = Arc::new(Normalizer::new(&config));
        (
            StreamTracker::new(Direction::FromClient, config.clone(), norm.clone()),
            StreamTracker::new(Direction::FromServer, config, norm),
        )
    }

    fn established() -> (StreamTracker, StreamTracker) {
        let (mut client, mut server) = trackers();
        let syn = SegmentDescriptor::new(Direction::FromClient, 100, 0, SYN, 1024, &[]);
        client.init_on_syn_sent(&syn);
        server.init_on_syn_recv(&syn);
        let synack = SegmentDescriptor::new(Direction::FromServer, 500, 101, SYN | ACK, 1024, &[]);
        server.init_on_synack_sent(&synack);
        client.init_on_synack_recv(&synack);
        let ack = SegmentDescriptor::new(Direction::FromClient, 101, 501, ACK, 1024, &[]);
        client.update_tracker_ack_sent(&ack);
        server.update_tracker_ack_recv(&ack, client.rcv_wnd);
        (client, server)
    }

    #[test]
    fn core_tracker_handshake_bookkeeping() {
        let (client, server) = established();
        assert_eq!(client.state(), ConnectionState::Established);
        assert_eq!(server.state(), ConnectionState::SynRecv);
        assert_eq!(client.rcv_nxt(), 501);
        assert_eq!(server.rcv_nxt(), 101);
        assert_eq!(server.snd_una, 501);
        assert_eq!(client.r_win_base(), 501);
    }

    #[test]
    fn core_tracker_new_isn_replaces_receive_space() {
        let (_, mut server) = trackers();
        let syn = SegmentDescriptor::new(Direction::FromClient, 100, 0, SYN, 1024, &[]);
        assert_eq!(server.init_on_syn_recv(&syn), 0);
        let early = SegmentDescriptor::new(Direction::FromClient, 120, 0, ACK, 1024, &[1; 10]);
        assert!(server.accept_segment(&early, 10).is_ok());
        assert_eq!(server.queued_bytes(), 10);

        // same ISN again keeps what is queued
        assert_eq!(server.init_on_syn_recv(&syn), 0);
        assert_eq!(server.queued_bytes(), 10);

        let lower = SegmentDescriptor::new(Direction::FromClient, 50, 0, SYN, 1024, &[]);
        assert_eq!(server.init_on_syn_recv(&lower), 10);
        assert_eq!(server.rcv_nxt(), 51);
        assert_eq!(server.reassembler.frontier(), Some(51));

        let data = [2u8; 60];
        let seg = SegmentDescriptor::new(Direction::FromClient, 51, 0, ACK, 1024, &data);
        assert_eq!(server.accept_segment(&seg, 60), Ok(SegmentOutcome::Accepted));
        assert_eq!(server.rcv_nxt(), 111);
    }

    #[test]
    fn core_tracker_classifies_events() {
        let (mut client, _) = trackers();
        let data = [0u8; 4];
        let fin = SegmentDescriptor::new(Direction::FromClient, 1, 1, FIN | ACK, 10, &data);
        client.set_tcp_event(&fin, true);
        assert_eq!(client.event(), TcpEvent::FinSent);
        let rst = SegmentDescriptor::new(Direction::FromClient, 1, 1, RST | FIN, 10, &data);
        client.set_tcp_event(&rst, false);
        assert_eq!(client.event(), TcpEvent::RstRecv);
        let seg = SegmentDescriptor::new(Direction::FromClient, 1, 1, ACK, 10, &data);
        client.set_tcp_event(&seg, false);
        assert_eq!(client.event(), TcpEvent::DataSegRecv);
    }

    #[test]
    fn core_tracker_duplicate_and_window() {
        let (_, mut server) = established();
        let data = [7u8; 10];

        let seg = SegmentDescriptor::new(Direction::FromClient, 101, 501, ACK, 1024, &data);
        assert_eq!(server.accept_segment(&seg, 10), Ok(SegmentOutcome::Accepted));
        assert_eq!(server.rcv_nxt(), 111);

        // acknowledged, then retransmitted
        let ack = SegmentDescriptor::new(Direction::FromServer, 501, 111, ACK, 1024, &[]);
        server.update_tracker_ack_sent(&ack);
        server.flush_acked();
        assert_eq!(server.accept_segment(&seg, 10), Ok(SegmentOutcome::Duplicate));
        assert_eq!(server.queued_segments(), 0);

        let gap = SegmentDescriptor::new(Direction::FromClient, 121, 501, ACK, 1024, &data);
        assert_eq!(server.accept_segment(&gap, 10), Ok(SegmentOutcome::Gap));

        let far = SegmentDescriptor::new(Direction::FromClient, 111 + 1024, 501, ACK, 1024, &data);
        assert_eq!(server.accept_segment(&far, 10), Ok(SegmentOutcome::OutOfWindow));
        assert_eq!(server.window_room(111 + 1020), Some(4));
    }

    #[test]
    fn core_tracker_rst_validation() {
        let (mut client, mut server) = trackers();
        let syn = SegmentDescriptor::new(Direction::FromClient, 100, 0, SYN, 1024, &[]);
        client.init_on_syn_sent(&syn);
        server.init_on_syn_recv(&syn);

        let bad = SegmentDescriptor::new(Direction::FromServer, 0, 100, RST | ACK, 0, &[]);
        assert!(!client.update_on_rst(&bad));
        assert_eq!(client.state(), ConnectionState::SynSent);
        let good = SegmentDescriptor::new(Direction::FromServer, 0, 101, RST | ACK, 0, &[]);
        assert!(client.update_on_rst(&good));
        assert_eq!(client.state(), ConnectionState::Closed);

        let (mut client, _) = established();
        let outside = SegmentDescriptor::new(Direction::FromServer, 501 + 1024, 0, RST, 0, &[]);
        assert!(!client.update_on_rst(&outside));
        let inside = SegmentDescriptor::new(Direction::FromServer, 600, 0, RST, 0, &[]);
        assert!(client.update_on_rst(&inside));
    }

    #[test]
    fn core_tracker_fin_bookkeeping() {
        let (mut client, mut server) = established();
        let fin = SegmentDescriptor::new(Direction::FromClient, 101, 501, FIN | ACK, 1024, &[]);
        client.update_on_fin_sent(&fin);
        assert_eq!(client.fin_seq_sent, Some(101));
        assert!(!client.fin_acked());

        assert!(server.update_on_fin_recv(&fin));
        assert_eq!(server.fin_final_seq(), Some(101));
        assert_eq!(server.rcv_nxt(), 102);
        // retransmitted FIN is fine, one further along is not
        assert!(server.update_on_fin_recv(&fin));
        let beyond = SegmentDescriptor::new(Direction::FromClient, 105, 501, FIN | ACK, 1024, &[]);
        assert!(!server.update_on_fin_recv(&beyond));

        let ack = SegmentDescriptor::new(Direction::FromServer, 501, 102, ACK, 1024, &[]);
        client.update_tracker_ack_recv(&ack, 1024);
        assert!(client.fin_acked());
    }

    #[test]
    fn core_tracker_paws() {
        let (mut client, mut server) = trackers();
        let syn = SegmentDescriptor::new(Direction::FromClient, 100, 0, SYN, 1024, &[])
            .with_timestamp(1000, 0);
        client.init_on_syn_sent(&syn);
        server.init_on_syn_recv(&syn);
        let synack = SegmentDescriptor::new(Direction::FromServer, 500, 101, SYN | ACK, 1024, &[])
            .with_timestamp(7000, 1000);
        server.init_on_synack_sent(&synack);
        client.negotiate(&server);
        assert!(client.tstamp_ok);

        let fresh = SegmentDescriptor::new(Direction::FromClient, 101, 501, ACK, 1024, &[])
            .with_timestamp(1001, 7000);
        assert!(client.validate_timestamp(&fresh));
        client.update_ts_last(&fresh);

        let stale = SegmentDescriptor::new(Direction::FromClient, 101, 501, ACK, 1024, &[])
            .with_timestamp(999, 7000)
            .with_time(Duration::from_secs(10));
        assert!(!client.validate_timestamp(&stale));

        let idle = stale.clone().with_time(Duration::from_secs(25 * 24 * 60 * 60));
        assert!(client.validate_timestamp(&idle));
    }

    #[test]
    fn core_tracker_window_slam() {
        let (mut client, _) = established();
        let slam = SegmentDescriptor::new(Direction::FromClient, 101, 501, ACK, 0, &[]);
        assert_eq!(
            client.check_window_slam(&slam, true, false),
            Some(TcpAlert::WindowSlam)
        );
        assert_eq!(client.check_window_slam(&slam, true, true), None);
        let normal = SegmentDescriptor::new(Direction::FromClient, 101, 501, ACK, 1024, &[]);
        assert_eq!(client.check_window_slam(&normal, true, false), None);
    }
}
