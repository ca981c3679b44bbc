//! Session-wide state shared by the state handlers.

use crate::config::{QueueLimitAction, StreamConfig};
use crate::stats::*;
use crate::tcp::actions::{PacketAction, PacketDisposition};
use crate::tcp::event::{EventLogger, TcpAlert};
use crate::tcp::normalizer::Normalizer;
use crate::tcp::segment::{Direction, SegmentDescriptor, ECE};
use crate::tcp::seq::*;
use crate::tcp::session::FlushedData;
use crate::tcp::state::ConnectionState;
use crate::tcp::tracker::{SegmentOutcome, StreamTracker};

use bitmask_enum::bitmask;
use std::sync::Arc;
use std::time::Duration;

/// Flow-level flags.
#[bitmask(u8)]
#[bitmask_config(vec_debug)]
pub enum SessionFlags {
    Midstream,   // Picked up without a SYN
    Established, // Three-way handshake completed
    Reset,       // Valid RST seen
    Closed,      // Torn down
}

/// Everything a session holds besides its two trackers.
#[derive(Debug)]
pub(crate) struct SessionCore {
    pub(crate) config: Arc<StreamConfig>,
    pub(crate) norm: Arc<Normalizer>,
    pub(crate) tel: EventLogger,
    pub(crate) disp: PacketDisposition,
    pub(crate) flags: SessionFlags,
    /// Data flushed while processing the current packet, delivered when it completes.
    pub(crate) outbox: Vec<FlushedData>,
    /// Payload bytes dropped without being delivered while processing the current packet.
    pub(crate) discarded: usize,
    pub(crate) teardown_requested: bool,
    pub(crate) restart_requested: bool,
    pub(crate) base_state: ConnectionState,
    /// Direction the TCP client sends in.
    pub(crate) client_dir: Direction,
    pub(crate) last_seen: Duration,
}

impl SessionCore {
    pub(crate) fn new(config: Arc<StreamConfig>, norm: Arc<Normalizer>) -> Self {
        SessionCore {
            config,
            norm,
            tel: EventLogger::new(),
            disp: PacketDisposition::new(),
            flags: SessionFlags::none(),
            outbox: vec![],
            discarded: 0,
            teardown_requested: false,
            restart_requested: false,
            base_state: ConnectionState::Listen,
            client_dir: Direction::FromClient,
            last_seen: Duration::ZERO,
        }
    }

    /// Clears per-packet state.
    pub(crate) fn begin_packet(&mut self, pkt_time: Duration) {
        self.tel.clear();
        self.disp.clear();
        self.outbox.clear();
        self.discarded = 0;
        self.teardown_requested = false;
        self.restart_requested = false;
        if pkt_time > self.last_seen {
            self.last_seen = pkt_time;
        }
    }

    /// Accounts for payload bytes that will never be delivered.
    pub(crate) fn note_discarded(&mut self, bytes: usize) {
        if bytes > 0 {
            BYTES_DISCARDED.inc_by(bytes as u64);
            self.discarded += bytes;
        }
    }

    pub(crate) fn update_perf_base_state(&mut self, state: ConnectionState) {
        if self.base_state != state {
            log::debug!("session base state: {:?} -> {:?}", self.base_state, state);
            self.base_state = state;
        }
    }
}

/* --------------------------------------------------------------------------------- */

/// Both trackers of a session, resolved for the packet being processed, plus the session core.
pub(crate) struct TrackerCtx<'a> {
    pub(crate) talker: &'a mut StreamTracker,
    pub(crate) listener: &'a mut StreamTracker,
    pub(crate) ssn: &'a mut SessionCore,
}

impl<'a> TrackerCtx<'a> {
    #[inline]
    pub(crate) fn set_alert(&mut self, alert: TcpAlert) {
        self.ssn.tel.set_tcp_event(alert);
    }

    #[inline]
    pub(crate) fn set_pkt_action_flag(&mut self, action: PacketAction) {
        self.ssn.disp.set_action(action);
    }

    #[inline]
    pub(crate) fn talker_is_client(&self) -> bool {
        self.talker.tx_dir() == self.ssn.client_dir
    }

    #[inline]
    pub(crate) fn is_midstream(&self) -> bool {
        self.ssn.flags.contains(SessionFlags::Midstream)
    }

    #[inline]
    pub(crate) fn is_reset(&self) -> bool {
        self.ssn.flags.contains(SessionFlags::Reset)
    }

    pub(crate) fn update_perf_base_state(&mut self, state: ConnectionState) {
        self.ssn.update_perf_base_state(state);
    }

    /// Asks the normalizer to drop the packet.
    pub(crate) fn mark_packet_for_drop(&mut self) {
        if self.ssn.norm.packet_dropper(&mut self.ssn.disp) {
            DISCARDS.inc();
        }
    }

    /// Raises `alert` and rejects the packet.
    pub(crate) fn reject(&mut self, alert: TcpAlert) {
        self.set_alert(alert);
        self.set_pkt_action_flag(PacketAction::BadPkt);
        self.mark_packet_for_drop();
    }

    pub(crate) fn update_ack_sent(&mut self, tsd: &SegmentDescriptor) {
        self.talker.update_tracker_ack_sent(tsd);
    }

    pub(crate) fn update_ack_recv(&mut self, tsd: &SegmentDescriptor) {
        let peer_wnd = self.talker.rcv_wnd();
        self.listener.update_tracker_ack_recv(tsd, peer_wnd);
    }

    /// Settles window scaling, timestamps and ECN once the SYN/ACK answered the SYN.
    pub(crate) fn negotiate_options(&mut self, tsd: &SegmentDescriptor) {
        self.talker.negotiate(&*self.listener);
        self.listener.negotiate(&*self.talker);
        let ecn = self.listener.ecn_enabled && tsd.flags() & ECE != 0;
        self.talker.ecn_enabled = ecn;
        self.listener.ecn_enabled = ecn;
    }

    pub(crate) fn update_on_3whs_complete(&mut self) {
        if !self.ssn.flags.contains(SessionFlags::Established) {
            log::debug!("three-way handshake complete");
            self.ssn.flags |= SessionFlags::Established;
            self.update_perf_base_state(ConnectionState::Established);
        }
    }

    /// Requests teardown once the current packet is processed.
    pub(crate) fn request_teardown(&mut self) {
        self.ssn.teardown_requested = true;
    }

    /* --------------------------------------------------------------------------------- */

    /// Common handling of a RST received by the listener. Returns whether it was accepted.
    pub(crate) fn handle_rst_recv(&mut self, tsd: &SegmentDescriptor) -> bool {
        if tsd.has_data() {
            self.set_alert(TcpAlert::DataAfterRst);
            self.ssn.norm.trim_rst_payload(tsd, &mut self.ssn.disp);
        }
        if self.listener.update_on_rst(tsd) {
            self.update_session_on_rst(tsd);
            true
        } else {
            self.reject(TcpAlert::BadRst);
            false
        }
    }

    /// Closes both trackers after a valid RST. Queued data is flushed first.
    pub(crate) fn update_session_on_rst(&mut self, tsd: &SegmentDescriptor) {
        log::debug!("session reset by {:?} at seq {}", tsd.dir(), tsd.seq());
        self.flush_both_and_discard();
        self.talker.set_state(ConnectionState::Closed);
        self.listener.set_state(ConnectionState::Closed);
        self.ssn.flags |= SessionFlags::Reset;
        self.set_pkt_action_flag(PacketAction::Reset);
        self.update_perf_base_state(ConnectionState::Closing);
        SESSIONS_RESET.inc();
    }

    fn flush_both_and_discard(&mut self) {
        let talker_data = self.talker.flush(None, false);
        let listener_data = self.listener.flush(None, false);
        self.ssn.outbox.extend(talker_data);
        self.ssn.outbox.extend(listener_data);
        let discarded = self.talker.discard_queue() + self.listener.discard_queue();
        self.ssn.note_discarded(discarded);
    }

    /// The listener received a SYN. Data queued under a previous ISN is flushed as far as it is
    /// contiguous and the rest dropped.
    pub(crate) fn init_listener_on_syn(&mut self, tsd: &SegmentDescriptor) {
        if self.listener.reassembler.frontier().is_some() && tsd.seq() != self.listener.irs {
            let stale = self.listener.flush(None, false);
            self.ssn.outbox.extend(stale);
            log::debug!(
                "{:?} ISN changed: {} -> {}",
                tsd.dir(),
                self.listener.irs,
                tsd.seq()
            );
        }
        let discarded = self.listener.init_on_syn_recv(tsd);
        self.ssn.note_discarded(discarded);
    }

    /// A SYN sent on a reset or closed connection starts a new incarnation of it. Returns `false`
    /// if a restart was requested.
    pub(crate) fn handle_syn_on_reset_session(&mut self, tsd: &SegmentDescriptor) -> bool {
        let closed = self.talker.state() == ConnectionState::Closed
            && self.listener.state() == ConnectionState::Closed;
        if tsd.is_syn_only() && (self.is_reset() || closed) {
            log::debug!("SYN on closed session, restarting");
            self.ssn.restart_requested = true;
            return false;
        }
        true
    }

    /// Payload on a SYN is only delivered by some stacks.
    pub(crate) fn handle_data_on_syn(&mut self, tsd: &SegmentDescriptor) {
        if self.ssn.norm.policy().accepts_data_on_syn() {
            self.handle_data_segment(tsd);
        } else {
            self.set_alert(TcpAlert::DataOnSyn);
            self.ssn.norm.trim_syn_payload(tsd, &mut self.ssn.disp);
            self.mark_packet_for_drop();
        }
    }

    /// Handles a SYN sent on a synchronized connection. Returns `false` if the SYN was rejected.
    pub(crate) fn check_for_repeated_syn(&mut self, tsd: &SegmentDescriptor) -> bool {
        if tsd.seq() == self.talker.iss {
            // retransmitted original SYN
            return true;
        }
        self.set_alert(TcpAlert::RepeatedSyn);
        let rcv_nxt = self.listener.rcv_nxt();
        let right_edge = rcv_nxt.wrapping_add(self.listener.rcv_wnd().max(1));
        if self.ssn.norm.policy().resets_on_repeated_syn()
            && seq_in_range(tsd.seq(), rcv_nxt, right_edge)
        {
            self.update_session_on_rst(tsd);
        } else {
            self.set_pkt_action_flag(PacketAction::BadPkt);
            self.mark_packet_for_drop();
        }
        false
    }

    /// Compares the link addresses of `tsd` with the ones first seen for each endpoint. Returns
    /// `false` if either changed.
    pub(crate) fn check_for_session_hijack(&mut self, tsd: &SegmentDescriptor) -> bool {
        let link = match tsd.link_addrs() {
            Some(link) => link,
            None => return true,
        };
        let talker_ok = *self.talker.mac.get_or_insert(link.src) == link.src;
        let listener_ok = *self.listener.mac.get_or_insert(link.dst) == link.dst;
        if talker_ok && listener_ok {
            return true;
        }
        let (client_ok, server_ok) = if self.talker_is_client() {
            (talker_ok, listener_ok)
        } else {
            (listener_ok, talker_ok)
        };
        if !client_ok {
            self.set_alert(TcpAlert::SessionHijackClient);
        }
        if !server_ok {
            self.set_alert(TcpAlert::SessionHijackServer);
        }
        log::warn!("link address changed on {:?} segment", tsd.dir());
        self.set_pkt_action_flag(PacketAction::BadPkt);
        self.mark_packet_for_drop();
        false
    }

    /// Records the timestamp of an accepted segment.
    pub(crate) fn update_paws_timestamps(&mut self, tsd: &SegmentDescriptor) {
        if !self.ssn.disp.is_bad() && !tsd.is_rst() {
            self.talker.update_ts_last(tsd);
        }
    }

    /// Window checks on the talker. Returns `false` if the packet was rejected.
    pub(crate) fn check_for_window_slam(&mut self, tsd: &SegmentDescriptor) -> bool {
        let from_client = self.talker_is_client();
        let midstream = self.is_midstream();
        match self.talker.check_window_slam(tsd, from_client, midstream) {
            Some(alert) => {
                self.reject(alert);
                false
            }
            None => true,
        }
    }

    /// Pre-dispatch checks for synchronized connections. Returns `false` if the packet was
    /// rejected.
    pub(crate) fn validate_packet_established_session(&mut self, tsd: &SegmentDescriptor) -> bool {
        if !self.talker.validate_timestamp(tsd) {
            PAWS_REJECTS.inc();
            self.reject(TcpAlert::BadTimestamp);
            return false;
        }
        if self.talker.tstamp_ok && tsd.timestamp().is_none() && !tsd.is_rst() {
            self.set_alert(TcpAlert::NoTimestamp);
        }
        true
    }

    /// Small segment detection. Returns `true` if the threshold was reached.
    pub(crate) fn flow_exceeds_config_thresholds(&mut self, tsd: &SegmentDescriptor) -> bool {
        if self.listener.count_small_segment(tsd) {
            self.set_alert(TcpAlert::SmallSegments);
            return true;
        }
        false
    }

    /// Rejects payload sent beyond the talker's own FIN. Returns `false` if rejected.
    pub(crate) fn check_data_after_fin(&mut self, tsd: &SegmentDescriptor) -> bool {
        if let Some(fin) = self.talker.fin_seq_sent {
            if tsd.has_data() && seq_gt(tsd.data_end_seq(), fin) {
                self.reject(TcpAlert::DataAfterFin);
                return false;
            }
        }
        true
    }

    /// Queues the payload of a segment received by the listener.
    pub(crate) fn handle_data_segment(&mut self, tsd: &SegmentDescriptor) {
        if self.listener.ignore_data || !tsd.has_data() {
            return;
        }
        if !tsd.is_ack() && !tsd.is_syn() {
            self.set_alert(TcpAlert::DataWithoutFlags);
        }
        self.flow_exceeds_config_thresholds(tsd);

        let data_seq = tsd.data_seq();
        if let Some(room) = self.listener.window_room(data_seq) {
            self.ssn.norm.trim_win_payload(tsd, room, &mut self.ssn.disp);
        }
        let mss = self.listener.mss;
        self.ssn.norm.trim_mss_payload(tsd, mss, &mut self.ssn.disp);

        let mut keep = self.ssn.disp.visible_len(tsd.len());
        // nothing past the FIN the listener already received is delivered
        if let Some(fin) = self.listener.fin_final_seq() {
            if seq_geq(data_seq, fin) {
                keep = 0;
            } else if seq_gt(tsd.data_end_seq(), fin) {
                keep = keep.min(seq_distance(data_seq, fin) as usize);
            }
        }
        if keep == 0 {
            return;
        }

        match self.listener.accept_segment(tsd, keep) {
            Ok(outcome) => self.apply_segment_outcome(outcome),
            Err(err) => {
                QUEUE_LIMIT_HITS.inc();
                log::warn!("{:?} reassembly queue: {}", self.listener.tx_dir(), err);
                self.set_alert(TcpAlert::ReassemblyLimit);
                match self.ssn.config.queue_limit_action {
                    QueueLimitAction::Evict => {
                        let evicted = self.listener.flush(None, true);
                        self.ssn.outbox.extend(evicted);
                        match self.listener.accept_segment(tsd, keep) {
                            Ok(outcome) => self.apply_segment_outcome(outcome),
                            Err(_) => {
                                self.ssn.note_discarded(keep);
                                self.set_pkt_action_flag(PacketAction::BadPkt);
                            }
                        }
                    }
                    QueueLimitAction::Terminate => {
                        let flushed = self.listener.flush(None, false);
                        self.ssn.outbox.extend(flushed);
                        let discarded = self.listener.discard_queue() + keep;
                        self.ssn.note_discarded(discarded);
                        self.listener.ignore_data = true;
                        self.listener.queue_terminated = true;
                        self.set_pkt_action_flag(PacketAction::BadPkt);
                        self.mark_packet_for_drop();
                    }
                }
            }
        }
    }

    fn apply_segment_outcome(&mut self, outcome: SegmentOutcome) {
        match outcome {
            SegmentOutcome::Accepted | SegmentOutcome::Duplicate => (),
            SegmentOutcome::Gap => {
                log::debug!(
                    "hole before {:?}, rcv_nxt {}",
                    self.listener.reassembler.first_seq(),
                    self.listener.rcv_nxt()
                );
            }
            SegmentOutcome::Overlapped(report) => {
                if report.inconsistent {
                    self.set_alert(TcpAlert::InconsistentOverlap);
                }
                let limit = self.ssn.config.overlap_limit;
                if limit > 0 && self.listener.overlap_count > limit {
                    self.set_alert(TcpAlert::ExcessiveOverlaps);
                }
            }
            SegmentOutcome::OutOfWindow => {
                self.reject(TcpAlert::BadSegment);
            }
        }
    }
}
