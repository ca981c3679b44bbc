//! Handshake in progress on this side: a SYN was received, or a SYN/ACK was sent.

use super::{ConnectionState, StateHandler};
use crate::tcp::event::TcpAlert;
use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::seq::*;
use crate::tcp::session::context::TrackerCtx;

pub(crate) struct StateSynRecv;

impl StateSynRecv {
    /// The segment acknowledges the SYN this endpoint sent. Completes the handshake.
    fn acks_our_syn(tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        if !tsd.is_ack() {
            return false;
        }
        let iss = cx.listener.iss;
        let ack = tsd.ack();
        if seq_gt(ack, iss) && seq_leq(ack, cx.listener.snd_nxt.wrapping_add(1)) {
            cx.listener.set_state(ConnectionState::Established);
            cx.update_on_3whs_complete();
            return true;
        }
        false
    }
}

impl StateHandler for StateSynRecv {
    fn state(&self) -> ConnectionState {
        ConnectionState::SynRecv
    }

    fn syn_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        // simultaneous open, the peer's SYN was seen first
        cx.talker.record_syn_sent(tsd);
        true
    }

    fn syn_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        if tsd.seq() != cx.listener.irs {
            cx.init_listener_on_syn(tsd);
        }
        if tsd.has_data() {
            cx.handle_data_on_syn(tsd);
        }
        true
    }

    fn syn_ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.talker.init_on_synack_sent(tsd);
        true
    }

    fn syn_ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        // simultaneous open
        let ack = tsd.ack();
        if seq_gt(ack, cx.listener.iss) && seq_leq(ack, cx.listener.snd_nxt) {
            cx.listener.init_on_synack_recv(tsd);
            cx.negotiate_options(tsd);
            cx.update_on_3whs_complete();
            true
        } else {
            cx.reject(TcpAlert::InvalidAck);
            false
        }
    }

    fn ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        true
    }

    fn ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        Self::acks_our_syn(tsd, cx);
        true
    }

    fn data_seg_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        true
    }

    fn data_seg_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        Self::acks_our_syn(tsd, cx);
        cx.handle_data_segment(tsd);
        true
    }

    fn fin_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        cx.talker.update_on_fin_sent(tsd);
        cx.talker.set_state(ConnectionState::FinWait1);
        true
    }

    fn fin_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        Self::acks_our_syn(tsd, cx);
        cx.handle_data_segment(tsd);
        if cx.listener.update_on_fin_recv(tsd) {
            cx.listener.set_state(ConnectionState::CloseWait);
        }
        true
    }

    fn rst_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.handle_rst_recv(tsd)
    }
}
