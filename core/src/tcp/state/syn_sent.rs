//! Active opener waiting for the SYN/ACK.

use super::{ConnectionState, StateHandler};
use crate::tcp::event::TcpAlert;
use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::seq::*;
use crate::tcp::session::context::TrackerCtx;

pub(crate) struct StateSynSent;

impl StateHandler for StateSynSent {
    fn state(&self) -> ConnectionState {
        ConnectionState::SynSent
    }

    fn syn_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        if tsd.seq() != cx.talker.iss {
            // new ISS, the previous attempt was abandoned
            cx.talker.init_on_syn_sent(tsd);
        }
        true
    }

    fn syn_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        // simultaneous open
        cx.init_listener_on_syn(tsd);
        true
    }

    fn syn_ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.talker.init_on_synack_sent(tsd);
        true
    }

    fn syn_ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        let first = cx.listener.iss.wrapping_add(1);
        let ack = tsd.ack();
        if seq_geq(ack, first) && seq_leq(ack, cx.listener.snd_nxt) {
            cx.listener.init_on_synack_recv(tsd);
            cx.negotiate_options(tsd);
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

    fn data_seg_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        true
    }

    fn fin_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.talker.update_on_fin_sent(tsd);
        cx.talker.set_state(ConnectionState::FinWait1);
        true
    }

    fn rst_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.handle_rst_recv(tsd)
    }
}
