//! Both sides sent a FIN, ours not yet acknowledged.

use super::{ConnectionState, StateHandler};
use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::session::context::TrackerCtx;

pub(crate) struct StateClosing;

impl StateClosing {
    fn recv_bookkeeping(tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        if cx.listener.fin_acked() {
            cx.listener.set_state(ConnectionState::TimeWait);
        }
        true
    }
}

impl StateHandler for StateClosing {
    fn state(&self) -> ConnectionState {
        ConnectionState::Closing
    }

    fn do_pre_sm_packet_actions(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.validate_packet_established_session(tsd)
    }

    fn syn_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.check_for_repeated_syn(tsd)
    }

    fn ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        true
    }

    fn ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        Self::recv_bookkeeping(tsd, cx)
    }

    fn data_seg_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        if !cx.check_data_after_fin(tsd) {
            return false;
        }
        cx.update_ack_sent(tsd);
        true
    }

    fn data_seg_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        Self::recv_bookkeeping(tsd, cx)
    }

    fn fin_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        true
    }

    fn fin_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        Self::recv_bookkeeping(tsd, cx)
    }

    fn rst_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.handle_rst_recv(tsd)
    }
}
