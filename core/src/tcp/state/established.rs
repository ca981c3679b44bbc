//! Synchronized connection carrying data.

use super::{ConnectionState, StateHandler};
use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::session::context::TrackerCtx;

pub(crate) struct StateEstablished;

impl StateHandler for StateEstablished {
    fn state(&self) -> ConnectionState {
        ConnectionState::Established
    }

    fn do_pre_sm_packet_actions(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.validate_packet_established_session(tsd)
    }

    fn syn_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.check_for_repeated_syn(tsd)
    }

    fn syn_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        if tsd.has_data() {
            cx.handle_data_on_syn(tsd);
        }
        true
    }

    fn syn_ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        true
    }

    fn syn_ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        true
    }

    fn ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        true
    }

    fn ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        true
    }

    fn data_seg_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        true
    }

    fn data_seg_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        cx.handle_data_segment(tsd);
        true
    }

    fn fin_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        cx.talker.update_on_fin_sent(tsd);
        cx.talker.set_state(ConnectionState::FinWait1);
        cx.update_perf_base_state(ConnectionState::Closing);
        true
    }

    fn fin_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
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
