//! No packet seen yet on this side. Handlers here pick the connection up, either from the
//! handshake or midstream.

use super::{ConnectionState, StateHandler};
use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::session::context::TrackerCtx;

pub(crate) struct StateListen;

impl StateHandler for StateListen {
    fn state(&self) -> ConnectionState {
        ConnectionState::Listen
    }

    fn syn_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.talker.init_on_syn_sent(tsd);
        cx.update_perf_base_state(ConnectionState::SynSent);
        true
    }

    fn syn_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.init_listener_on_syn(tsd);
        if tsd.has_data() {
            cx.handle_data_on_syn(tsd);
        }
        true
    }

    fn syn_ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.talker.init_on_synack_sent(tsd);
        cx.update_perf_base_state(ConnectionState::SynRecv);
        true
    }

    fn syn_ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.listener.init_on_synack_recv(tsd);
        cx.negotiate_options(tsd);
        true
    }

    fn ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.talker.init_on_3whs_ack_sent(tsd);
        cx.update_perf_base_state(ConnectionState::Established);
        true
    }

    fn ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.listener.init_on_3whs_ack_recv(tsd);
        true
    }

    fn data_seg_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.talker.init_on_data_seg_sent(tsd);
        cx.update_perf_base_state(ConnectionState::Established);
        true
    }

    fn data_seg_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.listener.init_on_data_seg_recv(tsd);
        cx.handle_data_segment(tsd);
        true
    }

    fn fin_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.talker.init_on_data_seg_sent(tsd);
        cx.talker.update_on_fin_sent(tsd);
        cx.talker.set_state(ConnectionState::FinWait1);
        cx.update_perf_base_state(ConnectionState::Closing);
        true
    }

    fn fin_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.listener.init_on_data_seg_recv(tsd);
        cx.handle_data_segment(tsd);
        if cx.listener.update_on_fin_recv(tsd) {
            cx.listener.set_state(ConnectionState::CloseWait);
        }
        true
    }

    fn rst_sent(&self, _tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.talker.set_state(ConnectionState::Closed);
        true
    }

    fn rst_recv(&self, _tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.listener.set_state(ConnectionState::Closed);
        true
    }
}
