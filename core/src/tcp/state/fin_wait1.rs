//! FIN sent, not yet acknowledged.

use super::{ConnectionState, StateHandler};
use crate::tcp::event::TcpAlert;
use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::session::context::TrackerCtx;

pub(crate) struct StateFinWait1;

impl StateFinWait1 {
    fn check_for_fin_ack(cx: &mut TrackerCtx<'_>) {
        if cx.listener.fin_acked() {
            cx.listener.set_state(ConnectionState::FinWait2);
        }
    }
}

impl StateHandler for StateFinWait1 {
    fn state(&self) -> ConnectionState {
        ConnectionState::FinWait1
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

    fn ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_sent(tsd);
        true
    }

    fn ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        Self::check_for_fin_ack(cx);
        true
    }

    fn data_seg_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        if !cx.check_data_after_fin(tsd) {
            return false;
        }
        cx.update_ack_sent(tsd);
        true
    }

    fn data_seg_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        Self::check_for_fin_ack(cx);
        cx.handle_data_segment(tsd);
        true
    }

    fn fin_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        if !cx.check_data_after_fin(tsd) {
            return false;
        }
        cx.update_ack_sent(tsd);
        true
    }

    fn fin_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        cx.handle_data_segment(tsd);
        if !cx.listener.update_on_fin_recv(tsd) {
            cx.reject(TcpAlert::BadFin);
            return false;
        }
        if cx.listener.fin_acked() {
            cx.listener.set_state(ConnectionState::TimeWait);
        } else {
            cx.listener.set_state(ConnectionState::Closing);
        }
        true
    }

    fn rst_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.handle_rst_recv(tsd)
    }
}
