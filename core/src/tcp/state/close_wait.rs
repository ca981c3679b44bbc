//! FIN received, this endpoint may still send.

use super::{ConnectionState, StateHandler};
use crate::tcp::event::TcpAlert;
use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::session::context::TrackerCtx;

pub(crate) struct StateCloseWait;

impl StateHandler for StateCloseWait {
    fn state(&self) -> ConnectionState {
        ConnectionState::CloseWait
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
        cx.talker.set_state(ConnectionState::LastAck);
        true
    }

    fn fin_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        if !cx.listener.update_on_fin_recv(tsd) {
            cx.reject(TcpAlert::BadFin);
            return false;
        }
        // retransmitted FIN, data up to it is still accepted
        cx.handle_data_segment(tsd);
        true
    }

    fn rst_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.handle_rst_recv(tsd)
    }
}
