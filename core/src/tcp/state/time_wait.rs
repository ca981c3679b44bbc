//! Both FINs exchanged. The session is torn down once both sides get here.

use super::{ConnectionState, StateHandler};
use crate::tcp::actions::PacketAction;
use crate::tcp::event::TcpAlert;
use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::seq::*;
use crate::tcp::session::context::TrackerCtx;

pub(crate) struct StateTimeWait;

impl StateHandler for StateTimeWait {
    fn state(&self) -> ConnectionState {
        ConnectionState::TimeWait
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

    fn data_seg_sent(&self, _tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.set_alert(TcpAlert::DataOnClosed);
        cx.mark_packet_for_drop();
        true
    }

    fn fin_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.update_ack_recv(tsd);
        let beyond_final = cx
            .listener
            .fin_final_seq()
            .map_or(false, |final_seq| seq_gt(tsd.fin_seq(), final_seq));
        if beyond_final {
            cx.set_alert(TcpAlert::BadFin);
            cx.mark_packet_for_drop();
            cx.set_pkt_action_flag(PacketAction::BadPkt);
        } else if tsd.has_data() {
            cx.handle_data_segment(tsd);
        }
        true
    }

    fn rst_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.handle_rst_recv(tsd)
    }

    fn do_post_sm_packet_actions(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) {
        cx.update_paws_timestamps(tsd);
        cx.check_for_window_slam(tsd);

        let talker_done = matches!(
            cx.talker.state(),
            ConnectionState::TimeWait | ConnectionState::Closed
        );
        if talker_done && !cx.ssn.disp.is_bad() {
            cx.request_teardown();
        }
    }
}
