//! Connection reset or fully closed on this side.

use super::{ConnectionState, StateHandler};
use crate::tcp::event::TcpAlert;
use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::session::context::TrackerCtx;

pub(crate) struct StateClosed;

impl StateHandler for StateClosed {
    fn state(&self) -> ConnectionState {
        ConnectionState::Closed
    }

    fn syn_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        cx.handle_syn_on_reset_session(tsd)
    }

    fn data_seg_sent(&self, _tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        if cx.is_reset() {
            cx.set_alert(TcpAlert::DataAfterReset);
        } else {
            cx.set_alert(TcpAlert::DataOnClosed);
        }
        cx.mark_packet_for_drop();
        true
    }

    fn do_post_sm_packet_actions(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) {
        cx.update_paws_timestamps(tsd);
        cx.check_for_window_slam(tsd);

        if cx.talker.state() == ConnectionState::Closed
            && cx.listener.state() == ConnectionState::Closed
            && !cx.ssn.restart_requested
        {
            cx.request_teardown();
        }
    }
}
