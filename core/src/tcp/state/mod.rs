//! Connection state machine.
//!
//! Each [ConnectionState] has a zero-sized handler implementing [StateHandler]. A packet is
//! dispatched twice: once to the handler of the talker's state with the talker's `*Sent` event,
//! then to the handler of the listener's state with the listener's `*Recv` event. Handlers return
//! whether processing continues.

mod close_wait;
mod closed;
mod closing;
mod established;
mod fin_wait1;
mod fin_wait2;
mod last_ack;
mod listen;
mod syn_recv;
mod syn_sent;
mod time_wait;

use self::close_wait::StateCloseWait;
use self::closed::StateClosed;
use self::closing::StateClosing;
use self::established::StateEstablished;
use self::fin_wait1::StateFinWait1;
use self::fin_wait2::StateFinWait2;
use self::last_ack::StateLastAck;
use self::listen::StateListen;
use self::syn_recv::StateSynRecv;
use self::syn_sent::StateSynSent;
use self::time_wait::StateTimeWait;

use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::session::context::{SessionCore, TrackerCtx};
use crate::tcp::tracker::StreamTracker;

use serde::Serialize;
use strum_macros::{Display, IntoStaticStr};

/// TCP connection state of one endpoint (RFC 793).
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Listen,
    SynSent,
    SynRecv,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
    Closed,
}

impl ConnectionState {
    /// Returns `true` once the endpoint sent or received a FIN, or the connection was reset.
    pub fn is_closing(self) -> bool {
        !matches!(
            self,
            ConnectionState::Listen
                | ConnectionState::SynSent
                | ConnectionState::SynRecv
                | ConnectionState::Established
        )
    }
}

/// Per-tracker classification of a segment.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum TcpEvent {
    SynSent,
    SynRecv,
    SynAckSent,
    SynAckRecv,
    AckSent,
    AckRecv,
    DataSegSent,
    DataSegRecv,
    FinSent,
    FinRecv,
    RstSent,
    RstRecv,
}

/// Behavior of one connection state.
///
/// `*_sent` methods run for the talker's state and act on `cx.talker`, `*_recv` methods run for
/// the listener's state and act on `cx.listener`. The defaults accept the segment without any
/// bookkeeping.
pub(crate) trait StateHandler: Sync {
    fn state(&self) -> ConnectionState;

    fn syn_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn syn_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn syn_ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn syn_ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn ack_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn ack_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn data_seg_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn data_seg_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn fin_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn fin_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn rst_sent(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    fn rst_recv(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        default_state_action(tsd, cx)
    }

    /// Runs for the talker's state before any event method. Returning `false` rejects the packet.
    fn do_pre_sm_packet_actions(&self, _tsd: &SegmentDescriptor, _cx: &mut TrackerCtx<'_>) -> bool {
        true
    }

    /// Runs for the listener's state (as it was before dispatch) after both event methods.
    fn do_post_sm_packet_actions(&self, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) {
        cx.update_paws_timestamps(tsd);
        cx.check_for_window_slam(tsd);
    }

    fn eval(&self, event: TcpEvent, tsd: &SegmentDescriptor, cx: &mut TrackerCtx<'_>) -> bool {
        match event {
            TcpEvent::SynSent => self.syn_sent(tsd, cx),
            TcpEvent::SynRecv => self.syn_recv(tsd, cx),
            TcpEvent::SynAckSent => self.syn_ack_sent(tsd, cx),
            TcpEvent::SynAckRecv => self.syn_ack_recv(tsd, cx),
            TcpEvent::AckSent => self.ack_sent(tsd, cx),
            TcpEvent::AckRecv => self.ack_recv(tsd, cx),
            TcpEvent::DataSegSent => self.data_seg_sent(tsd, cx),
            TcpEvent::DataSegRecv => self.data_seg_recv(tsd, cx),
            TcpEvent::FinSent => self.fin_sent(tsd, cx),
            TcpEvent::FinRecv => self.fin_recv(tsd, cx),
            TcpEvent::RstSent => self.rst_sent(tsd, cx),
            TcpEvent::RstRecv => self.rst_recv(tsd, cx),
        }
    }
}

#[inline]
pub(crate) fn default_state_action(_tsd: &SegmentDescriptor, _cx: &mut TrackerCtx<'_>) -> bool {
    true
}

/* --------------------------------------------------------------------------------- */

/// Dispatches segments to state handlers.
#[derive(Debug, Default)]
pub struct StateMachine {
    event: Option<TcpEvent>,
}

impl StateMachine {
    pub fn new() -> Self {
        StateMachine { event: None }
    }

    /// Event currently being dispatched.
    #[inline]
    pub fn current_event(&self) -> Option<TcpEvent> {
        self.event
    }

    pub(crate) fn handler(state: ConnectionState) -> &'static dyn StateHandler {
        match state {
            ConnectionState::Listen => &StateListen,
            ConnectionState::SynSent => &StateSynSent,
            ConnectionState::SynRecv => &StateSynRecv,
            ConnectionState::Established => &StateEstablished,
            ConnectionState::FinWait1 => &StateFinWait1,
            ConnectionState::FinWait2 => &StateFinWait2,
            ConnectionState::CloseWait => &StateCloseWait,
            ConnectionState::Closing => &StateClosing,
            ConnectionState::LastAck => &StateLastAck,
            ConnectionState::TimeWait => &StateTimeWait,
            ConnectionState::Closed => &StateClosed,
        }
    }

    /// Runs `tsd` through the talker's and the listener's state handlers. Returns `false` if
    /// processing stopped before the listener's handler ran.
    pub(crate) fn eval(
        &mut self,
        tsd: &SegmentDescriptor,
        talker: &mut StreamTracker,
        listener: &mut StreamTracker,
        ssn: &mut SessionCore,
    ) -> bool {
        talker.set_tcp_event(tsd, true);
        let talker_event = talker.event();
        let talker_handler = Self::handler(talker.state());

        let mut cx = TrackerCtx {
            talker,
            listener,
            ssn,
        };
        self.event = Some(talker_event);
        let proceed = talker_handler.do_pre_sm_packet_actions(tsd, &mut cx)
            && talker_handler.eval(talker_event, tsd, &mut cx);
        if !proceed {
            self.event = None;
            return false;
        }

        let listener_handler = Self::handler(cx.listener.state());
        cx.listener.set_tcp_event(tsd, false);
        let listener_event = cx.listener.event();
        self.event = Some(listener_event);
        if listener_handler.eval(listener_event, tsd, &mut cx) {
            listener_handler.do_post_sm_packet_actions(tsd, &mut cx);
        }
        self.event = None;
        true
    }
}
