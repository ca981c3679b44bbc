//! TCP stream tracking.
//!
//! Segments enter through [session::StreamSession::process]. The session resolves which of its
//! two [tracker::StreamTracker]s sent the segment (the talker) and which receives it (the
//! listener), runs the normalization pre-checks, and dispatches the segment through the
//! [state::StateMachine]. Accepted payload is queued in the listener's
//! [reassembly::ReassemblyQueue] and flushed to an [session::Inspector] in sequence order.

pub mod actions;
pub mod event;
pub mod normalizer;
pub mod reassembly;
pub mod segment;
pub mod seq;
pub mod session;
pub mod state;
pub mod tracker;
