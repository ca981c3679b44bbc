#![allow(clippy::needless_doctest_main)]
// #![warn(missing_docs)]

//! TCP stream tracking and reassembly for network intrusion detection and prevention.
//!
//! The crate reconstructs the byte stream of each TCP connection from segments that may arrive
//! out of order, overlapping, retransmitted or deliberately crafted to evade inspection. It
//! models both endpoints of every connection, emulates the reassembly behavior of the protected
//! host's operating system so inspection sees the bytes the host will process, and reports
//! anomalies as named alerts together with per-packet drop and normalization requests.
//!
//! Packet decoding, the flow table, and content inspection are left to the caller. A flow table
//! creates one [StreamSession] per flow and feeds it decoded [SegmentDescriptor]s:
//!
//! ```rust
//! use std::sync::Arc;
//! use streamtrack_core::config::default_config;
//! use streamtrack_core::tcp::segment::{ACK, SYN};
//! use streamtrack_core::{Direction, FlushedData, Normalizer, SegmentDescriptor, StreamSession};
//!
//! let config = Arc::new(default_config());
//! let norm = Arc::new(Normalizer::new(&config));
//! let mut session = StreamSession::new(config, norm);
//!
//! let mut stream: Vec<FlushedData> = vec![];
//! let syn = SegmentDescriptor::new(Direction::FromClient, 7, 0, SYN, 65535, &[]);
//! let outcome = session.process(&syn, &mut stream);
//! assert!(outcome.alerts.is_empty());
//! ```
//!
//! Behavior is configured through [config::StreamConfig], usually loaded from a TOML file with
//! [config::load_config].

pub mod config;
pub mod stats;
pub mod tcp;

pub use self::tcp::event::TcpAlert;
pub use self::tcp::normalizer::{Normalizer, ReassemblyPolicy};
pub use self::tcp::segment::{Direction, SegmentDescriptor};
pub use self::tcp::session::{FlushedData, Inspector, ProcessOutcome, StreamSession};
pub use self::tcp::state::ConnectionState;
