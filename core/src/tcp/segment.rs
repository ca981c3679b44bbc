//! Segment descriptors.
//!
//! A [SegmentDescriptor] is the already-decoded view of one TCP packet handed to the tracking core
//! by the packet decoder. It borrows the payload for the duration of a single processing call;
//! accepted bytes are copied into the reassembly queue.

use std::time::Duration;

use serde::Serialize;

// TCP flags.
pub const CWR: u8 = 0b1000_0000;
pub const ECE: u8 = 0b0100_0000;
pub const URG: u8 = 0b0010_0000;
pub const ACK: u8 = 0b0001_0000;
pub const PSH: u8 = 0b0000_1000;
pub const RST: u8 = 0b0000_0100;
pub const SYN: u8 = 0b0000_0010;
pub const FIN: u8 = 0b0000_0001;

/// Direction of a segment relative to the flow that owns the session.
///
/// `FromClient` is whichever endpoint the external flow table recorded as the initiator. The
/// session separately remembers which direction the TCP client actually sends in, so a flow first
/// observed through a SYN/ACK still maps onto the right trackers.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize)]
pub enum Direction {
    FromClient,
    FromServer,
}

impl Direction {
    /// Returns the opposite direction.
    #[inline]
    pub fn reverse(self) -> Direction {
        match self {
            Direction::FromClient => Direction::FromServer,
            Direction::FromServer => Direction::FromClient,
        }
    }
}

/// TCP timestamp option (RFC 7323).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct TcpTimestamp {
    pub tsval: u32,
    pub tsecr: u32,
}

/// Link-layer source and destination addresses, used for session hijack checks.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct LinkAddrs {
    pub src: [u8; 6],
    pub dst: [u8; 6],
}

/// Decoded transport-layer view of one TCP packet.
#[derive(Debug, Clone)]
pub struct SegmentDescriptor<'a> {
    dir: Direction,
    seq: u32,
    ack: u32,
    window: u16,
    flags: u8,
    urgent_ptr: u16,
    timestamp: Option<TcpTimestamp>,
    mss: Option<u16>,
    wscale: Option<u8>,
    bad_options: bool,
    link: Option<LinkAddrs>,
    pkt_time: Duration,
    payload: &'a [u8],
}

impl<'a> SegmentDescriptor<'a> {
    pub fn new(
        dir: Direction,
        seq: u32,
        ack: u32,
        flags: u8,
        window: u16,
        payload: &'a [u8],
    ) -> Self {
        SegmentDescriptor {
            dir,
            seq,
            ack,
            window,
            flags,
            urgent_ptr: 0,
            timestamp: None,
            mss: None,
            wscale: None,
            bad_options: false,
            link: None,
            pkt_time: Duration::ZERO,
            payload,
        }
    }

    pub fn with_timestamp(mut self, tsval: u32, tsecr: u32) -> Self {
        self.timestamp = Some(TcpTimestamp { tsval, tsecr });
        self
    }

    pub fn with_mss(mut self, mss: u16) -> Self {
        self.mss = Some(mss);
        self
    }

    pub fn with_wscale(mut self, shift: u8) -> Self {
        self.wscale = Some(shift);
        self
    }

    pub fn with_urgent_ptr(mut self, urgent_ptr: u16) -> Self {
        self.urgent_ptr = urgent_ptr;
        self
    }

    /// Marks the option block as an invalid combination, as reported by the decoder.
    pub fn with_bad_options(mut self) -> Self {
        self.bad_options = true;
        self
    }

    pub fn with_link_addrs(mut self, src: [u8; 6], dst: [u8; 6]) -> Self {
        self.link = Some(LinkAddrs { src, dst });
        self
    }

    /// Capture time of the packet, relative to an arbitrary epoch shared by the flow.
    pub fn with_time(mut self, pkt_time: Duration) -> Self {
        self.pkt_time = pkt_time;
        self
    }

    // ------------------------------------------------

    #[inline]
    pub fn dir(&self) -> Direction {
        self.dir
    }

    #[inline]
    pub fn seq(&self) -> u32 {
        self.seq
    }

    #[inline]
    pub fn ack(&self) -> u32 {
        self.ack
    }

    /// Returns the raw (unscaled) advertised window.
    #[inline]
    pub fn window(&self) -> u16 {
        self.window
    }

    #[inline]
    pub fn flags(&self) -> u8 {
        self.flags
    }

    #[inline]
    pub fn urgent_ptr(&self) -> u16 {
        self.urgent_ptr
    }

    #[inline]
    pub fn timestamp(&self) -> Option<TcpTimestamp> {
        self.timestamp
    }

    #[inline]
    pub fn mss(&self) -> Option<u16> {
        self.mss
    }

    #[inline]
    pub fn wscale(&self) -> Option<u8> {
        self.wscale
    }

    #[inline]
    pub fn has_bad_options(&self) -> bool {
        self.bad_options
    }

    #[inline]
    pub fn link_addrs(&self) -> Option<LinkAddrs> {
        self.link
    }

    #[inline]
    pub fn pkt_time(&self) -> Duration {
        self.pkt_time
    }

    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Length of the payload in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    // ------------------------------------------------

    #[inline]
    pub fn is_syn(&self) -> bool {
        self.flags & SYN != 0
    }

    /// Returns `true` for a SYN without ACK or RST.
    #[inline]
    pub fn is_syn_only(&self) -> bool {
        self.flags & (SYN | ACK | RST) == SYN
    }

    #[inline]
    pub fn is_syn_ack(&self) -> bool {
        self.flags & (SYN | ACK) == (SYN | ACK) && self.flags & RST == 0
    }

    #[inline]
    pub fn is_ack(&self) -> bool {
        self.flags & ACK != 0
    }

    #[inline]
    pub fn is_rst(&self) -> bool {
        self.flags & RST != 0
    }

    #[inline]
    pub fn is_fin(&self) -> bool {
        self.flags & FIN != 0
    }

    #[inline]
    pub fn is_psh(&self) -> bool {
        self.flags & PSH != 0
    }

    #[inline]
    pub fn is_urg(&self) -> bool {
        self.flags & URG != 0
    }

    /// Returns `true` if ECE or CWR is set.
    #[inline]
    pub fn has_ecn_flags(&self) -> bool {
        self.flags & (ECE | CWR) != 0
    }

    #[inline]
    pub fn has_data(&self) -> bool {
        !self.payload.is_empty()
    }

    /// Sequence number of the first payload byte. Data carried on a SYN starts after the SYN.
    #[inline]
    pub fn data_seq(&self) -> u32 {
        if self.is_syn() {
            self.seq.wrapping_add(1)
        } else {
            self.seq
        }
    }

    /// Sequence number following the last payload byte.
    #[inline]
    pub fn data_end_seq(&self) -> u32 {
        self.data_seq().wrapping_add(self.payload.len() as u32)
    }

    /// Sequence number following everything this segment occupies, SYN and FIN included.
    #[inline]
    pub fn end_seq(&self) -> u32 {
        let fin = self.is_fin() as u32;
        self.data_end_seq().wrapping_add(fin)
    }

    /// Sequence number occupied by the FIN flag.
    #[inline]
    pub fn fin_seq(&self) -> u32 {
        self.data_end_seq()
    }
}
