//! Target-based normalization policy.
//!
//! Endpoints disagree on how to treat overlapping data, RSTs, stale timestamps and data carried on
//! a SYN. The [ReassemblyPolicy] selects which endpoint behavior the sensor emulates so that
//! inspection sees the same bytes the protected host will. The [Normalizer] bundles the policy with
//! the normalization options and is shared read-only by all sessions.

use crate::config::{EcnMode, NormMode, NormalizerConfig, OptionsAction, StreamConfig, UrgentAction};
use crate::tcp::actions::{NormAction, PacketAction, PacketDisposition};
use crate::tcp::segment::SegmentDescriptor;
use crate::tcp::seq::*;

use serde::{Deserialize, Serialize};
use strum_macros::{EnumString, IntoStaticStr};

/// Endpoint behavior emulated by the tracker.
#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, Hash, PartialEq, Eq, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReassemblyPolicy {
    First,
    Last,
    Linux,
    OldLinux,
    Bsd,
    MacOs,
    Solaris,
    Irix,
    Hpux10,
    Hpux11,
    Windows,
    Win2003,
    Vista,
}

/// Which bytes survive when two segments cover the same sequence range.
#[derive(
    Deserialize, Serialize, Debug, Clone, Copy, Hash, PartialEq, Eq, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverlapRule {
    /// Queued data always wins.
    FavorOld,
    /// Incoming data always wins.
    FavorNew,
    /// Incoming data wins if it starts before the queued segment.
    FavorNewIfEarlier,
    /// Incoming data wins if it starts before the queued segment, or starts with it and ends
    /// after it.
    FavorNewIfEarlierOrLonger,
    /// Incoming data wins if it covers the queued segment and is longer.
    FavorNewIfLonger,
}

/// How a RST sequence number is validated against the receive window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RstRule {
    /// `rcv_nxt <= seq < rcv_nxt + rcv_wnd`.
    InWindow,
    /// `seq == rcv_nxt`.
    ExactNext,
    /// The end of the segment lands in `[rcv_nxt, rcv_nxt + rcv_wnd]`.
    EndInWindow,
}

impl ReassemblyPolicy {
    pub fn overlap_rule(self) -> OverlapRule {
        use ReassemblyPolicy::*;
        match self {
            First | MacOs | Windows | Win2003 | Vista | Hpux11 => OverlapRule::FavorOld,
            Last => OverlapRule::FavorNew,
            Bsd | OldLinux | Irix | Hpux10 => OverlapRule::FavorNewIfEarlier,
            Linux => OverlapRule::FavorNewIfEarlierOrLonger,
            Solaris => OverlapRule::FavorNewIfLonger,
        }
    }

    pub fn rst_rule(self) -> RstRule {
        match self {
            ReassemblyPolicy::Windows | ReassemblyPolicy::Win2003 | ReassemblyPolicy::Vista => {
                RstRule::ExactNext
            }
            ReassemblyPolicy::OldLinux => RstRule::EndInWindow,
            _ => RstRule::InWindow,
        }
    }

    /// Returns `true` for stacks that treat a zero tsval as "no timestamp".
    pub fn ignores_zero_tsval(self) -> bool {
        self.is_windows()
    }

    /// Returns `true` for stacks that deliver payload carried on a SYN.
    pub fn accepts_data_on_syn(self) -> bool {
        matches!(self, ReassemblyPolicy::MacOs)
    }

    /// Returns `true` for stacks that reset the connection on an in-window repeated SYN. Other
    /// stacks discard the SYN.
    pub fn resets_on_repeated_syn(self) -> bool {
        self.is_windows()
    }

    fn is_windows(self) -> bool {
        matches!(
            self,
            ReassemblyPolicy::Windows | ReassemblyPolicy::Win2003 | ReassemblyPolicy::Vista
        )
    }
}

/* --------------------------------------------------------------------------------- */

/// Half-open sequence range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    pub start: u32,
    pub end: u32,
}

impl SeqRange {
    pub fn new(start: u32, end: u32) -> Self {
        SeqRange { start, end }
    }

    pub fn with_len(start: u32, len: u32) -> Self {
        SeqRange {
            start,
            end: start.wrapping_add(len),
        }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        seq_distance(self.start, self.end)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Returns the common part of two ranges, if any.
    pub fn intersection(&self, other: &SeqRange) -> Option<SeqRange> {
        let start = seq_max(self.start, other.start);
        let end = seq_min(self.end, other.end);
        if seq_lt(start, end) {
            Some(SeqRange { start, end })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Existing,
    Incoming,
}

/// Outcome of resolving one incoming range against one queued range.
///
/// `head` and `tail` are the parts of the incoming range that fall before and after the queued
/// range. They do not conflict with it and are always kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRanges {
    pub head: Option<SeqRange>,
    pub overlap: SeqRange,
    pub winner: Winner,
    pub tail: Option<SeqRange>,
}

/// Decides which side owns the bytes shared by `existing` and `incoming`.
///
/// Returns `None` if the ranges do not overlap. The result depends only on the two ranges and the
/// rule, so the same traffic always reassembles to the same stream.
pub fn resolve_overlap(
    existing: SeqRange,
    incoming: SeqRange,
    rule: OverlapRule,
) -> Option<ResolvedRanges> {
    let overlap = existing.intersection(&incoming)?;

    let starts_earlier = seq_lt(incoming.start, existing.start);
    let ends_later = seq_gt(incoming.end, existing.end);
    let incoming_wins = match rule {
        OverlapRule::FavorOld => false,
        OverlapRule::FavorNew => true,
        OverlapRule::FavorNewIfEarlier => starts_earlier,
        OverlapRule::FavorNewIfEarlierOrLonger => {
            starts_earlier || (incoming.start == existing.start && ends_later)
        }
        OverlapRule::FavorNewIfLonger => {
            seq_leq(incoming.start, existing.start)
                && seq_geq(incoming.end, existing.end)
                && incoming.len() > existing.len()
        }
    };

    let head = if starts_earlier {
        Some(SeqRange::new(incoming.start, existing.start))
    } else {
        None
    };
    let tail = if ends_later {
        Some(SeqRange::new(existing.end, incoming.end))
    } else {
        None
    };
    Some(ResolvedRanges {
        head,
        overlap,
        winner: if incoming_wins {
            Winner::Incoming
        } else {
            Winner::Existing
        },
        tail,
    })
}

/* --------------------------------------------------------------------------------- */

/// Policy-driven normalization decisions.
///
/// Every check only records requests on the [PacketDisposition]; packets are never rewritten here.
#[derive(Debug, Clone)]
pub struct Normalizer {
    policy: ReassemblyPolicy,
    overlap_rule: OverlapRule,
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: &StreamConfig) -> Self {
        Normalizer {
            policy: config.policy,
            overlap_rule: config.effective_overlap_rule(),
            config: config.normalizer.clone(),
        }
    }

    #[inline]
    pub fn policy(&self) -> ReassemblyPolicy {
        self.policy
    }

    #[inline]
    pub fn overlap_rule(&self) -> OverlapRule {
        self.overlap_rule
    }

    #[inline]
    pub fn is_inline(&self) -> bool {
        self.config.mode == NormMode::Inline
    }

    /// Marks a rejected packet for drop. Only inline normalization drops; returns whether the
    /// packet was marked.
    pub fn packet_dropper(&self, disp: &mut PacketDisposition) -> bool {
        if !self.is_inline() {
            return false;
        }
        disp.set_action(PacketAction::Drop);
        if self.config.block {
            disp.set_action(PacketAction::Block);
        }
        true
    }

    /// Requests payload carried on a SYN be removed. Returns whether a trim was requested.
    pub fn trim_syn_payload(&self, tsd: &SegmentDescriptor, disp: &mut PacketDisposition) -> bool {
        if self.config.trim_syn && tsd.is_syn() && tsd.has_data() {
            log::debug!("trim {} bytes carried on SYN", tsd.len());
            disp.trim_to(0);
            return true;
        }
        false
    }

    /// Requests payload carried on a RST be removed. Returns whether a trim was requested.
    pub fn trim_rst_payload(&self, tsd: &SegmentDescriptor, disp: &mut PacketDisposition) -> bool {
        if self.config.trim_rst && tsd.is_rst() && tsd.has_data() {
            disp.trim_to(0);
            return true;
        }
        false
    }

    /// Requests payload beyond `max` bytes (what the receive window admits) be removed.
    pub fn trim_win_payload(
        &self,
        tsd: &SegmentDescriptor,
        max: usize,
        disp: &mut PacketDisposition,
    ) -> bool {
        if self.config.trim_win && tsd.len() > max {
            log::debug!("trim {} bytes beyond the receive window", tsd.len() - max);
            disp.trim_to(max);
            return true;
        }
        false
    }

    /// Requests payload beyond the negotiated MSS be removed.
    pub fn trim_mss_payload(
        &self,
        tsd: &SegmentDescriptor,
        mss: u16,
        disp: &mut PacketDisposition,
    ) -> bool {
        if self.config.trim_mss && mss > 0 && tsd.len() > mss as usize {
            disp.trim_to(mss as usize);
            return true;
        }
        false
    }

    /// Validates the sequence number of a RST against the receive window `[rcv_nxt, rcv_nxt +
    /// rcv_wnd)`. An unknown or zero window admits exactly `rcv_nxt`.
    pub fn validate_rst(&self, tsd: &SegmentDescriptor, rcv_nxt: u32, rcv_wnd: u32) -> bool {
        let right_edge = rcv_nxt.wrapping_add(rcv_wnd.max(1));
        match self.policy.rst_rule() {
            RstRule::InWindow => seq_in_range(tsd.seq(), rcv_nxt, right_edge),
            RstRule::ExactNext => tsd.seq() == rcv_nxt,
            RstRule::EndInWindow => {
                let end = tsd.end_seq();
                seq_geq(end, rcv_nxt) && seq_leq(end, right_edge)
            }
        }
    }

    /// Returns `true` if `tsval` should be checked against PAWS. Some stacks treat zero as absent.
    pub fn checks_tsval(&self, tsval: u32) -> bool {
        !(tsval == 0 && self.policy.ignores_zero_tsval())
    }

    /// Checks the urgent pointer for consistency with the URG flag and the payload. Returns
    /// `false` if it is inconsistent, after applying the configured response.
    pub fn handle_urgent(&self, tsd: &SegmentDescriptor, disp: &mut PacketDisposition) -> bool {
        let urp = tsd.urgent_ptr() as usize;
        let bad = if tsd.is_urg() {
            urp == 0 || !tsd.has_data() || urp > tsd.len()
        } else {
            urp != 0
        };
        if !bad {
            return true;
        }
        match self.config.urgent {
            UrgentAction::Pass => (),
            UrgentAction::Clear => disp.request(NormAction::ClearUrgent),
            UrgentAction::Drop => {
                self.packet_dropper(disp);
            }
        }
        false
    }

    /// Applies the configured response to an option block the decoder flagged invalid. Returns
    /// `false` if the options are invalid.
    pub fn handle_options(&self, tsd: &SegmentDescriptor, disp: &mut PacketDisposition) -> bool {
        if !tsd.has_bad_options() {
            return true;
        }
        match self.config.options {
            OptionsAction::Pass => (),
            OptionsAction::Strip => disp.request(NormAction::StripOptions),
            OptionsAction::Drop => {
                self.packet_dropper(disp);
            }
        }
        false
    }

    /// Requests ECN flags be cleared according to the configured mode.
    pub fn ecn_stripper(
        &self,
        tsd: &SegmentDescriptor,
        ecn_negotiated: bool,
        disp: &mut PacketDisposition,
    ) {
        if !tsd.has_ecn_flags() {
            return;
        }
        let strip = match self.config.ecn {
            EcnMode::Off => false,
            EcnMode::Packet => true,
            EcnMode::Stream => !ecn_negotiated,
        };
        if strip {
            disp.request(NormAction::ClearEcn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::tcp::segment::*;

    #[test]
    fn core_resolve_overlap_rules() {
        let existing = SeqRange::new(110, 120);
        let earlier = SeqRange::new(105, 115);
        let same_longer = SeqRange::new(110, 125);
        let inside = SeqRange::new(112, 118);
        let covering = SeqRange::new(100, 130);

        let winner = |incoming, rule| resolve_overlap(existing, incoming, rule).unwrap().winner;

        assert_eq!(winner(earlier, OverlapRule::FavorOld), Winner::Existing);
        assert_eq!(winner(inside, OverlapRule::FavorNew), Winner::Incoming);

        assert_eq!(winner(earlier, OverlapRule::FavorNewIfEarlier), Winner::Incoming);
        assert_eq!(winner(same_longer, OverlapRule::FavorNewIfEarlier), Winner::Existing);

        assert_eq!(
            winner(same_longer, OverlapRule::FavorNewIfEarlierOrLonger),
            Winner::Incoming
        );
        assert_eq!(
            winner(inside, OverlapRule::FavorNewIfEarlierOrLonger),
            Winner::Existing
        );

        assert_eq!(winner(covering, OverlapRule::FavorNewIfLonger), Winner::Incoming);
        assert_eq!(winner(earlier, OverlapRule::FavorNewIfLonger), Winner::Existing);
    }

    #[test]
    fn core_resolve_overlap_pieces() {
        let resolved = resolve_overlap(
            SeqRange::new(110, 120),
            SeqRange::new(100, 130),
            OverlapRule::FavorOld,
        )
        .unwrap();
        assert_eq!(resolved.head, Some(SeqRange::new(100, 110)));
        assert_eq!(resolved.overlap, SeqRange::new(110, 120));
        assert_eq!(resolved.tail, Some(SeqRange::new(120, 130)));

        assert!(resolve_overlap(
            SeqRange::new(110, 120),
            SeqRange::new(120, 130),
            OverlapRule::FavorNew
        )
        .is_none());

        // across the wrap
        let resolved = resolve_overlap(
            SeqRange::new(0xffff_fffa, 4),
            SeqRange::new(0xffff_fff0, 0xffff_fffc),
            OverlapRule::FavorNewIfEarlier,
        )
        .unwrap();
        assert_eq!(resolved.overlap, SeqRange::new(0xffff_fffa, 0xffff_fffc));
        assert_eq!(resolved.overlap.len(), 2);
        assert_eq!(resolved.winner, Winner::Incoming);
        assert!(resolved.tail.is_none());
    }

    #[test]
    fn core_policy_rules() {
        assert_eq!(ReassemblyPolicy::Bsd.overlap_rule(), OverlapRule::FavorNewIfEarlier);
        assert_eq!(ReassemblyPolicy::Last.overlap_rule(), OverlapRule::FavorNew);
        assert_eq!(ReassemblyPolicy::Vista.rst_rule(), RstRule::ExactNext);
        assert!(ReassemblyPolicy::MacOs.accepts_data_on_syn());
        assert!(!ReassemblyPolicy::Linux.accepts_data_on_syn());
        let name: &'static str = ReassemblyPolicy::OldLinux.into();
        assert_eq!(name, "old_linux");
    }

    #[test]
    fn core_validate_rst() {
        let mut config = default_config();
        let norm = Normalizer::new(&config);
        let rst = |seq| SegmentDescriptor::new(Direction::FromServer, seq, 0, RST, 0, &[]);
        assert!(norm.validate_rst(&rst(1000), 1000, 100));
        assert!(norm.validate_rst(&rst(1099), 1000, 100));
        assert!(!norm.validate_rst(&rst(1100), 1000, 100));
        assert!(!norm.validate_rst(&rst(999), 1000, 100));
        assert!(norm.validate_rst(&rst(1000), 1000, 0));

        config.policy = ReassemblyPolicy::Windows;
        let norm = Normalizer::new(&config);
        assert!(!norm.validate_rst(&rst(1001), 1000, 100));
        assert!(norm.validate_rst(&rst(1000), 1000, 100));
        assert!(!norm.checks_tsval(0));
    }

    #[test]
    fn core_normalizer_requests() {
        let mut config = default_config();
        config.normalizer.trim_syn = true;
        config.normalizer.urgent = UrgentAction::Clear;
        config.normalizer.ecn = EcnMode::Stream;
        let passive = Normalizer::new(&config);
        config.normalizer.mode = NormMode::Inline;
        config.normalizer.block = true;
        let inline = Normalizer::new(&config);

        let data = [0u8; 8];
        let syn = SegmentDescriptor::new(Direction::FromClient, 1, 0, SYN | ECE | CWR, 100, &data);
        let mut disp = PacketDisposition::new();
        assert!(passive.trim_syn_payload(&syn, &mut disp));
        assert_eq!(disp.trim_len, Some(0));
        passive.ecn_stripper(&syn, false, &mut disp);
        assert!(disp.norm.contains(NormAction::ClearEcn));

        let urg = SegmentDescriptor::new(Direction::FromClient, 1, 0, ACK | URG, 100, &data)
            .with_urgent_ptr(20);
        let mut disp = PacketDisposition::new();
        assert!(!passive.handle_urgent(&urg, &mut disp));
        assert!(disp.norm.contains(NormAction::ClearUrgent));

        let mut disp = PacketDisposition::new();
        assert!(!passive.packet_dropper(&mut disp));
        assert!(inline.packet_dropper(&mut disp));
        assert!(disp.actions.contains(PacketAction::Drop | PacketAction::Block));
    }
}
