use bitmask_enum::bitmask;

/// Packet disposition flags consumed by the external packet-disposition stage.
#[bitmask(u8)]
#[bitmask_config(vec_debug)]
pub enum PacketAction {
    Drop,          // Inline: do not forward the packet
    Block,         // Inline: block the rest of the flow
    BadPkt,        // Segment rejected by the tracker
    Reset,         // Valid RST observed, session reset
    SessionClosed, // Session torn down by this packet
}

/// Normalization requests. The core never rewrites packets itself.
#[bitmask(u8)]
#[bitmask_config(vec_debug)]
pub enum NormAction {
    TrimPayload,  // Trim payload to `PacketDisposition::trim_len`
    ClearUrgent,  // Clear URG flag and urgent pointer
    StripOptions, // Replace invalid options with NOPs
    ClearEcn,     // Clear ECE/CWR
}

/// Per-packet disposition accumulated while a segment is processed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PacketDisposition {
    pub actions: PacketAction,
    pub norm: NormAction,
    /// Number of payload bytes to keep when `NormAction::TrimPayload` is requested.
    pub trim_len: Option<usize>,
}

impl Default for PacketDisposition {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketDisposition {
    pub fn new() -> Self {
        PacketDisposition {
            actions: PacketAction::none(),
            norm: NormAction::none(),
            trim_len: None,
        }
    }

    #[inline]
    pub fn set_action(&mut self, action: PacketAction) {
        self.actions |= action;
    }

    #[inline]
    pub fn is_bad(&self) -> bool {
        self.actions.intersects(PacketAction::BadPkt)
    }

    #[inline]
    pub fn is_dropped(&self) -> bool {
        self.actions.intersects(PacketAction::Drop | PacketAction::Block)
    }

    /// Requests that the payload be trimmed to `keep` bytes. The smallest request wins.
    #[inline]
    pub fn trim_to(&mut self, keep: usize) {
        self.norm |= NormAction::TrimPayload;
        self.trim_len = Some(self.trim_len.map_or(keep, |cur| cur.min(keep)));
    }

    #[inline]
    pub fn request(&mut self, norm: NormAction) {
        self.norm |= norm;
    }

    /// Number of payload bytes still visible after trimming.
    #[inline]
    pub fn visible_len(&self, len: usize) -> usize {
        self.trim_len.map_or(len, |keep| keep.min(len))
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn test_disposition() {
        let mut disp = PacketDisposition::new();
        assert!(!disp.is_bad() && !disp.is_dropped());

        disp.set_action(PacketAction::BadPkt);
        assert!(disp.is_bad());
        assert!(!disp.actions.contains(PacketAction::Drop));

        disp.set_action(PacketAction::Drop);
        assert!(disp.is_dropped());

        disp.trim_to(10);
        disp.trim_to(4);
        disp.trim_to(7);
        assert_eq!(disp.trim_len, Some(4));
        assert!(disp.norm.contains(NormAction::TrimPayload));
        assert_eq!(disp.visible_len(20), 4);
        assert_eq!(disp.visible_len(2), 2);

        disp.clear();
        assert!(disp.actions.is_none() && disp.norm.is_none());
    }
}
