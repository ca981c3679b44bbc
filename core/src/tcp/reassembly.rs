//! Per-direction reassembly queue.
//!
//! Queued data is kept as an ordered list of non-overlapping sequence ranges. Each range points
//! into a slot of a payload arena, so trimming the front of a range after a partial flush only
//! moves an offset. Overlaps are resolved on insertion, which means the queue always holds exactly
//! the bytes the emulated endpoint would deliver.

use crate::tcp::normalizer::{resolve_overlap, OverlapRule, SeqRange, Winner};
use crate::tcp::seq::*;

use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("queued segment limit {0} reached")]
    SegmentLimit(usize),

    #[error("queued byte limit {0} reached")]
    ByteLimit(usize),
}

/// Contiguous bytes released from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushChunk {
    pub seq: u32,
    pub payload: Vec<u8>,
}

impl FlushChunk {
    #[inline]
    pub fn end_seq(&self) -> u32 {
        self.seq.wrapping_add(self.payload.len() as u32)
    }
}

/// Summary of one insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// New bytes added to the queue.
    pub inserted_bytes: usize,
    /// Number of queued ranges the segment overlapped.
    pub overlaps: u32,
    pub overlapped_bytes: usize,
    /// Overlapped bytes differed from the queued ones.
    pub inconsistent: bool,
    /// The segment only carried data already queued.
    pub retransmit: bool,
    /// The segment only carried data already flushed.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Copy)]
struct QueuedRange {
    seq: u32,
    len: u32,
    slot: usize,
    offset: usize,
}

impl QueuedRange {
    #[inline]
    fn end(&self) -> u32 {
        self.seq.wrapping_add(self.len)
    }

    #[inline]
    fn range(&self) -> SeqRange {
        SeqRange::with_len(self.seq, self.len)
    }
}

/// Slot storage for queued payloads. Released slots keep their allocation and are reused.
#[derive(Debug, Default)]
struct PayloadArena {
    slots: Vec<Vec<u8>>,
    free: Vec<usize>,
}

impl PayloadArena {
    fn alloc(&mut self, bytes: &[u8]) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot].extend_from_slice(bytes);
                slot
            }
            None => {
                self.slots.push(bytes.to_vec());
                self.slots.len() - 1
            }
        }
    }

    fn release(&mut self, slot: usize) {
        self.slots[slot].clear();
        self.free.push(slot);
    }

    fn bytes(&self, slot: usize, offset: usize, len: usize) -> &[u8] {
        &self.slots[slot][offset..offset + len]
    }

    fn bytes_mut(&mut self, slot: usize, offset: usize, len: usize) -> &mut [u8] {
        &mut self.slots[slot][offset..offset + len]
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

/// Ordered queue of received but not yet flushed data for one direction.
#[derive(Debug)]
pub struct ReassemblyQueue {
    /// Next sequence number to be flushed. Unknown until the stream start is known.
    frontier: Option<u32>,
    ranges: VecDeque<QueuedRange>,
    arena: PayloadArena,
    queued_bytes: usize,
    max_bytes: usize,
    max_segs: usize,
}

impl ReassemblyQueue {
    /// Creates an empty queue. A limit of `0` is unlimited.
    pub fn new(max_bytes: usize, max_segs: usize) -> Self {
        ReassemblyQueue {
            frontier: None,
            ranges: VecDeque::new(),
            arena: PayloadArena::default(),
            queued_bytes: 0,
            max_bytes,
            max_segs,
        }
    }

    #[inline]
    pub fn frontier(&self) -> Option<u32> {
        self.frontier
    }

    /// Sets the sequence number the stream starts at.
    #[inline]
    pub fn set_frontier(&mut self, seq: u32) {
        self.frontier = Some(seq);
    }

    /// Number of queued ranges.
    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    #[inline]
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    /// First queued sequence number.
    #[inline]
    pub fn first_seq(&self) -> Option<u32> {
        self.ranges.front().map(|r| r.seq)
    }

    /// End of the gap-free run starting at the frontier.
    pub fn contiguous_end(&self) -> Option<u32> {
        let mut end = self.frontier.or_else(|| self.first_seq())?;
        for range in self.ranges.iter() {
            if range.seq != end {
                break;
            }
            end = range.end();
        }
        Some(end)
    }

    /// Inserts `data` starting at `seq`, resolving overlaps with queued data under `rule`.
    ///
    /// Bytes below the frontier are dropped. On a limit breach nothing is modified.
    pub fn insert(
        &mut self,
        seq: u32,
        data: &[u8],
        rule: OverlapRule,
    ) -> Result<InsertReport, ReassemblyError> {
        let mut report = InsertReport::default();
        if data.is_empty() {
            return Ok(report);
        }

        let (mut seq, mut data) = (seq, data);
        if let Some(frontier) = self.frontier {
            if seq_lt(seq, frontier) {
                let skip = seq_distance(seq, frontier) as usize;
                if skip >= data.len() {
                    log::debug!("Dropping old segment. cur: {} expect: {}", seq, frontier);
                    report.duplicate = true;
                    return Ok(report);
                }
                seq = frontier;
                data = &data[skip..];
            }
        }
        let incoming = SeqRange::with_len(seq, data.len() as u32);

        let mut pieces: Vec<SeqRange> = vec![];
        let mut overwrites: Vec<(usize, SeqRange)> = vec![];
        let mut cursor = incoming.start;
        for (idx, queued) in self.ranges.iter().enumerate() {
            if seq_geq(queued.seq, incoming.end) {
                break;
            }
            let resolved = match resolve_overlap(queued.range(), incoming, rule) {
                Some(resolved) => resolved,
                None => continue,
            };
            let overlap = resolved.overlap;
            if seq_lt(cursor, overlap.start) {
                pieces.push(SeqRange::new(cursor, overlap.start));
            }
            report.overlaps += 1;
            report.overlapped_bytes += overlap.len() as usize;

            let old = self.arena.bytes(
                queued.slot,
                queued.offset + seq_distance(queued.seq, overlap.start) as usize,
                overlap.len() as usize,
            );
            let new_start = seq_distance(incoming.start, overlap.start) as usize;
            let new = &data[new_start..new_start + overlap.len() as usize];
            if old != new {
                report.inconsistent = true;
                if resolved.winner == Winner::Incoming {
                    overwrites.push((idx, overlap));
                }
            }
            cursor = overlap.end;
        }
        if seq_lt(cursor, incoming.end) {
            pieces.push(SeqRange::new(cursor, incoming.end));
        }

        let new_bytes: usize = pieces.iter().map(|p| p.len() as usize).sum();
        if self.max_segs > 0 && self.ranges.len() + pieces.len() > self.max_segs {
            return Err(ReassemblyError::SegmentLimit(self.max_segs));
        }
        if self.max_bytes > 0 && self.queued_bytes + new_bytes > self.max_bytes {
            return Err(ReassemblyError::ByteLimit(self.max_bytes));
        }

        for (idx, overlap) in overwrites {
            let queued = self.ranges[idx];
            let src_start = seq_distance(incoming.start, overlap.start) as usize;
            let len = overlap.len() as usize;
            self.arena
                .bytes_mut(
                    queued.slot,
                    queued.offset + seq_distance(queued.seq, overlap.start) as usize,
                    len,
                )
                .copy_from_slice(&data[src_start..src_start + len]);
        }

        for piece in pieces.iter() {
            let start = seq_distance(incoming.start, piece.start) as usize;
            let slot = self
                .arena
                .alloc(&data[start..start + piece.len() as usize]);
            let pos = self
                .ranges
                .iter()
                .position(|r| seq_gt(r.seq, piece.start))
                .unwrap_or(self.ranges.len());
            self.ranges.insert(
                pos,
                QueuedRange {
                    seq: piece.start,
                    len: piece.len(),
                    slot,
                    offset: 0,
                },
            );
        }
        self.queued_bytes += new_bytes;

        report.inserted_bytes = new_bytes;
        report.retransmit = pieces.is_empty() && !report.inconsistent;
        Ok(report)
    }

    /// Releases queued data from the frontier up to `limit` (or everything if `None`).
    ///
    /// Stops at the first hole unless `skip_gaps` is set, in which case holes are jumped over and
    /// the frontier is moved to `limit` even if no data up to it was queued. Adjacent ranges are
    /// merged into one chunk.
    pub fn flush(&mut self, limit: Option<u32>, skip_gaps: bool) -> Vec<FlushChunk> {
        let mut chunks: Vec<FlushChunk> = vec![];
        while let Some(front) = self.ranges.front().copied() {
            let frontier = self.frontier.unwrap_or(front.seq);
            if seq_gt(front.seq, frontier) && !skip_gaps {
                break;
            }
            if let Some(limit) = limit {
                if seq_geq(front.seq, limit) {
                    break;
                }
            }

            let end = front.end();
            let take_end = match limit {
                Some(limit) if seq_lt(limit, end) => limit,
                _ => end,
            };
            let n = seq_distance(front.seq, take_end);
            let bytes = self.arena.bytes(front.slot, front.offset, n as usize);
            match chunks.last_mut() {
                Some(last) if last.end_seq() == front.seq => last.payload.extend_from_slice(bytes),
                _ => chunks.push(FlushChunk {
                    seq: front.seq,
                    payload: bytes.to_vec(),
                }),
            }
            self.queued_bytes -= n as usize;
            self.frontier = Some(take_end);

            if take_end == end {
                self.ranges.pop_front();
                self.arena.release(front.slot);
            } else {
                if let Some(queued) = self.ranges.front_mut() {
                    queued.seq = take_end;
                    queued.offset += n as usize;
                    queued.len -= n;
                }
                break;
            }
        }

        if skip_gaps {
            if let Some(limit) = limit {
                if self.frontier.map_or(true, |f| seq_lt(f, limit)) {
                    self.frontier = Some(limit);
                }
            }
        }
        chunks
    }

    /// Discards everything queued. Returns the number of discarded bytes.
    pub fn clear(&mut self) -> usize {
        let discarded = self.queued_bytes;
        self.ranges.clear();
        self.arena.clear();
        self.queued_bytes = 0;
        discarded
    }

    /// Discards everything queued and forgets the frontier.
    pub fn reset(&mut self) -> usize {
        self.frontier = None;
        self.clear()
    }
}
