//! Bounded forward queue with deduplication and loop detection.
//!
//! The queue holds up to 100 frames awaiting re-broadcast. Every slot can
//! hold either frame type (the `Frame` enum is sized by its larger,
//! election-announcement variant). Admission applies three checks in
//! order:
//!
//! 1. Loop: the local node id already appears in the frame's path.
//! 2. Duplicate: the frame's message id is in the seen cache.
//! 3. Overflow: no free slot.
//!
//! The seen cache is a 200-entry circular record of `(sender, message_id)`
//! pairs with insertion timestamps; entries expire through the periodic
//! maintenance call, and the oldest entry is overwritten when the cache is
//! full (deduplication is best-effort by design).

use crate::error::Error;
use crate::filter::forward_priority;
use crate::types::{FORWARD_QUEUE_CAPACITY, SEEN_CACHE_CAPACITY};
use crate::wire::Frame;

/// Message identity used for deduplication.
///
/// The canonical derivation covers `(sender_id, ttl)` only. Two hops that
/// decrement TTL identically therefore collide; the derivation is
/// preserved verbatim for wire-peer compatibility.
pub fn message_id(sender_id: u32, ttl: u8) -> u64 {
    (u64::from(sender_id)) << 32 | u64::from(ttl)
}

#[derive(Debug, Clone, Copy)]
struct SeenEntry {
    sender_id: u32,
    message_id: u64,
    inserted_at_ms: u64,
}

#[derive(Debug)]
struct QueueSlot {
    frame: Frame,
    #[allow(dead_code)]
    ingress_ms: u64,
    priority: u8,
}

/// Queue admission and drain counters.
///
/// `enqueued` counts every admission attempt, so at any point
/// `enqueued == dequeued + duplicates + loops + overflows + held`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub duplicates: u64,
    pub loops: u64,
    pub overflows: u64,
}

/// Fixed-capacity priority queue plus seen cache.
#[derive(Debug)]
pub struct ForwardQueue {
    slots: [Option<QueueSlot>; FORWARD_QUEUE_CAPACITY],
    len: usize,
    seen: [Option<SeenEntry>; SEEN_CACHE_CAPACITY],
    seen_len: usize,
    /// Next seen-cache slot to write; wraps for overwrite-oldest.
    seen_write: usize,
    stats: QueueStats,
}

impl ForwardQueue {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            len: 0,
            seen: [None; SEEN_CACHE_CAPACITY],
            seen_len: 0,
            seen_write: 0,
            stats: QueueStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn seen_count(&self) -> usize {
        self.seen_len
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    /// Offer a frame for forwarding.
    ///
    /// On success the frame occupies the first free slot with priority
    /// `255 - ttl` and its id is marked seen. Rejections are counted and
    /// returned as [`Error::Loop`], [`Error::Duplicate`] or
    /// [`Error::Overflow`].
    pub fn enqueue(&mut self, frame: Frame, self_id: u32, now_ms: u64) -> Result<(), Error> {
        self.stats.enqueued += 1;

        let d = frame.discovery();
        if d.path.contains(&self_id) {
            self.stats.loops += 1;
            return Err(Error::Loop);
        }

        let id = message_id(d.sender_id, d.ttl);
        if self.is_seen(id) {
            self.stats.duplicates += 1;
            return Err(Error::Duplicate);
        }

        if self.len == FORWARD_QUEUE_CAPACITY {
            self.stats.overflows += 1;
            return Err(Error::Overflow);
        }

        let priority = forward_priority(d.ttl);
        let sender_id = d.sender_id;
        // Overflow was ruled out above, a free slot exists.
        let Some(free) = self.slots.iter().position(|s| s.is_none()) else {
            self.stats.overflows += 1;
            return Err(Error::Overflow);
        };
        self.slots[free] = Some(QueueSlot {
            frame,
            ingress_ms: now_ms,
            priority,
        });
        self.len += 1;
        self.mark_seen(sender_id, id, now_ms);
        Ok(())
    }

    /// Remove and return the highest-priority frame (lowest priority
    /// value; ties go to the lowest slot index).
    pub fn dequeue(&mut self) -> Option<Frame> {
        let best = self.best_slot_index()?;
        let slot = self.slots[best].take()?;
        self.len -= 1;
        self.stats.dequeued += 1;
        Some(slot.frame)
    }

    /// The frame `dequeue` would return, without removing it.
    pub fn peek(&self) -> Option<&Frame> {
        let best = self.best_slot_index()?;
        self.slots[best].as_ref().map(|s| &s.frame)
    }

    fn best_slot_index(&self) -> Option<usize> {
        let mut best: Option<(usize, u8)> = None;
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(s) = slot {
                match best {
                    Some((_, p)) if p <= s.priority => {}
                    _ => best = Some((idx, s.priority)),
                }
            }
        }
        best.map(|(idx, _)| idx)
    }

    /// Drop everything: queued frames and the entire seen cache. Counters
    /// are preserved.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.len = 0;
        self.seen = [None; SEEN_CACHE_CAPACITY];
        self.seen_len = 0;
        self.seen_write = 0;
    }

    /// Expire seen-cache entries older than `max_age_ms`. Returns how many
    /// were removed.
    pub fn maintain(&mut self, now_ms: u64, max_age_ms: u64) -> usize {
        let mut removed = 0;
        for entry in self.seen.iter_mut() {
            if let Some(e) = entry {
                if now_ms.saturating_sub(e.inserted_at_ms) > max_age_ms {
                    *entry = None;
                    removed += 1;
                }
            }
        }
        self.seen_len -= removed;
        removed
    }

    fn is_seen(&self, id: u64) -> bool {
        self.seen
            .iter()
            .flatten()
            .any(|e| e.message_id == id)
    }

    fn mark_seen(&mut self, sender_id: u32, id: u64, now_ms: u64) {
        // Prefer a free slot; otherwise overwrite at the circular write
        // position (oldest-first once the cache has wrapped).
        if self.seen_len < SEEN_CACHE_CAPACITY {
            if let Some(free) = self.seen.iter().position(|e| e.is_none()) {
                self.seen[free] = Some(SeenEntry {
                    sender_id,
                    message_id: id,
                    inserted_at_ms: now_ms,
                });
                self.seen_len += 1;
                return;
            }
        }
        self.seen[self.seen_write] = Some(SeenEntry {
            sender_id,
            message_id: id,
            inserted_at_ms: now_ms,
        });
        self.seen_write = (self.seen_write + 1) % SEEN_CACHE_CAPACITY;
    }
}

impl Default for ForwardQueue {
    fn default() -> Self {
        Self::new()
    }
}
