//! Latency-bounded GPU-to-CPU readback ring.

/// A fixed ring of `max(latency, 1) + 1` slots for staged readback.
///
/// Each frame first reads back the copy recorded `latency` frames earlier
/// and then hands out the slot for its own copy, see [`ReadbackRing::advance`].
/// Since a copy is only recorded after the read, latency 0 reads the previous
/// frame's copy, same as latency 1. Frames before the first readable copy get
/// `None` and the caller uses its fallback.
pub struct ReadbackRing<T> {
    slots: Vec<T>,
    latency: usize,
}

impl<T> ReadbackRing<T> {
    /// Create a ring for `latency` frames of delay, building each slot with `make_slot`.
    pub fn new(latency: usize, make_slot: impl FnMut(usize) -> T) -> Self {
        Self {
            slots: (0..latency.max(1) + 1).map(make_slot).collect(),
            latency,
        }
    }

    /// Frames of delay between a write and its read, as requested.
    pub fn latency(&self) -> usize {
        self.latency
    }

    /// Frames between a copy and its read in the read-then-write order.
    pub fn lag(&self) -> usize {
        self.latency.max(1)
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot written at `frame_index`.
    pub fn write_slot(&self, frame_index: u64) -> usize {
        (frame_index % self.slots.len() as u64) as usize
    }

    /// Slot holding the copy of frame `frame_index - lag`, if there is one.
    pub fn read_slot(&self, frame_index: u64) -> Option<usize> {
        frame_index
            .checked_sub(self.lag() as u64)
            .map(|written| self.write_slot(written))
    }

    /// The slot to fill for `frame_index`.
    pub fn push(&mut self, frame_index: u64) -> &mut T {
        let slot = self.write_slot(frame_index);
        &mut self.slots[slot]
    }

    /// The slot to read for `frame_index`, or `None` while the ring is filling.
    pub fn try_read(&self, frame_index: u64) -> Option<&T> {
        self.read_slot(frame_index).map(|slot| &self.slots[slot])
    }

    /// Run one frame: `read` the due slot, then return the slot for this frame's copy.
    pub fn advance<R>(
        &mut self,
        frame_index: u64,
        read: impl FnOnce(&T) -> R,
    ) -> (Option<R>, &mut T) {
        let value = self.try_read(frame_index).map(read);
        (value, self.push(frame_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Each frame reads what is due and then records its own index, as the
    /// depth reducer does with its staging buffers.
    fn run(latency: usize, frames: u64) -> Vec<Option<u64>> {
        let mut ring = ReadbackRing::new(latency, |_| None::<u64>);
        (0..frames)
            .map(|f| {
                let (read, slot) = ring.advance(f, |value| *value);
                *slot = Some(f);
                read.flatten()
            })
            .collect()
    }

    #[test]
    fn test_ring_length() {
        assert_eq!(ReadbackRing::new(0, |i| i).len(), 2);
        for latency in 1..4 {
            let ring = ReadbackRing::new(latency, |i| i);
            assert_eq!(ring.len(), latency + 1);
        }
    }

    #[test]
    fn test_latency_zero_reads_previous_frame() {
        let reads = run(0, 4);
        assert_eq!(reads, vec![None, Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_latency_zero_matches_latency_one() {
        assert_eq!(run(0, 8), run(1, 8));
    }

    #[test]
    fn test_reads_lag_by_latency() {
        for latency in 1..4usize {
            let reads = run(latency, 10);
            for (f, read) in reads.iter().enumerate() {
                if f < latency {
                    assert_eq!(*read, None, "latency {latency} frame {f}");
                } else {
                    assert_eq!(*read, Some((f - latency) as u64), "latency {latency} frame {f}");
                }
            }
        }
    }

    #[test]
    fn test_read_slot_never_current_write_slot() {
        for latency in 0..4 {
            let ring = ReadbackRing::new(latency, |_| ());
            for f in 1..20 {
                assert_ne!(ring.read_slot(f), Some(ring.write_slot(f)), "latency {latency}");
            }
        }
    }
}
