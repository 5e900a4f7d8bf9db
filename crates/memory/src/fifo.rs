//! Round-robin eviction queue for RAM resident blocks.
//!
//! The queue holds the coordinates of every RAM resident block in load
//! order. Eviction always takes the head, regardless of how recently a block
//! was accessed, and the incoming block goes to the tail.

use crate::index::BlockCoord;
use std::collections::VecDeque;

/// Bounded FIFO of RAM resident block coordinates.
#[derive(Debug, Default)]
pub struct SwapFifo {
    queue: VecDeque<BlockCoord>,
    capacity: usize,
}

impl SwapFifo {
    /// Empty queue holding at most `capacity` entries; storage grows on demand
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Append a newly loaded block.
    ///
    /// # Panics
    ///
    /// Panics when the queue is already full.
    pub fn push(&mut self, coord: BlockCoord) {
        assert!(
            self.queue.len() < self.capacity,
            "swap FIFO overflow: {} entries, capacity {}",
            self.queue.len(),
            self.capacity
        );
        self.queue.push_back(coord);
    }

    /// Next block to evict
    #[inline]
    pub fn front(&self) -> Option<BlockCoord> {
        self.queue.front().copied()
    }

    /// Evict the head and append `incoming` in one step, returning the victim.
    pub fn rotate(&mut self, incoming: BlockCoord) -> Option<BlockCoord> {
        let victim = self.queue.pop_front()?;
        self.queue.push_back(incoming);
        Some(victim)
    }

    /// Drop every entry for which `keep` returns false, preserving order
    pub fn retain(&mut self, keep: impl FnMut(&BlockCoord) -> bool) {
        self.queue.retain(keep);
    }

    /// Rewrite coordinates in place after the index was reshaped
    pub fn remap(&mut self, mut f: impl FnMut(&mut BlockCoord)) {
        self.queue.iter_mut().for_each(|c| f(c));
    }

    pub fn contains(&self, coord: &BlockCoord) -> bool {
        self.queue.contains(coord)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockCoord> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: usize) -> BlockCoord {
        BlockCoord::new(0, x, 0)
    }

    #[test]
    fn test_rotate_evicts_oldest() {
        let mut fifo = SwapFifo::new(3);
        for x in 0..3 {
            fifo.push(c(x));
        }

        assert_eq!(fifo.rotate(c(3)), Some(c(0)));
        assert_eq!(fifo.rotate(c(4)), Some(c(1)));
        assert_eq!(fifo.front(), Some(c(2)));
        assert_eq!(fifo.iter().copied().collect::<Vec<_>>(), vec![c(2), c(3), c(4)]);
    }

    #[test]
    fn test_rotate_empty() {
        let mut fifo = SwapFifo::new(1);
        assert_eq!(fifo.rotate(c(0)), None);
        assert!(fifo.is_empty());
    }

    #[test]
    #[should_panic(expected = "swap FIFO overflow")]
    fn test_push_past_capacity() {
        let mut fifo = SwapFifo::new(1);
        fifo.push(c(0));
        fifo.push(c(1));
    }

    #[test]
    fn test_retain_and_remap() {
        let mut fifo = SwapFifo::new(4);
        for x in 0..4 {
            fifo.push(c(x));
        }
        fifo.retain(|coord| coord.x % 2 == 1);
        fifo.remap(|coord| coord.x -= 1);

        assert_eq!(fifo.len(), 2);
        assert!(fifo.contains(&c(0)));
        assert!(fifo.contains(&c(2)));
        assert_eq!(fifo.front(), Some(c(0)));
    }
}
