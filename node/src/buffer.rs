//! Bounded merge-point collector for stages fed by several upstream branches.

use std::{collections::VecDeque, num::NonZeroUsize};

use parking_lot::Mutex;

/// Sliding-window collector that merges partial outputs into one input.
///
/// Capacity equals the quorum of upstream branches the merge stage expects.
/// Arrivals below quorum are held; reaching quorum drains the window and
/// yields the concatenation in arrival order. Should arrivals ever outpace
/// consumption, the oldest partial is dropped first: recency wins over
/// completeness, stale partials are stale pipeline state.
pub struct AggregationBuffer {
    quorum: NonZeroUsize,
    parts: Mutex<VecDeque<Vec<f32>>>,
}

impl AggregationBuffer {
    /// Creates a buffer expecting `quorum` partial inputs per merge.
    pub fn new(quorum: NonZeroUsize) -> Self {
        Self {
            quorum,
            parts: Mutex::new(VecDeque::with_capacity(quorum.get())),
        }
    }

    /// Offers one partial input to the window.
    ///
    /// # Returns
    /// `None` while below quorum: the caller must ack and stop, invoking
    /// nothing downstream. At quorum, the concatenated batch; the window is
    /// empty afterwards.
    pub fn offer(&self, part: Vec<f32>) -> Option<Vec<f32>> {
        let quorum = self.quorum.get();
        let mut parts = self.parts.lock();

        parts.push_back(part);
        while parts.len() > quorum {
            parts.pop_front();
        }

        if parts.len() < quorum {
            return None;
        }

        let total = parts.iter().map(Vec::len).sum();
        let mut merged = Vec::with_capacity(total);
        for part in parts.drain(..) {
            merged.extend_from_slice(&part);
        }

        Some(merged)
    }

    /// Number of partials currently held.
    pub fn len(&self) -> usize {
        self.parts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(quorum: usize) -> AggregationBuffer {
        AggregationBuffer::new(NonZeroUsize::new(quorum).unwrap())
    }

    #[test]
    fn below_quorum_holds_the_partial() {
        let buf = buffer(2);

        assert!(buf.offer(vec![1.0, 2.0]).is_none());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn quorum_concatenates_in_arrival_order() {
        let buf = buffer(2);

        assert!(buf.offer(vec![1.0, 2.0]).is_none());
        let batch = buf.offer(vec![3.0, 4.0]).unwrap();

        assert_eq!(batch, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn window_is_empty_after_quorum() {
        let buf = buffer(2);

        buf.offer(vec![1.0]);
        buf.offer(vec![2.0]).unwrap();

        assert!(buf.is_empty());
        assert!(buf.offer(vec![3.0]).is_none());
    }

    #[test]
    fn length_never_exceeds_quorum() {
        let buf = buffer(3);

        for i in 0..20 {
            buf.offer(vec![i as f32]);
            assert!(buf.len() <= 3);
        }
    }

    #[test]
    fn second_cycle_starts_from_scratch() {
        let buf = buffer(2);

        buf.offer(vec![1.0]);
        assert_eq!(buf.offer(vec![2.0]).unwrap(), vec![1.0, 2.0]);

        buf.offer(vec![5.0]);
        assert_eq!(buf.offer(vec![6.0]).unwrap(), vec![5.0, 6.0]);
    }
}
