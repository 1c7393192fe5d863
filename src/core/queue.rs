//! Indexed binary min-heap holding at most one live event per particle.
//!
//! Replacing or cancelling a particle's event is O(log n).

use crate::core::event::{Event, EventKind};
use crate::error::Result;

#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    /// Heap of particle indices ordered by `events[p]`.
    heap: Vec<usize>,
    /// Heap position of each particle, if scheduled.
    slot: Vec<Option<usize>>,
    events: Vec<Option<Event>>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new(n: usize) -> Self {
        Self {
            heap: Vec::with_capacity(n),
            slot: vec![None; n],
            events: vec![None; n],
            next_seq: 0,
        }
    }

    /// Drop every event and size the queue for `n` particles.
    pub fn reset(&mut self, n: usize) {
        self.heap.clear();
        self.slot.clear();
        self.slot.resize(n, None);
        self.events.clear();
        self.events.resize(n, None);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Live event of `particle`.
    #[inline]
    pub fn get(&self, particle: usize) -> Option<&Event> {
        self.events.get(particle).and_then(Option::as_ref)
    }

    /// Scheduled time of `particle`, `+inf` if none.
    #[inline]
    pub fn time_of(&self, particle: usize) -> f64 {
        self.get(particle)
            .map_or(f64::INFINITY, Event::time_f64)
    }

    /// Earliest event.
    #[inline]
    pub fn peek(&self) -> Option<&Event> {
        self.heap.first().and_then(|&p| self.events[p].as_ref())
    }

    /// Replace the event owned by `kind.primary()`. Infinite times cancel it.
    pub fn schedule(&mut self, time: f64, kind: EventKind) -> Result<()> {
        let p = kind.primary();
        if !time.is_finite() {
            self.cancel(p);
            return Ok(());
        }
        let event = Event::new(time, self.next_seq, kind)?;
        self.next_seq += 1;
        let old = self.events[p].replace(event);
        match self.slot[p] {
            Some(pos) => {
                let went_down = old.is_some_and(|o| event < o);
                if went_down {
                    self.sift_up(pos);
                } else {
                    self.sift_down(pos);
                }
            }
            None => {
                self.heap.push(p);
                let pos = self.heap.len() - 1;
                self.slot[p] = Some(pos);
                self.sift_up(pos);
            }
        }
        Ok(())
    }

    /// Remove the event owned by `particle`, if any.
    pub fn cancel(&mut self, particle: usize) {
        let Some(pos) = self.slot[particle].take() else {
            self.events[particle] = None;
            return;
        };
        self.events[particle] = None;
        let last = self.heap.len() - 1;
        if pos != last {
            self.heap.swap(pos, last);
            self.slot[self.heap[pos]] = Some(pos);
        }
        self.heap.pop();
        if pos < self.heap.len() {
            let moved = self.heap[pos];
            self.sift_up(pos);
            if let Some(now) = self.slot[moved] {
                self.sift_down(now);
            }
        }
    }

    #[inline]
    fn less(&self, a: usize, b: usize) -> bool {
        match (&self.events[self.heap[a]], &self.events[self.heap[b]]) {
            (Some(x), Some(y)) => x < y,
            _ => false,
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.slot[self.heap[a]] = Some(a);
        self.slot[self.heap[b]] = Some(b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let n = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            if left >= n {
                break;
            }
            let right = left + 1;
            let child = if right < n && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(child, pos) {
                break;
            }
            self.swap(pos, child);
            pos = child;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EventKind::{Pair, Piston, Wall};

    #[test]
    fn peek_returns_earliest() -> Result<()> {
        let mut q = EventQueue::new(4);
        q.schedule(3.0, Pair { i: 0, j: 1 })?;
        q.schedule(1.0, Wall { i: 2, wall_id: 0 })?;
        q.schedule(2.0, Piston { i: 3 })?;
        assert_eq!(q.peek().map(|e| e.kind.primary()), Some(2));
        assert_eq!(q.len(), 3);
        Ok(())
    }

    #[test]
    fn rescheduling_moves_both_directions() -> Result<()> {
        let mut q = EventQueue::new(3);
        q.schedule(1.0, Piston { i: 0 })?;
        q.schedule(2.0, Piston { i: 1 })?;
        q.schedule(3.0, Piston { i: 2 })?;
        q.schedule(5.0, Piston { i: 0 })?;
        assert_eq!(q.peek().map(|e| e.kind.primary()), Some(1));
        q.schedule(0.5, Pair { i: 2, j: 0 })?;
        assert_eq!(q.peek().map(|e| e.kind.primary()), Some(2));
        assert_eq!(q.len(), 3);
        Ok(())
    }

    #[test]
    fn infinite_time_cancels() -> Result<()> {
        let mut q = EventQueue::new(2);
        q.schedule(1.0, Piston { i: 0 })?;
        q.schedule(f64::INFINITY, Piston { i: 0 })?;
        assert!(q.is_empty());
        assert_eq!(q.time_of(0), f64::INFINITY);
        Ok(())
    }

    #[test]
    fn ties_go_to_first_registration() -> Result<()> {
        let mut q = EventQueue::new(3);
        q.schedule(1.0, Piston { i: 2 })?;
        q.schedule(1.0, Piston { i: 0 })?;
        q.schedule(1.0, Piston { i: 1 })?;
        assert_eq!(q.peek().map(|e| e.kind.primary()), Some(2));
        q.cancel(2);
        assert_eq!(q.peek().map(|e| e.kind.primary()), Some(0));
        Ok(())
    }

    #[test]
    fn cancel_keeps_heap_ordered() -> Result<()> {
        let mut q = EventQueue::new(8);
        let times = [5.0, 3.0, 8.0, 1.0, 7.0, 2.0, 6.0, 4.0];
        for (i, t) in times.iter().enumerate() {
            q.schedule(*t, Piston { i })?;
        }
        q.cancel(5);
        q.cancel(0);
        let mut drained = Vec::new();
        while let Some(e) = q.peek().copied() {
            drained.push(e.time_f64());
            q.cancel(e.kind.primary());
        }
        assert_eq!(drained, vec![1.0, 3.0, 4.0, 6.0, 7.0, 8.0]);
        Ok(())
    }
}
