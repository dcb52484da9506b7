/*
Time-queue for the hierarchy model.

Every queue inside a cache or the main memory is a plain FIFO of payloads that carry the cycle at
which they become eligible for processing.  Producers compute that cycle when they enqueue (the
receiver's current cycle plus its intrinsic latency) and consumers only ever look at the head:
a head that is not ready yet blocks everything queued behind it, which keeps arrival order intact.

Nothing here blocks or rejects; latency is modeled, not enforced with backpressure.
*/

use std::collections::VecDeque;

pub type Cycle = u64;

// Anything that can sit in a timed queue.
pub trait Timed {
    fn ready_at(&self) -> Cycle;

    // Whether the payload may be processed at the provided cycle.
    fn is_ready(&self, now: Cycle) -> bool {
        now >= self.ready_at()
    }

    // Number of cycles until the payload is ready.  Returns zero if already ready.
    fn remaining_cycles(&self, now: Cycle) -> Cycle {
        self.ready_at().saturating_sub(now)
    }
}

// Arrival-ordered FIFO gated on the head's ready cycle.
#[derive(Debug)]
pub struct TimedQueue<T> {
    entries: VecDeque<T>,
}

impl<T> Default for TimedQueue<T> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<T: Timed> TimedQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, payload: T) {
        self.entries.push_back(payload);
    }

    // Pop the head only if it is ready at `now`.
    pub fn pop_ready(&mut self, now: Cycle) -> Option<T> {
        if !self.entries.front()?.is_ready(now) {
            return None;
        }
        self.entries.pop_front()
    }

    // Pop the head regardless of its ready cycle.
    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut()
    }

    // Pull every payload matching `pred` out of the queue, ready or not. The rest keep their order.
    pub fn take_where<F: FnMut(&T) -> bool>(&mut self, mut pred: F) -> Vec<T> {
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(self.entries.len());
        for payload in self.entries.drain(..) {
            if pred(&payload) {
                taken.push(payload);
            } else {
                kept.push_back(payload);
            }
        }
        self.entries = kept;
        taken
    }
}
