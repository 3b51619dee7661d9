use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Identifies one arming of a packet's timer. Re-arming issues a new handle,
/// which turns any older heap entry for the same sequence stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Deadline {
    due_ms: u64,
    sequence: u16,
    handle: TimerHandle,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.due_ms == other.due_ms && self.handle == other.handle
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap, earlier arming first on ties
        other
            .due_ms
            .cmp(&self.due_ms)
            .then_with(|| other.handle.0.cmp(&self.handle.0))
    }
}

/// One retransmission timer per in-flight sequence number, kept in a heap
/// keyed by due time. Cancelled timers are dropped lazily when they surface.
#[derive(Debug)]
pub struct RetransmissionScheduler {
    deadlines: BinaryHeap<Deadline>,
    armed: HashMap<u16, TimerHandle>,
    next_handle: u64,
    timeout_ms: u64,
}

impl RetransmissionScheduler {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            deadlines: BinaryHeap::new(),
            armed: HashMap::new(),
            next_handle: 0,
            timeout_ms,
        }
    }

    /// Arms (or re-arms) the timer for `sequence` to fire one timeout from `now_ms`.
    pub fn schedule(&mut self, sequence: u16, now_ms: u64) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;

        let due_ms = now_ms + self.timeout_ms;
        self.armed.insert(sequence, handle);
        self.deadlines.push(Deadline {
            due_ms,
            sequence,
            handle,
        });

        log::trace!("Timer for R#{} armed, due at {} ms", sequence, due_ms);
        handle
    }

    /// Restarts a running timer. Returns `None` if nothing was armed.
    pub fn reset(&mut self, sequence: u16, now_ms: u64) -> Option<TimerHandle> {
        if !self.armed.contains_key(&sequence) {
            return None;
        }
        Some(self.schedule(sequence, now_ms))
    }

    /// Disarms the timer. Cancelling an unarmed sequence is a no-op.
    pub fn cancel(&mut self, sequence: u16) -> bool {
        let cancelled = self.armed.remove(&sequence).is_some();
        if cancelled {
            log::trace!("Timer for R#{} cancelled", sequence);
        }
        cancelled
    }

    /// Pops every timer due at or before `now_ms`, in due order. Fired
    /// timers are disarmed; the caller decides whether to schedule again.
    pub fn expired(&mut self, now_ms: u64) -> Vec<u16> {
        let mut fired = Vec::new();

        while let Some(deadline) = self.deadlines.peek() {
            if deadline.due_ms > now_ms {
                break;
            }
            let Some(deadline) = self.deadlines.pop() else {
                break;
            };
            if self.armed.get(&deadline.sequence) == Some(&deadline.handle) {
                self.armed.remove(&deadline.sequence);
                fired.push(deadline.sequence);
            }
        }

        fired
    }

    /// Due time of the earliest live timer.
    pub fn next_deadline(&mut self) -> Option<u64> {
        while let Some(deadline) = self.deadlines.peek() {
            if self.armed.get(&deadline.sequence) == Some(&deadline.handle) {
                return Some(deadline.due_ms);
            }
            self.deadlines.pop();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_due_order() {
        let mut scheduler = RetransmissionScheduler::new(150);
        scheduler.schedule(2, 10);
        scheduler.schedule(1, 0);
        scheduler.schedule(3, 20);

        assert!(scheduler.expired(149).is_empty());
        assert_eq!(scheduler.expired(165), vec![1, 2]);
        assert_eq!(scheduler.next_deadline(), Some(170));
        assert_eq!(scheduler.expired(1000), vec![3]);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut scheduler = RetransmissionScheduler::new(150);
        scheduler.schedule(7, 0);

        assert!(scheduler.cancel(7));
        assert!(!scheduler.cancel(7));
        assert!(!scheduler.cancel(99));
        assert!(scheduler.expired(500).is_empty());
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn test_reset_supersedes_old_deadline() {
        let mut scheduler = RetransmissionScheduler::new(150);
        scheduler.schedule(5, 0);
        scheduler.reset(5, 100).unwrap();

        assert!(scheduler.expired(150).is_empty());
        assert_eq!(scheduler.next_deadline(), Some(250));
        assert_eq!(scheduler.expired(250), vec![5]);

        assert!(scheduler.reset(5, 300).is_none());
    }
}
