//! Min-heap timer wheel (spec.md §4.6/§5): schedules one-shot delays,
//! supports idempotent cancellation, and still delivers a (distinct)
//! outcome for a timer that fired after it was canceled, so a caller
//! blocked on `wait_next` never waits forever on a timer it canceled out
//! from under itself. Used for ping-interval/pong-timeout/handshake-TTL
//! bookkeeping once a session is past the per-connection deadline handled
//! directly by `tokio::time::timeout` in the transport loop.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerOutcome {
    Fired(TimerId),
    Canceled(TimerId),
}

enum Slot {
    Pending,
    Canceled,
}

pub struct TimerWheel {
    next_id: u64,
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    slots: HashMap<u64, Slot>,
}

impl TimerWheel {
    pub fn new() -> Self {
        TimerWheel {
            next_id: 0,
            heap: BinaryHeap::new(),
            slots: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn schedule(&mut self, delay: Duration) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        let at = Instant::now() + delay;
        self.heap.push(Reverse((at, id)));
        self.slots.insert(id, Slot::Pending);
        TimerId(id)
    }

    /// Idempotent: canceling an already-canceled or already-fired timer is a
    /// harmless no-op and returns `false`.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.slots.get_mut(&id.0) {
            Some(slot @ Slot::Pending) => {
                *slot = Slot::Canceled;
                true
            }
            _ => false,
        }
    }

    fn pop_due(&mut self, now: Instant) -> Option<TimerOutcome> {
        match self.heap.peek() {
            Some(Reverse((at, _))) if *at <= now => {}
            _ => return None,
        }
        let Reverse((_, id)) = self.heap.pop().expect("peeked Some above");
        match self.slots.remove(&id) {
            Some(Slot::Pending) => Some(TimerOutcome::Fired(TimerId(id))),
            Some(Slot::Canceled) => Some(TimerOutcome::Canceled(TimerId(id))),
            None => None,
        }
    }

    /// Drains every timer already due as of `now`, in firing order.
    pub fn drain_due(&mut self, now: Instant) -> Vec<TimerOutcome> {
        let mut out = Vec::new();
        while let Some(outcome) = self.pop_due(now) {
            out.push(outcome);
        }
        out
    }

    /// Sleeps until the next timer is due (or forever, if none are
    /// scheduled, returning `None`), then delivers its outcome.
    pub async fn wait_next(&mut self) -> Option<TimerOutcome> {
        loop {
            let now = Instant::now();
            if let Some(outcome) = self.pop_due(now) {
                return Some(outcome);
            }
            let next_at = match self.heap.peek() {
                Some(Reverse((at, _))) => *at,
                None => return None,
            };
            tokio::time::sleep(next_at.saturating_duration_since(now)).await;
        }
    }
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancel_is_idempotent() {
        let mut wheel = TimerWheel::new();
        let id = wheel.schedule(Duration::from_secs(60));
        assert!(wheel.cancel(id));
        assert!(!wheel.cancel(id), "second cancel must be a no-op");
    }

    #[test]
    fn drain_due_delivers_fired_in_order() {
        let mut wheel = TimerWheel::new();
        let a = wheel.schedule(Duration::from_millis(0));
        let b = wheel.schedule(Duration::from_millis(0));
        let due = wheel.drain_due(Instant::now() + Duration::from_millis(1));
        assert_eq!(due, vec![TimerOutcome::Fired(a), TimerOutcome::Fired(b)]);
    }

    #[test]
    fn canceled_timer_still_delivers_a_canceled_outcome_once_due() {
        let mut wheel = TimerWheel::new();
        let id = wheel.schedule(Duration::from_millis(0));
        wheel.cancel(id);
        let due = wheel.drain_due(Instant::now() + Duration::from_millis(1));
        assert_eq!(due, vec![TimerOutcome::Canceled(id)]);
    }

    #[test]
    fn timer_not_yet_due_is_not_drained() {
        let mut wheel = TimerWheel::new();
        wheel.schedule(Duration::from_secs(60));
        let due = wheel.drain_due(Instant::now());
        assert!(due.is_empty());
        assert_eq!(wheel.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_next_resolves_once_the_delay_elapses() {
        let mut wheel = TimerWheel::new();
        let id = wheel.schedule(Duration::from_millis(50));
        let outcome = wheel.wait_next().await;
        assert_eq!(outcome, Some(TimerOutcome::Fired(id)));
    }

    #[tokio::test]
    async fn wait_next_returns_none_with_nothing_scheduled() {
        let mut wheel = TimerWheel::new();
        assert_eq!(wheel.wait_next().await, None);
    }
}
