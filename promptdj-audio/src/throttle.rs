//! Latest-wins throttle driven by the owning event loop.
//!
//! A call arms a deadline one cooldown away and stores its arguments; calls
//! before the deadline only replace the stored arguments. `poll` hands out the
//! newest arguments once the deadline has passed. Nothing runs on its own:
//! the loop waits until `next_deadline()` and polls.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Throttle<A> {
    cooldown: Duration,
    pending: Option<A>,
    deadline: Option<Instant>,
    last_fired: Option<Instant>,
    coalesced: u64,
}

impl<A> Throttle<A> {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            pending: None,
            deadline: None,
            last_fired: None,
            coalesced: 0,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Record a call. Only the most recent arguments survive to the
    /// invocation.
    pub fn call(&mut self, args: A, now: Instant) {
        if self.pending.replace(args).is_some() {
            self.coalesced += 1;
        }
        if self.deadline.is_none() {
            let mut at = now + self.cooldown;
            if let Some(last) = self.last_fired {
                at = at.max(last + self.cooldown);
            }
            self.deadline = Some(at);
        }
    }

    /// Take the pending arguments if their deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<A> {
        match self.deadline {
            Some(at) if at <= now => {
                self.deadline = None;
                let args = self.pending.take()?;
                self.last_fired = Some(now);
                Some(args)
            }
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Drop the pending invocation, if any.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline = None;
    }

    /// Number of calls replaced before they were invoked.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}
