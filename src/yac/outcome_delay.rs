//! Backoff applied by the consensus layer between reject rounds.
//!
//! A committing network pays no delay; a network stuck rejecting slows down
//! gradually so peers stop burning rounds faster than proposals can spread.

use crate::ledger::SyncOutcome;

use std::cmp::min;
use std::time::Duration;

pub struct OutcomeDelay {
    max_rounds_delay: Duration,
    delay_increment: Duration,
    reject_delay: Duration,
    max_local_counter: u32,
    local_counter: u32,
}

impl OutcomeDelay {
    pub fn new(max_rounds_delay: Duration) -> Self {
        OutcomeDelay {
            max_rounds_delay,
            delay_increment: min(max_rounds_delay, Duration::from_millis(1000)),
            reject_delay: Duration::from_millis(0),
            max_local_counter: 2,
            local_counter: 0,
        }
    }

    /// Delay to apply before entering the round that follows `outcome`.
    /// Grows every `max_local_counter` non-commit outcomes, resets on commit.
    pub fn on_outcome(&mut self, outcome: SyncOutcome) -> Duration {
        match outcome {
            SyncOutcome::Reject | SyncOutcome::Nothing => {
                self.local_counter += 1;
                if self.local_counter == self.max_local_counter {
                    self.local_counter = 0;
                    if self.reject_delay < self.max_rounds_delay {
                        self.reject_delay += self.delay_increment;
                    }
                }
            }
            SyncOutcome::Commit => {
                self.reject_delay = Duration::from_millis(0);
            }
        }
        self.reject_delay
    }
}
