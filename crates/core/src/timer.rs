//! Deadline-based countdown.
//!
//! The timer stores an absolute deadline and recomputes the remaining time on
//! every query, so a host that wakes late never sees drift. Every `arm`,
//! `cancel` and `resume` bumps an epoch; scheduled checks carry the epoch they
//! were issued under and are ignored once it is stale.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TimerError {
    #[error("timer cannot be paused in graded sessions")]
    NotPausable,

    #[error("timer is not running")]
    NotRunning,

    #[error("timer is not paused")]
    NotPaused,
}

/// Handle for one scheduled expiry check.
///
/// The host sleeps until `deadline`, then hands `epoch` back to
/// [`Timer::fire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTicket {
    pub epoch: u64,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Idle,
    Running { deadline: DateTime<Utc> },
    Paused { remaining: Duration },
    Fired,
}

#[derive(Debug, Clone)]
pub struct Timer {
    state: TimerState,
    epoch: u64,
    pausable: bool,
}

impl Timer {
    /// `pausable` is false for graded sessions.
    #[must_use]
    pub fn new(pausable: bool) -> Self {
        Self {
            state: TimerState::Idle,
            epoch: 0,
            pausable,
        }
    }

    /// Start counting down `duration` from `now`. Replaces any earlier schedule.
    pub fn arm(&mut self, duration: Duration, now: DateTime<Utc>) -> TimerTicket {
        self.epoch += 1;
        let deadline = now + duration.max(Duration::zero());
        self.state = TimerState::Running { deadline };
        TimerTicket {
            epoch: self.epoch,
            deadline,
        }
    }

    /// Stop the timer. Safe to call repeatedly and in any state.
    pub fn cancel(&mut self) {
        self.epoch += 1;
        if !matches!(self.state, TimerState::Fired) {
            self.state = TimerState::Idle;
        }
    }

    /// `max(0, deadline - now)`; the frozen remainder while paused; `None` when
    /// no countdown is active.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self.state {
            TimerState::Running { deadline } => Some((deadline - now).max(Duration::zero())),
            TimerState::Paused { remaining } => Some(remaining),
            TimerState::Fired => Some(Duration::zero()),
            TimerState::Idle => None,
        }
    }

    /// # Errors
    ///
    /// Returns `TimerError::NotPausable` for graded timers and
    /// `TimerError::NotRunning` when there is nothing to pause.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<(), TimerError> {
        if !self.pausable {
            return Err(TimerError::NotPausable);
        }
        let TimerState::Running { deadline } = self.state else {
            return Err(TimerError::NotRunning);
        };
        self.epoch += 1;
        self.state = TimerState::Paused {
            remaining: (deadline - now).max(Duration::zero()),
        };
        Ok(())
    }

    /// Continue from the frozen remainder with a fresh absolute deadline.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::NotPausable` for graded timers and
    /// `TimerError::NotPaused` when the timer is not paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<TimerTicket, TimerError> {
        if !self.pausable {
            return Err(TimerError::NotPausable);
        }
        let TimerState::Paused { remaining } = self.state else {
            return Err(TimerError::NotPaused);
        };
        Ok(self.arm(remaining, now))
    }

    /// Consume a scheduled check.
    ///
    /// Returns `true` exactly once: when `epoch` is current, the timer is
    /// running and `now` has reached the deadline. Stale epochs and early
    /// checks return `false`.
    pub fn fire(&mut self, epoch: u64, now: DateTime<Utc>) -> bool {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "ignoring stale timer check");
            return false;
        }
        match self.state {
            TimerState::Running { deadline } if now >= deadline => {
                self.state = TimerState::Fired;
                true
            }
            _ => false,
        }
    }

    /// Ticket for the active schedule, if the timer is running.
    #[must_use]
    pub fn ticket(&self) -> Option<TimerTicket> {
        match self.state {
            TimerState::Running { deadline } => Some(TimerTicket {
                epoch: self.epoch,
                deadline,
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self.state, TimerState::Paused { .. })
    }

    #[must_use]
    pub fn has_fired(&self) -> bool {
        matches!(self.state, TimerState::Fired)
    }

    #[must_use]
    pub fn is_pausable(&self) -> bool {
        self.pausable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn never_fires_before_deadline() {
        let mut timer = Timer::new(false);
        let now = fixed_now();
        let ticket = timer.arm(Duration::seconds(60), now);

        assert!(!timer.fire(ticket.epoch, now + Duration::seconds(59)));
        assert_eq!(
            timer.remaining(now + Duration::seconds(59)),
            Some(Duration::seconds(1))
        );
        assert!(timer.fire(ticket.epoch, now + Duration::seconds(60)));
    }

    #[test]
    fn fires_exactly_once() {
        let mut timer = Timer::new(false);
        let now = fixed_now();
        let ticket = timer.arm(Duration::seconds(5), now);
        let late = now + Duration::seconds(30);

        assert!(timer.fire(ticket.epoch, late));
        assert!(!timer.fire(ticket.epoch, late));
        assert!(timer.has_fired());
        assert_eq!(timer.remaining(late), Some(Duration::zero()));
    }

    #[test]
    fn cancel_invalidates_in_flight_checks() {
        let mut timer = Timer::new(false);
        let now = fixed_now();
        let ticket = timer.arm(Duration::seconds(5), now);
        timer.cancel();
        timer.cancel();

        assert!(!timer.fire(ticket.epoch, now + Duration::seconds(10)));
        assert!(timer.remaining(now).is_none());
    }

    #[test]
    fn rearm_makes_old_ticket_stale() {
        let mut timer = Timer::new(false);
        let now = fixed_now();
        let old = timer.arm(Duration::seconds(5), now);
        let new = timer.arm(Duration::seconds(50), now);

        assert!(!timer.fire(old.epoch, now + Duration::seconds(6)));
        assert!(!timer.fire(new.epoch, now + Duration::seconds(6)));
        assert!(timer.fire(new.epoch, now + Duration::seconds(50)));
    }

    #[test]
    fn remaining_is_recomputed_from_deadline() {
        let mut timer = Timer::new(false);
        let now = fixed_now();
        timer.arm(Duration::seconds(60), now);
        assert_eq!(
            timer.remaining(now + Duration::seconds(45)),
            Some(Duration::seconds(15))
        );
        assert_eq!(
            timer.remaining(now + Duration::seconds(600)),
            Some(Duration::zero())
        );
    }

    #[test]
    fn graded_timer_cannot_pause() {
        let mut timer = Timer::new(false);
        timer.arm(Duration::seconds(60), fixed_now());
        assert_eq!(timer.pause(fixed_now()), Err(TimerError::NotPausable));
        assert!(timer.is_running());
    }

    #[test]
    fn practice_timer_pauses_and_resumes() {
        let mut timer = Timer::new(true);
        let now = fixed_now();
        let first = timer.arm(Duration::seconds(60), now);

        timer.pause(now + Duration::seconds(20)).unwrap();
        assert!(timer.is_paused());
        assert!(!timer.fire(first.epoch, now + Duration::seconds(600)));
        assert_eq!(
            timer.remaining(now + Duration::seconds(500)),
            Some(Duration::seconds(40))
        );

        let resumed_at = now + Duration::seconds(100);
        let ticket = timer.resume(resumed_at).unwrap();
        assert_eq!(ticket.deadline, resumed_at + Duration::seconds(40));
        assert!(timer.fire(ticket.epoch, ticket.deadline));
    }

    #[test]
    fn pause_and_resume_require_matching_state() {
        let mut timer = Timer::new(true);
        assert_eq!(timer.pause(fixed_now()), Err(TimerError::NotRunning));
        assert_eq!(timer.resume(fixed_now()), Err(TimerError::NotPaused));
    }
}
