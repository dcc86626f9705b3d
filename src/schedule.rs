//! Cancellable one-shot timers on top of tokio time.
//!
//! Both live playback and the export hold phase wait through [`Scheduler::after`], so a paused
//! tokio clock (`start_paused = true`) drives them deterministically in tests.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How a [`TimerHandle`] wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerOutcome {
    Fired,
    Cancelled,
}

#[derive(Clone, Debug, Default)]
pub struct Scheduler {
    _private: (),
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Instant {
        Instant::now()
    }

    /// Arm a timer that fires `duration` from now.
    pub fn after(&self, duration: Duration) -> TimerHandle {
        TimerHandle {
            deadline: self.now() + duration,
            token: CancellationToken::new(),
        }
    }

    /// Arm a timer that fires at an absolute `deadline`; a past deadline fires immediately.
    pub fn at(&self, deadline: Instant) -> TimerHandle {
        TimerHandle {
            deadline,
            token: CancellationToken::new(),
        }
    }

    /// Arm a timer that also cancels when `parent` is cancelled.
    pub fn after_with(&self, duration: Duration, parent: &CancellationToken) -> TimerHandle {
        TimerHandle {
            deadline: self.now() + duration,
            token: parent.child_token(),
        }
    }
}

/// A pending one-shot timer. Dropping the handle cancels it.
#[derive(Debug)]
pub struct TimerHandle {
    deadline: Instant,
    token: CancellationToken,
}

impl TimerHandle {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the deadline passes or the timer is cancelled.
    ///
    /// Waiting again after the timer fired returns `Fired` immediately.
    pub async fn wait(&self) -> TimerOutcome {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => TimerOutcome::Cancelled,
            _ = tokio::time::sleep_until(self.deadline) => TimerOutcome::Fired,
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_virtual_duration() {
        let sched = Scheduler::new();
        let start = sched.now();
        let t = sched.after(Duration::from_millis(5000));
        assert_eq!(t.wait().await, TimerOutcome::Fired);
        assert_eq!(start.elapsed(), Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_resolves_without_waiting() {
        let sched = Scheduler::new();
        let start = sched.now();
        let t = sched.after(Duration::from_secs(60));
        t.cancel();
        assert_eq!(t.wait().await, TimerOutcome::Cancelled);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_wait_wins() {
        let sched = Scheduler::new();
        let t = sched.after(Duration::from_secs(10));
        let canceller = async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            t.cancel();
        };
        let (outcome, ()) = tokio::join!(t.wait(), canceller);
        assert_eq!(outcome, TimerOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_token_cancels_child_timer() {
        let sched = Scheduler::new();
        let parent = CancellationToken::new();
        let t = sched.after_with(Duration::from_secs(10), &parent);
        parent.cancel();
        assert_eq!(t.wait().await, TimerOutcome::Cancelled);
    }
}
