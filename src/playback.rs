//! Live preview playback: `showing(i) → showing((i + 1) mod N)` every slide period.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, time::Instant};

use crate::{
    foundation::error::{SlidecastError, SlidecastResult},
    schedule::{Scheduler, TimerHandle, TimerOutcome},
};

/// What playback sees of the pause switch.
#[derive(Clone, Copy, Debug, Default)]
struct PauseState {
    holds: u32,
    /// Bumped by every hold; a timer armed under an older epoch has been interrupted.
    epoch: u64,
    /// When the last outstanding hold was released.
    resumed_at: Option<Instant>,
}

/// Shared pause control. Each outstanding [`PauseGuard`] keeps playback paused.
#[derive(Clone, Debug)]
pub struct PauseSwitch {
    state: Arc<watch::Sender<PauseState>>,
}

impl Default for PauseSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseSwitch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PauseState::default());
        Self {
            state: Arc::new(tx),
        }
    }

    /// Pause playback until the returned guard is dropped.
    ///
    /// Any transition pending when the hold is taken is discarded; after the last guard is
    /// released the next slide change is a full period away.
    pub fn hold(&self) -> PauseGuard {
        self.state.send_modify(|s| {
            s.holds += 1;
            s.epoch += 1;
        });
        tracing::debug!(holds = self.state.borrow().holds, "playback paused");
        PauseGuard {
            state: self.state.clone(),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().holds > 0
    }

    fn subscribe(&self) -> watch::Receiver<PauseState> {
        self.state.subscribe()
    }
}

#[derive(Debug)]
pub struct PauseGuard {
    state: Arc<watch::Sender<PauseState>>,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        let mut resumed = false;
        self.state.send_modify(|s| {
            s.holds = s.holds.saturating_sub(1);
            if s.holds == 0 {
                s.resumed_at = Some(Instant::now());
                resumed = true;
            }
        });
        if resumed {
            tracing::debug!("playback resumed");
        }
    }
}

enum Wake {
    Timer(TimerOutcome),
    Paused,
}

/// Cooperative slide advancer for the live preview.
///
/// Holds exactly one pending timer while showing a slide; navigation cancels and re-arms it, and
/// tearing down (or dropping) the playback cancels it.
pub struct Playback {
    count: usize,
    period: Duration,
    current: usize,
    scheduler: Scheduler,
    pause: watch::Receiver<PauseState>,
    timer: Option<TimerHandle>,
    /// Pause epoch the pending timer was armed under.
    armed_epoch: u64,
}

impl Playback {
    pub fn new(
        slide_count: usize,
        period: Duration,
        scheduler: Scheduler,
        pause: &PauseSwitch,
    ) -> SlidecastResult<Self> {
        if slide_count < 2 {
            return Err(SlidecastError::input_validation(format!(
                "playback needs at least 2 slides, got {slide_count}"
            )));
        }
        let pause = pause.subscribe();
        let armed_epoch = pause.borrow().epoch;
        let timer = Some(scheduler.after(period));
        Ok(Self {
            count: slide_count,
            period,
            current: 0,
            scheduler,
            pause,
            timer,
            armed_epoch,
        })
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn slide_count(&self) -> usize {
        self.count
    }

    pub fn is_paused(&self) -> bool {
        self.pause.borrow().holds > 0
    }

    pub fn go_to(&mut self, index: usize) -> SlidecastResult<()> {
        if index >= self.count {
            return Err(SlidecastError::validation(format!(
                "slide index {index} out of range for {} slides",
                self.count
            )));
        }
        self.show(index);
        Ok(())
    }

    pub fn next(&mut self) -> usize {
        self.show((self.current + 1) % self.count);
        self.current
    }

    pub fn previous(&mut self) -> usize {
        self.show((self.current + self.count - 1) % self.count);
        self.current
    }

    /// Wait for the pending transition, move to the next slide and return its index.
    ///
    /// While paused nothing advances. A pause, even one that ended before this call, discards
    /// the pending transition and the next one fires a full period after resume.
    pub async fn advance(&mut self) -> usize {
        loop {
            let state = *self.pause.borrow_and_update();
            if state.holds > 0 {
                if let Some(timer) = self.timer.take() {
                    timer.cancel();
                    tracing::debug!(slide = self.current, "pending slide timer cancelled by pause");
                }
                // A closed channel means no guard can be outstanding any more.
                let _ = self.pause.wait_for(|s| s.holds == 0).await;
                continue;
            }

            let interrupted = self.armed_epoch != state.epoch;
            if interrupted && let Some(timer) = self.timer.take() {
                timer.cancel();
                tracing::debug!(slide = self.current, "slide timer rescheduled after pause");
            }
            if self.timer.is_none() {
                let timer = match state.resumed_at {
                    Some(resumed) if interrupted => self.scheduler.at(resumed + self.period),
                    _ => self.scheduler.after(self.period),
                };
                self.timer = Some(timer);
                self.armed_epoch = state.epoch;
            }

            let Some(timer) = self.timer.as_ref() else {
                continue;
            };
            let pause = &mut self.pause;
            let wake = tokio::select! {
                biased;
                paused = pause.wait_for(|s| s.holds > 0) => match paused {
                    Ok(_) => Wake::Paused,
                    Err(_) => Wake::Timer(timer.wait().await),
                },
                outcome = timer.wait() => Wake::Timer(outcome),
            };

            match wake {
                Wake::Paused => continue,
                Wake::Timer(TimerOutcome::Cancelled) => {
                    self.timer = None;
                }
                Wake::Timer(TimerOutcome::Fired) => {
                    let next = (self.current + 1) % self.count;
                    self.show(next);
                    return next;
                }
            }
        }
    }

    /// Release the pending timer and stop playback.
    pub fn teardown(self) {
        tracing::debug!(slide = self.current, "playback torn down");
    }

    fn show(&mut self, index: usize) {
        if let Some(old) = self.timer.take() {
            old.cancel();
        }
        self.current = index;
        self.timer = Some(self.scheduler.after(self.period));
        self.armed_epoch = self.pause.borrow().epoch;
        tracing::debug!(slide = index, "showing slide");
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }
}
