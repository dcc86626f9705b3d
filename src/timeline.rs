//! Per-theme animation curves and the per-slide frame schedule derived from them.
//!
//! A slide is on screen for [`SLIDE_DURATION_MS`]. The first `animation_duration_ms` of that
//! budget animate from progress 0 to 1; the rest is the static hold phase, which keeps
//! `params_at(1.0)` on screen.

use crate::{
    foundation::core::{Fps, SLIDE_DURATION_MS},
    model::Theme,
};

/// Visual parameters of one animation step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThemeParams {
    /// Image opacity in `[0, 1]`.
    pub opacity: f32,
    /// Uniform image scale around the image's own center.
    pub scale: f32,
    /// Downward title offset in pixels.
    pub text_offset_y: f32,
}

impl ThemeParams {
    pub const IDENTITY: ThemeParams = ThemeParams {
        opacity: 1.0,
        scale: 1.0,
        text_offset_y: 0.0,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThemeTimeline {
    pub theme: Theme,
    pub total_duration_ms: u64,
    pub animation_duration_ms: u64,
}

impl ThemeTimeline {
    pub fn for_theme(theme: Theme) -> Self {
        let animation_duration_ms = match theme {
            Theme::Calm => 1500,
            Theme::Energetic => 800,
            Theme::Professional => 1000,
        };
        Self {
            theme,
            total_duration_ms: SLIDE_DURATION_MS,
            animation_duration_ms,
        }
    }

    /// Longest entrance animation of any theme; a slide must stay on screen at least this long.
    pub fn longest_animation_ms() -> u64 {
        Theme::ALL
            .iter()
            .map(|&theme| Self::for_theme(theme).animation_duration_ms)
            .max()
            .unwrap_or_default()
    }

    /// Sample the curve; `progress` is clamped into `[0, 1]`.
    pub fn params_at(&self, progress: f64) -> ThemeParams {
        let p = if progress.is_finite() {
            progress.clamp(0.0, 1.0) as f32
        } else {
            1.0
        };
        match self.theme {
            Theme::Calm => ThemeParams {
                opacity: (p * 1.5).min(1.0),
                scale: 1.0,
                text_offset_y: 0.0,
            },
            Theme::Energetic => ThemeParams {
                opacity: (p * 2.0).min(1.0),
                scale: 1.0 - 0.05 * (1.0 - p),
                text_offset_y: 0.0,
            },
            Theme::Professional => ThemeParams {
                opacity: (p * 2.0).min(1.0),
                scale: 1.0,
                text_offset_y: 30.0 * (1.0 - p),
            },
        }
    }

    pub fn hold_duration_ms(&self) -> u64 {
        self.total_duration_ms
            .saturating_sub(self.animation_duration_ms)
    }

    /// Number of animation intervals, `round(animation / frame_interval)`.
    pub fn animation_frames(&self, fps: Fps) -> u64 {
        ((self.animation_duration_ms as f64) / fps.frame_interval_ms()).round() as u64
    }
}

impl From<Theme> for ThemeTimeline {
    fn from(theme: Theme) -> Self {
        Self::for_theme(theme)
    }
}

/// One composed frame of a slide's animation phase.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameStep {
    pub index: u64,
    pub progress: f64,
    /// Start time relative to the slide start.
    pub start_ms: u64,
    pub duration_ms: u64,
}

/// The static hold that follows the last animation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HoldStep {
    pub start_ms: u64,
    pub duration_ms: u64,
}

/// Millisecond schedule for one slide.
///
/// Step `k` starts at `round(k * 1000 / fps)`; steps are `0..=animation_frames`, and the
/// hold runs from the end of the last step to `total_duration_ms`. Durations therefore always
/// sum to exactly `total_duration_ms`.
#[derive(Clone, Debug, PartialEq)]
pub struct SlidePlan {
    pub steps: Vec<FrameStep>,
    pub hold: Option<HoldStep>,
    pub total_ms: u64,
}

impl SlidePlan {
    pub fn new(timeline: &ThemeTimeline, fps: Fps) -> Self {
        let total_ms = timeline.total_duration_ms;
        let n = timeline.animation_frames(fps);

        let steps = (0..=n)
            .map(|k| {
                let start_ms = fps.frame_start_ms(k).min(total_ms);
                let end_ms = fps.frame_start_ms(k + 1).min(total_ms);
                FrameStep {
                    index: k,
                    progress: if n == 0 { 1.0 } else { k as f64 / n as f64 },
                    start_ms,
                    duration_ms: end_ms - start_ms,
                }
            })
            .collect::<Vec<_>>();

        let hold_start = fps.frame_start_ms(n + 1).min(total_ms);
        let hold = (hold_start < total_ms).then(|| HoldStep {
            start_ms: hold_start,
            duration_ms: total_ms - hold_start,
        });

        Self {
            steps,
            hold,
            total_ms,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.steps.len()
    }

    pub fn scheduled_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.duration_ms).sum::<u64>()
            + self.hold.map(|h| h.duration_ms).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fps30() -> Fps {
        Fps::new(30).unwrap()
    }

    #[test]
    fn table_values_at_endpoints() {
        let calm = ThemeTimeline::for_theme(Theme::Calm);
        assert_eq!(calm.animation_duration_ms, 1500);
        assert_eq!(calm.params_at(0.0).opacity, 0.0);
        assert_eq!(calm.params_at(1.0), ThemeParams::IDENTITY);

        let energetic = ThemeTimeline::for_theme(Theme::Energetic);
        assert_eq!(energetic.animation_duration_ms, 800);
        assert!((energetic.params_at(0.0).scale - 0.95).abs() < 1e-6);
        assert_eq!(energetic.params_at(1.0), ThemeParams::IDENTITY);

        let pro = ThemeTimeline::for_theme(Theme::Professional);
        assert_eq!(pro.animation_duration_ms, 1000);
        assert_eq!(ThemeTimeline::longest_animation_ms(), 1500);
        assert_eq!(pro.params_at(0.0).text_offset_y, 30.0);
        assert_eq!(pro.params_at(1.0), ThemeParams::IDENTITY);
    }

    #[test]
    fn opacity_is_monotonic_for_every_theme() {
        for theme in Theme::ALL {
            let tl = ThemeTimeline::for_theme(theme);
            let mut prev = tl.params_at(0.0).opacity;
            for i in 1..=200 {
                let o = tl.params_at(i as f64 / 200.0).opacity;
                assert!(o >= prev, "{theme}: opacity decreased at step {i}");
                prev = o;
            }
        }
    }

    #[test]
    fn animation_fits_inside_slide_budget() {
        for theme in Theme::ALL {
            let tl = ThemeTimeline::for_theme(theme);
            assert_eq!(tl.total_duration_ms, 5000);
            assert!(tl.animation_duration_ms <= tl.total_duration_ms);
        }
    }

    #[test]
    fn progress_outside_unit_interval_is_clamped() {
        let tl = ThemeTimeline::for_theme(Theme::Professional);
        assert_eq!(tl.params_at(-3.0), tl.params_at(0.0));
        assert_eq!(tl.params_at(7.0), tl.params_at(1.0));
        assert_eq!(tl.params_at(f64::NAN), tl.params_at(1.0));
    }

    #[test]
    fn energetic_plan_has_24_intervals_and_sums_to_budget() {
        let plan = SlidePlan::new(&ThemeTimeline::for_theme(Theme::Energetic), fps30());
        assert_eq!(plan.frame_count(), 25);
        assert_eq!(plan.steps[0].progress, 0.0);
        assert_eq!(plan.steps[24].progress, 1.0);
        assert_eq!(plan.steps[24].start_ms, 800);
        let hold = plan.hold.unwrap();
        assert_eq!(hold.start_ms, 833);
        assert_eq!(hold.duration_ms, 4167);
        assert_eq!(plan.scheduled_ms(), 5000);
    }

    #[test]
    fn every_theme_plan_sums_to_exactly_five_seconds() {
        for theme in Theme::ALL {
            let tl = ThemeTimeline::for_theme(theme);
            let plan = SlidePlan::new(&tl, fps30());
            assert_eq!(plan.scheduled_ms(), 5000, "{theme}");
            assert_eq!(plan.frame_count() as u64, tl.animation_frames(fps30()) + 1);
        }
    }

    #[test]
    fn zero_length_animation_is_a_single_full_progress_step() {
        let tl = ThemeTimeline {
            theme: Theme::Calm,
            total_duration_ms: 5000,
            animation_duration_ms: 0,
        };
        let plan = SlidePlan::new(&tl, fps30());
        assert_eq!(plan.frame_count(), 1);
        assert_eq!(plan.steps[0].progress, 1.0);
        assert_eq!(plan.scheduled_ms(), 5000);
    }
}
