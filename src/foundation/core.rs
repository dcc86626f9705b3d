
use crate::foundation::error::{SlidecastError, SlidecastResult};

pub use kurbo::{Affine, Rect};

/// Fixed export canvas width in pixels.
pub const EXPORT_WIDTH: u32 = 1280;
/// Fixed export canvas height in pixels.
pub const EXPORT_HEIGHT: u32 = 720;
/// Fixed export frame rate.
pub const EXPORT_FPS: u32 = 30;
/// On-screen time budget of one slide, shared by every theme.
pub const SLIDE_DURATION_MS: u64 = 5000;

/// Pixel dimensions of a drawing surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    /// The one export resolution the engine targets.
    pub const EXPORT: Canvas = Canvas {
        width: EXPORT_WIDTH,
        height: EXPORT_HEIGHT,
    };

    pub fn new(width: u32, height: u32) -> SlidecastResult<Self> {
        let canvas = Self { width, height };
        canvas.validate()?;
        Ok(canvas)
    }

    pub fn validate(self) -> SlidecastResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SlidecastError::validation(
                "canvas width/height must be non-zero",
            ));
        }
        // Surfaces are backed by vello_cpu pixmaps, which address pixels with u16.
        if self.width > u32::from(u16::MAX) || self.height > u32::from(u16::MAX) {
            return Err(SlidecastError::validation("canvas width/height exceeds u16"));
        }
        Ok(())
    }

    pub fn aspect(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    pub fn byte_len(self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::EXPORT
    }
}

/// Integer frames-per-second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps(u32);

impl Fps {
    pub fn new(fps: u32) -> SlidecastResult<Self> {
        if fps == 0 {
            return Err(SlidecastError::validation("fps must be non-zero"));
        }
        Ok(Self(fps))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Nominal frame interval in (fractional) milliseconds.
    pub fn frame_interval_ms(self) -> f64 {
        1000.0 / f64::from(self.0)
    }

    /// Start time of frame `k`, rounded to whole milliseconds.
    pub fn frame_start_ms(self, k: u64) -> u64 {
        ((k as f64) * self.frame_interval_ms()).round() as u64
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self(EXPORT_FPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_rejects_degenerate_sizes() {
        assert!(Canvas::new(0, 10).is_err());
        assert!(Canvas::new(10, 0).is_err());
        assert!(Canvas::new(70_000, 10).is_err());
        assert_eq!(Canvas::new(1280, 720).unwrap(), Canvas::EXPORT);
    }

    #[test]
    fn fps_frame_starts_round_to_ms() {
        let fps = Fps::new(30).unwrap();
        assert_eq!(fps.frame_start_ms(0), 0);
        assert_eq!(fps.frame_start_ms(1), 33);
        assert_eq!(fps.frame_start_ms(2), 67);
        assert_eq!(fps.frame_start_ms(30), 1000);
        assert!(Fps::new(0).is_err());
    }
}
