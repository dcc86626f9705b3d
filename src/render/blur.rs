use crate::foundation::error::{SlidecastError, SlidecastResult};

/// Gaussian blur for a black drop shadow, run on the coverage mask only.
///
/// A black shadow in premultiplied RGBA is `[0, 0, 0, a]`, so blurring alpha is enough.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowBlur {
    radius: usize,
    /// `2 * radius + 1` normalized taps.
    taps: Vec<f32>,
}

impl ShadowBlur {
    /// Map a canvas-style `shadowBlur` amount to a kernel: sigma is half the amount and the
    /// kernel reaches three sigmas.
    pub fn from_canvas_blur(blur_px: f32) -> SlidecastResult<Self> {
        if !blur_px.is_finite() {
            return Err(SlidecastError::validation("shadow blur must be finite"));
        }
        let sigma = blur_px.max(0.0) / 2.0;
        if sigma == 0.0 {
            return Ok(Self {
                radius: 0,
                taps: vec![1.0],
            });
        }
        let radius = (sigma * 3.0).ceil() as usize;
        let two_sigma_sq = 2.0 * sigma * sigma;
        let raw = (0..=2 * radius)
            .map(|i| {
                let d = i as f32 - radius as f32;
                (-d * d / two_sigma_sq).exp()
            })
            .collect::<Vec<_>>();
        let sum: f32 = raw.iter().sum();
        Ok(Self {
            radius,
            taps: raw.into_iter().map(|w| w / sum).collect(),
        })
    }

    /// Rows of transparent padding the shadow needs around its source.
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Blur a `width * height` alpha mask, clamping samples at the edges.
    pub fn apply(&self, mask: &[u8], width: usize, height: usize) -> SlidecastResult<Vec<u8>> {
        if mask.len() != width * height {
            return Err(SlidecastError::validation(format!(
                "shadow mask is {} bytes, expected {width}x{height}",
                mask.len()
            )));
        }
        if self.radius == 0 || mask.is_empty() {
            return Ok(mask.to_vec());
        }

        let src = mask.iter().map(|&a| f32::from(a)).collect::<Vec<_>>();
        let mut rows = vec![0.0f32; src.len()];
        for y in 0..height {
            let line = y * width;
            self.convolve(&src, &mut rows, width, |i| line + i);
        }
        let mut cols = vec![0.0f32; src.len()];
        for x in 0..width {
            self.convolve(&rows, &mut cols, height, |i| i * width + x);
        }
        Ok(cols
            .into_iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect())
    }

    /// One 1-D pass over a line of `len` samples addressed through `at`.
    fn convolve(&self, src: &[f32], dst: &mut [f32], len: usize, at: impl Fn(usize) -> usize) {
        let last = len - 1;
        for i in 0..len {
            let acc = self
                .taps
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let j = (i + k).saturating_sub(self.radius).min(last);
                    w * src[at(j)]
                })
                .sum::<f32>();
            dst[at(i)] = acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_blur_is_identity() {
        let blur = ShadowBlur::from_canvas_blur(0.0).unwrap();
        assert_eq!(blur.radius(), 0);
        assert_eq!(blur.apply(&[1, 2, 3, 4], 2, 2).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn flat_mask_stays_flat() {
        let blur = ShadowBlur::from_canvas_blur(6.0).unwrap();
        let mask = vec![90u8; 7 * 5];
        assert_eq!(blur.apply(&mask, 7, 5).unwrap(), mask);
    }

    #[test]
    fn single_dot_spreads_and_keeps_its_mass() {
        let blur = ShadowBlur::from_canvas_blur(2.4).unwrap();
        let mut mask = vec![0u8; 9 * 9];
        mask[4 * 9 + 4] = 255;
        let out = blur.apply(&mask, 9, 9).unwrap();
        assert!(out.iter().filter(|&&a| a > 0).count() > 1);
        assert!(out[4 * 9 + 4] < 255);
        let mass: i32 = out.iter().map(|&a| i32::from(a)).sum();
        assert!((mass - 255).abs() <= 12, "{mass}");
    }

    #[test]
    fn canvas_blur_eight_reaches_twelve_pixels() {
        let blur = ShadowBlur::from_canvas_blur(8.0).unwrap();
        assert_eq!(blur.radius(), 12);
        assert!(blur.apply(&[0; 3], 2, 2).is_err());
        assert!(ShadowBlur::from_canvas_blur(f32::NAN).is_err());
    }
}
