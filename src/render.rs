pub mod blend;
pub mod blur;
pub mod compositor;
pub mod surface;
pub mod text;

/// A rendered frame as RGBA8 pixels.
///
/// Frames leaving the compositor are fully opaque, so premultiplied and straight alpha agree;
/// the flag is kept explicit at the encoder boundary anyway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

impl FrameRGBA {
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }
}

pub use compositor::{Compositor, CompositorStyle, fit_contain, scale_about_center};
pub use surface::{SharedSurface, Surface};
pub use text::{FONT_ENV, TitleFont};
