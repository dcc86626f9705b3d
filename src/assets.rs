pub mod decode;

use std::sync::Arc;

/// A fully decoded image, ready to be drawn.
#[derive(Clone, Debug)]
pub struct SlideImage {
    pub width: u32,
    pub height: u32,
    /// Premultiplied RGBA8, row-major, tightly packed.
    pub rgba8_premul: Arc<Vec<u8>>,
}

pub use decode::{decode_image, decode_input};
