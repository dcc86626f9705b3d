use std::sync::Arc;

use crate::{
    foundation::{
        core::Canvas,
        error::{SlidecastError, SlidecastResult},
    },
    render::FrameRGBA,
};

/// The single fixed-size drawing surface frames are composed on.
///
/// Shared between the live preview and the export pipeline through [`SharedSurface`]; the
/// export pipeline holds the lock for its whole run.
pub struct Surface {
    canvas: Canvas,
    width_u16: u16,
    height_u16: u16,
    pixmap: vello_cpu::Pixmap,
    ctx: vello_cpu::RenderContext,
}

pub type SharedSurface = Arc<tokio::sync::Mutex<Surface>>;

impl Surface {
    pub fn new(canvas: Canvas) -> SlidecastResult<Self> {
        canvas.validate()?;
        let width_u16: u16 = canvas
            .width
            .try_into()
            .map_err(|_| SlidecastError::validation("surface width exceeds u16"))?;
        let height_u16: u16 = canvas
            .height
            .try_into()
            .map_err(|_| SlidecastError::validation("surface height exceeds u16"))?;
        Ok(Self {
            canvas,
            width_u16,
            height_u16,
            pixmap: vello_cpu::Pixmap::new(width_u16, height_u16),
            ctx: vello_cpu::RenderContext::new(width_u16, height_u16),
        })
    }

    pub fn shared(canvas: Canvas) -> SlidecastResult<SharedSurface> {
        Ok(Arc::new(tokio::sync::Mutex::new(Self::new(canvas)?)))
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Fill every pixel with a premultiplied color.
    pub fn clear(&mut self, premul_rgba: [u8; 4]) {
        for px in self.pixmap.data_as_u8_slice_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&premul_rgba);
        }
    }

    /// Record vector drawing into the surface's render context and rasterize it.
    pub(crate) fn draw(&mut self, f: impl FnOnce(&mut vello_cpu::RenderContext)) {
        self.ctx.reset();
        f(&mut self.ctx);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut self.pixmap);
    }

    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data_as_u8_slice()
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.pixmap.data_as_u8_slice_mut()
    }

    /// Copy the current pixels out as a frame.
    pub fn read_frame(&self) -> FrameRGBA {
        FrameRGBA {
            width: u32::from(self.width_u16),
            height: u32::from(self.height_u16),
            data: self.pixels().to_vec(),
            premultiplied: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_then_read_back() {
        let mut s = Surface::new(Canvas::new(4, 2).unwrap()).unwrap();
        s.clear([1, 2, 3, 255]);
        let f = s.read_frame();
        assert_eq!((f.width, f.height), (4, 2));
        assert_eq!(f.data.len(), 4 * 2 * 4);
        assert!(f.data.chunks_exact(4).all(|px| px == [1, 2, 3, 255]));
    }

    #[test]
    fn zero_sized_surface_is_rejected() {
        assert!(Surface::new(Canvas { width: 0, height: 4 }).is_err());
    }
}
