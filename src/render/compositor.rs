//! Frame compositor: background, contain-fitted image, legibility gradient and title.
//!
//! Composition is a pure function of `(image, params, title)`; the only state kept between
//! calls is caching of derived layers that depend on nothing but the canvas and the title.

use std::sync::Arc;

use crate::{
    assets::SlideImage,
    foundation::{
        core::{Canvas, Rect},
        math::{mul_div255_u8, unit_to_u8},
    },
    render::{
        blend,
        surface::Surface,
        text::{TextLayoutEngine, TitleFont, TitleGeometry, TitleLayer, rasterize_title},
    },
    timeline::ThemeParams,
};

/// Proportional layout rule for the overlay, shared by still and video export.
///
/// At 1280×720 this is a 37px title, 40px margins, a 150px gradient panel and an 8px shadow.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompositorStyle {
    /// Opaque straight-alpha background color.
    pub background: [u8; 3],
    /// Panel opacity at the bottom edge.
    pub gradient_alpha: f32,
}

impl Default for CompositorStyle {
    fn default() -> Self {
        Self {
            background: [0, 0, 0],
            gradient_alpha: 0.8,
        }
    }
}

impl CompositorStyle {
    pub fn font_size_px(canvas: Canvas) -> f32 {
        (canvas.width as f32 / 35.0).round().max(1.0)
    }

    pub fn margin_px(canvas: Canvas) -> f32 {
        (canvas.width as f32 / 32.0).round()
    }

    pub fn gradient_height_px(canvas: Canvas) -> u32 {
        ((canvas.height as f32) * 150.0 / 720.0).round() as u32
    }

    pub fn shadow_blur_px(canvas: Canvas) -> f32 {
        (canvas.width as f32 / 160.0).round()
    }
}

/// Largest rectangle with the image's aspect ratio that fits inside `canvas`, centered.
pub fn fit_contain(image_width: u32, image_height: u32, canvas: Canvas) -> Rect {
    let (cw, ch) = (f64::from(canvas.width), f64::from(canvas.height));
    let image_aspect = f64::from(image_width) / f64::from(image_height);
    let (w, h) = if image_aspect > canvas.aspect() {
        (cw, cw / image_aspect)
    } else {
        (ch * image_aspect, ch)
    };
    Rect::from_origin_size(((cw - w) / 2.0, (ch - h) / 2.0), (w, h))
}

/// Uniformly scale `rect` about its own center.
pub fn scale_about_center(rect: Rect, scale: f64) -> Rect {
    let c = rect.center();
    let (w, h) = (rect.width() * scale, rect.height() * scale);
    Rect::from_center_size(c, (w, h))
}

pub struct Compositor {
    style: CompositorStyle,
    font: Option<TitleFont>,
    text_engine: TextLayoutEngine,
    image_paint: Option<(Arc<Vec<u8>>, vello_cpu::Image)>,
    gradient: Option<(Canvas, Vec<u8>)>,
    title: Option<(Canvas, String, Option<TitleLayer>)>,
}

impl Compositor {
    pub fn new(font: Option<TitleFont>) -> Self {
        Self::with_style(font, CompositorStyle::default())
    }

    pub fn with_style(font: Option<TitleFont>, style: CompositorStyle) -> Self {
        if font.is_none() {
            tracing::warn!("no title font available; frames will be composed without a title");
        }
        Self {
            style,
            font,
            text_engine: TextLayoutEngine::new(),
            image_paint: None,
            gradient: None,
            title: None,
        }
    }

    pub fn style(&self) -> CompositorStyle {
        self.style
    }

    /// Draw one fully composed frame onto `surface`.
    pub fn compose(
        &mut self,
        surface: &mut Surface,
        image: &SlideImage,
        params: ThemeParams,
        title: &str,
    ) {
        let canvas = surface.canvas();
        let [r, g, b] = self.style.background;
        surface.clear([r, g, b, 255]);

        let dest = scale_about_center(
            fit_contain(image.width, image.height, canvas),
            f64::from(params.scale.max(0.0)),
        );
        let paint = self.image_paint_for(image);
        let opacity = params.opacity.clamp(0.0, 1.0);
        if opacity > 0.0 && dest.width() > 0.0 && dest.height() > 0.0 {
            let transform = vello_cpu::kurbo::Affine::translate((dest.x0, dest.y0))
                * vello_cpu::kurbo::Affine::scale_non_uniform(
                    dest.width() / f64::from(image.width),
                    dest.height() / f64::from(image.height),
                );
            let bg = vello_cpu::peniko::Color::from_rgba8(r, g, b, 255);
            let (cw, ch) = (f64::from(canvas.width), f64::from(canvas.height));
            surface.draw(|ctx| {
                ctx.set_paint(bg);
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, cw, ch));

                ctx.set_transform(transform);
                ctx.set_paint(paint);
                if opacity < 1.0 {
                    ctx.push_opacity_layer(opacity);
                }
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    0.0,
                    0.0,
                    f64::from(image.width),
                    f64::from(image.height),
                ));
                if opacity < 1.0 {
                    ctx.pop_layer();
                }
            });
        }

        let gradient_top = canvas.height - CompositorStyle::gradient_height_px(canvas);
        let gradient = self.gradient_for(canvas);
        blend::over_rows(
            surface.pixels_mut(),
            canvas.width,
            canvas.height,
            gradient,
            i64::from(gradient_top),
        );

        if let Some(layer) = self.title_for(canvas, title) {
            layer.blend_onto(
                surface.pixels_mut(),
                canvas.width,
                canvas.height,
                params.text_offset_y,
            );
        }
    }

    fn image_paint_for(&mut self, image: &SlideImage) -> vello_cpu::Image {
        if let Some((bytes, paint)) = &self.image_paint
            && Arc::ptr_eq(bytes, &image.rgba8_premul)
        {
            return paint.clone();
        }

        let pixels = image
            .rgba8_premul
            .chunks_exact(4)
            .map(|px| vello_cpu::peniko::color::PremulRgba8 {
                r: px[0],
                g: px[1],
                b: px[2],
                a: px[3],
            })
            .collect::<Vec<_>>();
        let may_have_opacities = pixels.iter().any(|px| px.a != 255);
        // SlideImage dimensions are bounded to u16 at decode time.
        let pixmap = vello_cpu::Pixmap::from_parts_with_opacity(
            pixels,
            image.width as u16,
            image.height as u16,
            may_have_opacities,
        );
        let paint = vello_cpu::Image {
            image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
            sampler: vello_cpu::peniko::ImageSampler::default(),
        };
        self.image_paint = Some((image.rgba8_premul.clone(), paint.clone()));
        paint
    }

    fn gradient_for(&mut self, canvas: Canvas) -> &[u8] {
        let stale = !matches!(&self.gradient, Some((c, _)) if *c == canvas);
        if stale {
            let rows = build_gradient(canvas, self.style.gradient_alpha);
            self.gradient = Some((canvas, rows));
        }
        self.gradient
            .as_ref()
            .map(|(_, rows)| rows.as_slice())
            .unwrap_or_default()
    }

    fn title_for(&mut self, canvas: Canvas, title: &str) -> Option<&TitleLayer> {
        let stale = !matches!(&self.title, Some((c, t, _)) if *c == canvas && t == title);
        if stale {
            let layer = self.rasterize_title(canvas, title);
            self.title = Some((canvas, title.to_string(), layer));
        }
        self.title.as_ref().and_then(|(_, _, layer)| layer.as_ref())
    }

    fn rasterize_title(&mut self, canvas: Canvas, title: &str) -> Option<TitleLayer> {
        let font = self.font.as_ref()?;
        if title.trim().is_empty() {
            return None;
        }
        let geom = TitleGeometry {
            canvas_width: canvas.width,
            canvas_height: canvas.height,
            font_size_px: CompositorStyle::font_size_px(canvas),
            margin_px: CompositorStyle::margin_px(canvas),
            shadow_blur_px: CompositorStyle::shadow_blur_px(canvas),
        };
        match rasterize_title(&mut self.text_engine, font, title, geom) {
            Ok(layer) => Some(layer),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    font = font.source(),
                    "title rasterization failed; drawing frame without title"
                );
                None
            }
        }
    }
}

/// Bottom panel rows: black at `alpha` on the last row fading linearly to transparent.
fn build_gradient(canvas: Canvas, alpha: f32) -> Vec<u8> {
    let rows = CompositorStyle::gradient_height_px(canvas);
    let row_bytes = (canvas.width as usize) * 4;
    let mut out = vec![0u8; row_bytes * rows as usize];
    let max_a = unit_to_u8(alpha);
    let span = rows.saturating_sub(1).max(1) as f32;
    for (y, row) in out.chunks_exact_mut(row_bytes).enumerate() {
        let t = y as f32 / span;
        let a = mul_div255_u8(max_a, unit_to_u8(t));
        for px in row.chunks_exact_mut(4) {
            // Premultiplied black: color channels stay zero.
            px[3] = a;
        }
    }
    out
}
