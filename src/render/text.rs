use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, OnceLock},
};

use anyhow::Context as _;
use usvg::fontdb;

use crate::{
    foundation::error::{SlidecastError, SlidecastResult},
    render::{blend, blur},
};

/// Environment override for the title font file, read by the CLI's `--font`.
pub const FONT_ENV: &str = "SLIDECAST_FONT";

/// Extra faces borrowed for characters the primary face cannot draw.
const MAX_FALLBACK_FACES: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// RGBA8 brush color used by Parley text layout.
pub(crate) struct TextBrushRgba8 {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

/// One face out of a font file (collections carry several).
#[derive(Clone)]
pub(crate) struct FontFace {
    data: Arc<Vec<u8>>,
    index: u32,
    source: String,
}

impl FontFace {
    pub(crate) fn new(data: Vec<u8>, index: u32, source: impl Into<String>) -> Self {
        Self {
            data: Arc::new(data),
            index,
            source: source.into(),
        }
    }

    fn covers(&self, ch: char) -> bool {
        parley::swash::FontRef::from_index(&self.data, self.index as usize)
            .is_some_and(|font| font.charmap().map(ch) != 0)
    }
}

/// Bold sans-serif used for the title overlay, plus the installed fonts it falls back to
/// for scripts it does not cover.
#[derive(Clone)]
pub struct TitleFont {
    primary: FontFace,
    fallback: Option<Arc<fontdb::Database>>,
}

impl std::fmt::Debug for TitleFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TitleFont")
            .field("source", &self.primary.source)
            .field("bytes", &self.primary.data.len())
            .field("fallback", &self.fallback.as_ref().map(|db| db.len()))
            .finish()
    }
}

/// Installed fonts, scanned once per process.
fn system_fonts() -> Arc<fontdb::Database> {
    static DB: OnceLock<Arc<fontdb::Database>> = OnceLock::new();
    DB.get_or_init(|| {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        tracing::debug!(faces = db.len(), "loaded system fonts");
        Arc::new(db)
    })
    .clone()
}

fn face_name(face: &fontdb::FaceInfo) -> String {
    face.families
        .first()
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| face.post_script_name.clone())
}

fn load_face(db: &fontdb::Database, face: &fontdb::FaceInfo) -> Option<FontFace> {
    let name = face_name(face);
    db.with_face_data(face.id, |data, index| FontFace::new(data.to_vec(), index, name))
}

/// Closest installed match for a bold upright sans-serif.
fn query_bold_sans(db: &fontdb::Database) -> Option<fontdb::ID> {
    let families = [
        fontdb::Family::SansSerif,
        fontdb::Family::Name("DejaVu Sans"),
        fontdb::Family::Name("Liberation Sans"),
        fontdb::Family::Name("Noto Sans"),
        fontdb::Family::Name("Helvetica"),
    ];
    let query = fontdb::Query {
        families: &families,
        weight: fontdb::Weight::BOLD,
        stretch: fontdb::Stretch::Normal,
        style: fontdb::Style::Normal,
    };
    db.query(&query)
}

/// The installed face covering the most of `missing`, preferring upright faces near bold.
fn best_fallback(db: &fontdb::Database, missing: &[char]) -> Option<FontFace> {
    let mut best: Option<(usize, u16, fontdb::ID)> = None;
    for face in db.faces() {
        let covered = db
            .with_face_data(face.id, |data, index| {
                let Some(font) = parley::swash::FontRef::from_index(data, index as usize) else {
                    return 0;
                };
                let charmap = font.charmap();
                missing.iter().filter(|&&c| charmap.map(c) != 0).count()
            })
            .unwrap_or(0);
        if covered == 0 {
            continue;
        }
        let mut distance = face.weight.0.abs_diff(fontdb::Weight::BOLD.0);
        if face.style != fontdb::Style::Normal {
            distance += 1000;
        }
        let better = match best {
            None => true,
            Some((n, d, _)) => covered > n || (covered == n && distance < d),
        };
        if better {
            best = Some((covered, distance, face.id));
        }
    }
    let (_, _, id) = best?;
    load_face(db, db.face(id)?)
}

impl TitleFont {
    /// A single face with no fallback; glyphs it lacks render as `.notdef`.
    pub fn from_bytes(bytes: Vec<u8>, source: impl Into<String>) -> Self {
        Self {
            primary: FontFace::new(bytes, 0, source),
            fallback: None,
        }
    }

    pub fn from_path(path: &Path) -> SlidecastResult<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font '{}'", path.display()))?;
        Ok(Self::from_bytes(bytes, path.display().to_string()))
    }

    /// Borrow glyphs from installed fonts for characters this face lacks.
    pub fn with_system_fallback(mut self) -> Self {
        self.fallback = Some(system_fonts());
        self
    }

    /// The installed bold sans-serif, falling back to any installed face.
    pub fn discover() -> Option<Self> {
        let db = system_fonts();
        let id = query_bold_sans(&db).or_else(|| db.faces().next().map(|f| f.id))?;
        let primary = load_face(&db, db.face(id)?)?;
        tracing::debug!(font = %primary.source, "discovered title font");
        Some(Self {
            primary,
            fallback: Some(db),
        })
    }

    /// An explicit path must load; otherwise fall back to discovery.
    pub fn resolve(explicit: Option<&Path>) -> SlidecastResult<Option<Self>> {
        match explicit {
            Some(path) => Ok(Some(Self::from_path(path)?.with_system_fallback())),
            None => Ok(Self::discover()),
        }
    }

    pub fn source(&self) -> &str {
        &self.primary.source
    }

    /// The primary face followed by whatever fallback faces `text` needs.
    pub(crate) fn faces_for(&self, text: &str) -> Vec<FontFace> {
        let mut faces = vec![self.primary.clone()];
        let Some(db) = &self.fallback else {
            return faces;
        };
        let mut missing = text
            .chars()
            .filter(|c| !c.is_whitespace() && !c.is_control())
            .filter(|&c| !self.primary.covers(c))
            .collect::<Vec<_>>();
        missing.sort_unstable();
        missing.dedup();

        while !missing.is_empty() && faces.len() <= MAX_FALLBACK_FACES {
            let Some(face) = best_fallback(db, &missing) else {
                break;
            };
            tracing::debug!(font = %face.source, "title falls back to installed font");
            missing.retain(|&c| !face.covers(c));
            faces.push(face);
        }
        if !missing.is_empty() {
            tracing::warn!(
                missing = %missing.iter().collect::<String>(),
                "no installed font covers these title characters"
            );
        }
        faces
    }
}

/// Stateful helper for building Parley text layouts from raw font bytes.
pub(crate) struct TextLayoutEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrushRgba8>,
    /// Family names of faces already registered, keyed by source and face index.
    families: HashMap<(String, u32), String>,
}

impl TextLayoutEngine {
    pub(crate) fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            families: HashMap::new(),
        }
    }

    fn family_for(&mut self, face: &FontFace) -> SlidecastResult<String> {
        let key = (face.source.clone(), face.index);
        if let Some(name) = self.families.get(&key) {
            return Ok(name.clone());
        }
        let registered = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(face.data.to_vec()), None);
        let family_id = registered
            .iter()
            .find(|(_, fonts)| fonts.iter().any(|f| f.index() == face.index))
            .or_else(|| registered.first())
            .map(|(id, _)| *id)
            .ok_or_else(|| {
                SlidecastError::validation(format!("no font families in '{}'", face.source))
            })?;
        let name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| SlidecastError::validation("registered font family has no name"))?
            .to_string();
        self.families.insert(key, name.clone());
        Ok(name)
    }

    /// Shape and lay out a single unwrapped bold line; each cluster takes the first face in
    /// `faces` that covers it.
    pub(crate) fn layout_line(
        &mut self,
        text: &str,
        faces: &[FontFace],
        size_px: f32,
        brush: TextBrushRgba8,
    ) -> SlidecastResult<parley::Layout<TextBrushRgba8>> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(SlidecastError::validation(
                "text size_px must be finite and > 0",
            ));
        }
        if faces.is_empty() {
            return Err(SlidecastError::validation("no font faces to lay out text"));
        }

        let mut stack = Vec::with_capacity(faces.len());
        for face in faces {
            let name = self.family_for(face)?;
            stack.push(parley::style::FontFamily::Named(name.into()));
        }

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::List(std::borrow::Cow::Owned(stack)),
        ));
        builder.push_default(parley::style::StyleProperty::FontWeight(
            parley::style::FontWeight::BOLD,
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut layout: parley::Layout<TextBrushRgba8> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }
}

/// Geometry of the title overlay for one canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct TitleGeometry {
    pub(crate) canvas_width: u32,
    pub(crate) canvas_height: u32,
    pub(crate) font_size_px: f32,
    pub(crate) margin_px: f32,
    pub(crate) shadow_blur_px: f32,
}

/// Full-canvas-width premultiplied layer holding the title over its blurred shadow.
///
/// `top` is the canvas row of the layer's first row at zero text offset.
#[derive(Clone, Debug)]
pub(crate) struct TitleLayer {
    pub(crate) pixels: Vec<u8>,
    pub(crate) top: i64,
}

impl TitleLayer {
    pub(crate) fn blend_onto(&self, dst: &mut [u8], width: u32, height: u32, offset_y: f32) {
        let top = self.top + offset_y.round() as i64;
        blend::over_rows(dst, width, height, &self.pixels, top);
    }
}

pub(crate) fn rasterize_title(
    engine: &mut TextLayoutEngine,
    font: &TitleFont,
    text: &str,
    geom: TitleGeometry,
) -> SlidecastResult<TitleLayer> {
    let white = TextBrushRgba8 {
        r: 255,
        g: 255,
        b: 255,
        a: 255,
    };
    let faces = font.faces_for(text);
    let layout = engine.layout_line(text, &faces, geom.font_size_px, white)?;

    let shadow_blur = blur::ShadowBlur::from_canvas_blur(geom.shadow_blur_px)?;
    let radius = shadow_blur.radius();
    let canvas_h = geom.canvas_height as f32;
    let text_top = canvas_h - geom.margin_px - layout.height();
    let band_top = (text_top - radius as f32 - 2.0).floor().max(0.0);
    let band_h = (canvas_h - band_top).max(1.0) as u32;

    let w: u16 = geom
        .canvas_width
        .try_into()
        .map_err(|_| SlidecastError::validation("title band width exceeds u16"))?;
    let h: u16 = band_h
        .try_into()
        .map_err(|_| SlidecastError::validation("title band height exceeds u16"))?;

    let origin = vello_cpu::kurbo::Affine::translate((
        f64::from(geom.margin_px),
        f64::from(text_top - band_top),
    ));

    let mut ctx = vello_cpu::RenderContext::new(w, h);
    let mut draw_glyphs = |color: vello_cpu::peniko::Color| -> Vec<u8> {
        let mut pixmap = vello_cpu::Pixmap::new(w, h);
        ctx.reset();
        ctx.set_transform(origin);
        ctx.set_paint(color);
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(run.run().font())
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
        ctx.flush();
        ctx.render_to_pixmap(&mut pixmap);
        pixmap.data_as_u8_slice().to_vec()
    };

    let shadow = draw_glyphs(vello_cpu::peniko::Color::from_rgba8(0, 0, 0, 255));
    let text_px = draw_glyphs(vello_cpu::peniko::Color::from_rgba8(
        white.r, white.g, white.b, white.a,
    ));

    let mask = shadow.chunks_exact(4).map(|px| px[3]).collect::<Vec<_>>();
    let mut pixels = shadow_blur
        .apply(&mask, usize::from(w), usize::from(h))?
        .into_iter()
        .flat_map(|a| [0, 0, 0, a])
        .collect::<Vec<u8>>();
    blend::over_in_place(&mut pixels, &text_px);

    Ok(TitleLayer {
        pixels,
        top: band_top as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_font_is_an_error() {
        let missing = Path::new("/definitely/not/here/font.ttf");
        assert!(TitleFont::resolve(Some(missing)).is_err());
    }

    #[test]
    fn garbage_font_bytes_fail_layout() {
        let mut engine = TextLayoutEngine::new();
        let faces = [FontFace::new(b"not a font".to_vec(), 0, "garbage")];
        let res = engine.layout_line("hello", &faces, 24.0, TextBrushRgba8::default());
        assert!(res.is_err());
        assert!(!faces[0].covers('h'));
    }

    #[test]
    fn font_without_fallback_keeps_a_single_face() {
        let font = TitleFont::from_bytes(b"not a font".to_vec(), "garbage");
        assert_eq!(font.faces_for("夏日 trip").len(), 1);
    }

    #[test]
    fn chinese_title_shapes_with_a_covering_face() {
        let Some(font) = TitleFont::discover() else {
            eprintln!("no system fonts installed; skipping");
            return;
        };
        let title = "夏日之旅";
        let faces = font.faces_for(title);
        if !title.chars().all(|c| faces.iter().any(|f| f.covers(c))) {
            eprintln!("no installed font covers '{title}'; skipping");
            return;
        }

        let mut engine = TextLayoutEngine::new();
        let layout = engine
            .layout_line(title, &faces, 24.0, TextBrushRgba8::default())
            .unwrap();
        let mut ids = Vec::new();
        for line in layout.lines() {
            for item in line.items() {
                if let parley::layout::PositionedLayoutItem::GlyphRun(run) = item {
                    ids.extend(run.glyphs().map(|g| g.id));
                }
            }
        }
        assert!(!ids.is_empty());
        assert!(ids.iter().all(|&id| id != 0), "notdef glyph in {ids:?}");
    }

    #[test]
    fn layer_offset_moves_rows_down() {
        let layer = TitleLayer {
            pixels: [0u8, 0, 0, 255].to_vec(),
            top: 0,
        };
        let mut dst = vec![255u8; 4 * 3];
        layer.blend_onto(&mut dst, 1, 3, 1.6);
        assert_eq!(dst, vec![255, 255, 255, 255, 255, 255, 255, 255, 0, 0, 0, 255]);
    }
}
