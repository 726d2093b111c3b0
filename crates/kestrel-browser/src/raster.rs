//! Software rasterization of display lists with tiny-skia.
//!
//! [`SkiaCanvas`] implements the paint engine's abstract [`Canvas`] on top
//! of a [`Pixmap`]. Glyphs come from fontdue and are blitted as small
//! coverage pixmaps; everything else is a tiny-skia path.

use kestrel_common::Rect;
use kestrel_css::{BlendMode, Canvas, ColorValue, FontSpec};
use tiny_skia::{
    FillRule, Mask, Paint, PathBuilder, Pixmap, PixmapPaint, PremultipliedColorU8, Stroke,
    Transform,
};

use crate::compositor::CompositedLayer;
use crate::fonts::FontCache;

/// Fraction of the font size above the baseline when the font has no
/// horizontal line metrics.
const FALLBACK_ASCENT: f32 = 0.8;

/// Map a CSS blend mode onto tiny-skia's.
const fn map_blend_mode(mode: BlendMode) -> tiny_skia::BlendMode {
    match mode {
        BlendMode::Normal => tiny_skia::BlendMode::SourceOver,
        BlendMode::Multiply => tiny_skia::BlendMode::Multiply,
        BlendMode::Screen => tiny_skia::BlendMode::Screen,
        BlendMode::Overlay => tiny_skia::BlendMode::Overlay,
        BlendMode::Darken => tiny_skia::BlendMode::Darken,
        BlendMode::Lighten => tiny_skia::BlendMode::Lighten,
        BlendMode::Difference => tiny_skia::BlendMode::Difference,
        BlendMode::ColorDodge => tiny_skia::BlendMode::ColorDodge,
        BlendMode::ColorBurn => tiny_skia::BlendMode::ColorBurn,
    }
}

fn solid_paint(color: ColorValue) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint
}

/// A rectangle with rounded corners, or a plain rectangle when `radius` is
/// zero. Returns `None` for empty rectangles.
fn rrect_path(rect: Rect, radius: f32) -> Option<tiny_skia::Path> {
    let skia_rect = tiny_skia::Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)?;
    let r = radius.min(rect.width / 2.0).min(rect.height / 2.0).max(0.0);
    if r <= 0.0 {
        return Some(PathBuilder::from_rect(skia_rect));
    }
    let (left, top, right, bottom) = (rect.x, rect.y, rect.right(), rect.bottom());
    let mut pb = PathBuilder::new();
    pb.move_to(left + r, top);
    pb.line_to(right - r, top);
    pb.quad_to(right, top, right, top + r);
    pb.line_to(right, bottom - r);
    pb.quad_to(right, bottom, right - r, bottom);
    pb.line_to(left + r, bottom);
    pb.quad_to(left, bottom, left, bottom - r);
    pb.line_to(left, top + r);
    pb.quad_to(left, top, left + r, top);
    pb.close();
    pb.finish()
}

struct Saved {
    transform: Transform,
    clip: Option<Mask>,
    group: bool,
}

struct Group {
    pixmap: Pixmap,
    opacity: f32,
    blend: BlendMode,
}

/// The pixmap drawing currently goes to: the innermost open group, or the
/// base surface.
fn target<'p>(base: &'p mut Pixmap, groups: &'p mut [Group]) -> &'p mut Pixmap {
    match groups.last_mut() {
        Some(group) => &mut group.pixmap,
        None => base,
    }
}

/// A [`Canvas`] that rasterizes into a tiny-skia [`Pixmap`].
///
/// `save_layer` opens a surface-sized transparent group that is blended
/// down with its opacity and blend mode on the matching `restore`.
pub struct SkiaCanvas<'a> {
    base: &'a mut Pixmap,
    fonts: &'a FontCache,
    layers: &'a [CompositedLayer],
    transform: Transform,
    clip: Option<Mask>,
    saved: Vec<Saved>,
    groups: Vec<Group>,
}

impl<'a> SkiaCanvas<'a> {
    /// Draw onto `base`. `layers` resolves `draw_layer` calls.
    pub fn new(base: &'a mut Pixmap, fonts: &'a FontCache, layers: &'a [CompositedLayer]) -> Self {
        Self {
            base,
            fonts,
            layers,
            transform: Transform::identity(),
            clip: None,
            saved: Vec::new(),
            groups: Vec::new(),
        }
    }

    fn fill(&mut self, path: &tiny_skia::Path, color: ColorValue) {
        let paint = solid_paint(color);
        target(self.base, &mut self.groups).fill_path(
            path,
            &paint,
            FillRule::Winding,
            self.transform,
            self.clip.as_ref(),
        );
    }

    fn push_state(&mut self, group: bool) {
        self.saved.push(Saved {
            transform: self.transform,
            clip: self.clip.clone(),
            group,
        });
    }

    /// Blit one glyph's coverage bitmap, tinted with `color`.
    fn blit_coverage(
        &mut self,
        x: i32,
        y: i32,
        width: usize,
        height: usize,
        coverage: &[u8],
        color: ColorValue,
    ) {
        let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
            return;
        };
        let Some(mut glyph) = Pixmap::new(w, h) else {
            return;
        };
        #[allow(clippy::cast_possible_truncation)]
        let premultiply = |channel: u8, alpha: u8| -> u8 {
            ((u16::from(channel) * u16::from(alpha) + 127) / 255) as u8
        };
        for (dst, &cov) in glyph.pixels_mut().iter_mut().zip(coverage) {
            #[allow(clippy::cast_possible_truncation)]
            let alpha = ((u16::from(color.a) * u16::from(cov) + 127) / 255) as u8;
            *dst = PremultipliedColorU8::from_rgba(
                premultiply(color.r, alpha),
                premultiply(color.g, alpha),
                premultiply(color.b, alpha),
                alpha,
            )
            .unwrap_or(PremultipliedColorU8::TRANSPARENT);
        }
        target(self.base, &mut self.groups).draw_pixmap(
            x,
            y,
            glyph.as_ref(),
            &PixmapPaint::default(),
            self.transform,
            self.clip.as_ref(),
        );
    }
}

impl Canvas for SkiaCanvas<'_> {
    fn draw_rect(&mut self, rect: Rect, color: ColorValue) {
        if let Some(path) = rrect_path(rect, 0.0) {
            self.fill(&path, color);
        }
    }

    fn draw_rrect(&mut self, rect: Rect, radius: f32, color: ColorValue) {
        if let Some(path) = rrect_path(rect, radius) {
            self.fill(&path, color);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw_text(&mut self, x: f32, y: f32, text: &str, font: &FontSpec, color: ColorValue) {
        let fonts = self.fonts;
        let Some(face) = fonts.font_for(font) else {
            return;
        };
        let ascent = face
            .horizontal_line_metrics(font.size)
            .map_or(font.size * FALLBACK_ASCENT, |m| m.ascent);
        let baseline = y + ascent;
        let mut cursor_x = x;
        for ch in text.chars() {
            if ch.is_control() {
                continue;
            }
            let (metrics, bitmap) = face.rasterize(ch, font.size);
            if metrics.width > 0 && metrics.height > 0 {
                // fontdue's ymin is the offset from the baseline to the
                // bottom edge of the bitmap, positive upwards.
                let glyph_x = cursor_x.round() as i32 + metrics.xmin;
                let glyph_top = baseline.round() as i32
                    - metrics.ymin
                    - i32::try_from(metrics.height).unwrap_or(i32::MAX);
                self.blit_coverage(
                    glyph_x,
                    glyph_top,
                    metrics.width,
                    metrics.height,
                    &bitmap,
                    color,
                );
            }
            cursor_x += metrics.advance_width;
        }
    }

    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: ColorValue, thickness: f32) {
        let mut pb = PathBuilder::new();
        pb.move_to(from.0, from.1);
        pb.line_to(to.0, to.1);
        let Some(path) = pb.finish() else {
            return;
        };
        let paint = solid_paint(color);
        let stroke = Stroke {
            width: thickness,
            ..Stroke::default()
        };
        target(self.base, &mut self.groups).stroke_path(
            &path,
            &paint,
            &stroke,
            self.transform,
            self.clip.as_ref(),
        );
    }

    fn save(&mut self) {
        self.push_state(false);
    }

    fn restore(&mut self) {
        let Some(saved) = self.saved.pop() else {
            log::warn!(target: "kestrel::raster", "restore without matching save");
            return;
        };
        self.transform = saved.transform;
        self.clip = saved.clip;
        if !saved.group {
            return;
        }
        let Some(group) = self.groups.pop() else {
            return;
        };
        let paint = PixmapPaint {
            opacity: group.opacity,
            blend_mode: map_blend_mode(group.blend),
            ..PixmapPaint::default()
        };
        target(self.base, &mut self.groups).draw_pixmap(
            0,
            0,
            group.pixmap.as_ref(),
            &paint,
            Transform::identity(),
            self.clip.as_ref(),
        );
    }

    fn clip_rrect(&mut self, rect: Rect, radius: f32) {
        let Some(path) = rrect_path(rect, radius) else {
            // Clipping to nothing hides everything until the next restore.
            self.clip = Mask::new(self.base.width(), self.base.height());
            return;
        };
        match self.clip.as_mut() {
            Some(mask) => mask.intersect_path(&path, FillRule::Winding, true, self.transform),
            None => {
                let Some(mut mask) = Mask::new(self.base.width(), self.base.height()) else {
                    return;
                };
                mask.fill_path(&path, FillRule::Winding, true, self.transform);
                self.clip = Some(mask);
            }
        }
    }

    fn save_layer(&mut self, opacity: f32, blend: BlendMode) {
        self.push_state(true);
        match Pixmap::new(self.base.width(), self.base.height()) {
            Some(pixmap) => self.groups.push(Group {
                pixmap,
                opacity: opacity.clamp(0.0, 1.0),
                blend,
            }),
            // Without a group the contents draw straight through.
            None => {
                if let Some(saved) = self.saved.last_mut() {
                    saved.group = false;
                }
            }
        }
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.transform = self.transform.pre_translate(dx, dy);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw_layer(&mut self, layer: usize, rect: Rect) {
        let layers = self.layers;
        let Some(surface) = layers.get(layer).and_then(CompositedLayer::surface) else {
            return;
        };
        target(self.base, &mut self.groups).draw_pixmap(
            rect.x.round() as i32,
            rect.y.round() as i32,
            surface.as_ref(),
            &PixmapPaint::default(),
            self.transform,
            self.clip.as_ref(),
        );
    }
}

/// Fill the whole surface with one color.
pub fn clear(surface: &mut Pixmap, color: ColorValue) {
    surface.fill(tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let p = pixmap.pixel(x, y).unwrap().demultiply();
        (p.red(), p.green(), p.blue(), p.alpha())
    }

    #[test]
    fn test_draw_rect_fills_pixels() {
        let mut pixmap = Pixmap::new(20, 20).unwrap();
        let fonts = FontCache::empty();
        let mut canvas = SkiaCanvas::new(&mut pixmap, &fonts, &[]);
        canvas.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), ColorValue::rgb(255, 0, 0));
        assert_eq!(pixel(&pixmap, 5, 5), (255, 0, 0, 255));
        assert_eq!(pixel(&pixmap, 15, 15).3, 0);
    }

    #[test]
    fn test_clip_limits_drawing() {
        let mut pixmap = Pixmap::new(20, 20).unwrap();
        let fonts = FontCache::empty();
        let mut canvas = SkiaCanvas::new(&mut pixmap, &fonts, &[]);
        canvas.save();
        canvas.clip_rrect(Rect::new(0.0, 0.0, 10.0, 20.0), 0.0);
        canvas.draw_rect(Rect::new(0.0, 0.0, 20.0, 20.0), ColorValue::BLACK);
        canvas.restore();
        assert_eq!(pixel(&pixmap, 5, 5).3, 255);
        assert_eq!(pixel(&pixmap, 15, 5).3, 0);
    }

    #[test]
    fn test_layer_opacity_is_applied_on_restore() {
        let mut pixmap = Pixmap::new(10, 10).unwrap();
        let fonts = FontCache::empty();
        let mut canvas = SkiaCanvas::new(&mut pixmap, &fonts, &[]);
        canvas.save_layer(0.5, BlendMode::Normal);
        canvas.draw_rect(Rect::new(0.0, 0.0, 10.0, 10.0), ColorValue::BLACK);
        canvas.restore();
        let alpha = pixel(&pixmap, 5, 5).3;
        assert!((120..=135).contains(&alpha), "alpha was {alpha}");
    }

    #[test]
    fn test_translate_moves_drawing() {
        let mut pixmap = Pixmap::new(20, 20).unwrap();
        let fonts = FontCache::empty();
        let mut canvas = SkiaCanvas::new(&mut pixmap, &fonts, &[]);
        canvas.save();
        canvas.translate(10.0, 0.0);
        canvas.draw_rect(Rect::new(0.0, 0.0, 5.0, 5.0), ColorValue::BLACK);
        canvas.restore();
        canvas.draw_rect(Rect::new(0.0, 10.0, 5.0, 5.0), ColorValue::BLACK);
        assert_eq!(pixel(&pixmap, 2, 2).3, 0);
        assert_eq!(pixel(&pixmap, 12, 2).3, 255);
        assert_eq!(pixel(&pixmap, 2, 12).3, 255);
    }
}
