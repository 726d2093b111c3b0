//! Font descriptions and the metrics provider used by layout.
//!
//! [§ 10.8 Line height calculations](https://www.w3.org/TR/CSS2/visudet.html#line-height)
//!
//! "CSS assumes that every font has font metrics that specify a
//! characteristic height above the baseline and a depth below it."

use serde::Serialize;

/// [§ 3.2 'font-weight'](https://www.w3.org/TR/css-fonts-4/#font-weight-prop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum FontWeight {
    /// 400
    #[default]
    Normal,
    /// 700
    Bold,
}

/// [§ 3.3 'font-style'](https://www.w3.org/TR/css-fonts-4/#font-style-prop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum FontStyle {
    /// Upright glyphs.
    #[default]
    Normal,
    /// Italic or oblique glyphs.
    Italic,
}

/// A resolved font: device-pixel size, weight and style.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FontSpec {
    /// Size in device pixels (zoom already applied).
    pub size: f32,
    /// Weight.
    pub weight: FontWeight,
    /// Style.
    pub style: FontStyle,
}

/// Abstract font-metrics provider.
///
/// Layout depends only on this trait; the concrete provider is chosen by the
/// embedder (a real font rasterizer, or [`ApproximateFontMetrics`]).
pub trait FontMetrics {
    /// Advance width of `text` set in `font`.
    fn measure(&self, text: &str, font: &FontSpec) -> f32;

    /// Distance from the baseline to the top of the tallest glyph (positive).
    fn ascent(&self, font: &FontSpec) -> f32;

    /// Distance from the baseline to the bottom of the lowest glyph (positive).
    fn descent(&self, font: &FontSpec) -> f32;

    /// Height of one line of text without leading.
    fn line_spacing(&self, font: &FontSpec) -> f32 {
        self.ascent(font) + self.descent(font)
    }
}

/// Approximate font metrics using fixed ratios.
///
/// Implementation note: Without access to actual font data, we use fixed
/// ratio approximations. The average advance width of Latin glyphs in a
/// proportional font is approximately 0.6× the font size (typical for
/// Helvetica/Arial body text), with the em box split 0.8 / 0.2 between
/// ascent and descent.
///
/// This is used as a fallback when no font is available, and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateFontMetrics;

impl FontMetrics for ApproximateFontMetrics {
    #[allow(clippy::cast_precision_loss)]
    fn measure(&self, text: &str, font: &FontSpec) -> f32 {
        const CHAR_WIDTH_RATIO: f32 = 0.6;
        text.chars().count() as f32 * font.size * CHAR_WIDTH_RATIO
    }

    fn ascent(&self, font: &FontSpec) -> f32 {
        font.size * 0.8
    }

    fn descent(&self, font: &FontSpec) -> f32 {
        font.size * 0.2
    }
}
