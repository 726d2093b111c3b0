//! Resolved per-node styles.
//!
//! A [`ComputedStyle`] is the property map the cascade produces for one node.
//! Values stay as strings so that transitions can diff them verbatim; the
//! typed accessors below read them with safe defaults.

use std::collections::HashMap;

use kestrel_dom::{NodeId, PropertyMap};
use serde::Serialize;

use crate::layout::{FontSpec, FontStyle, FontWeight};
use crate::values::{
    BlendMode, ColorValue, Outline, parse_number, parse_outline, parse_px, parse_transitions,
    parse_translate,
};

/// User agent default font size.
/// [§ 3.5 font-size](https://www.w3.org/TR/css-fonts-4/#font-size-prop)
pub const DEFAULT_FONT_SIZE_PX: f32 = 16.0;

/// Styles for every node of a document, keyed by node.
pub type StyleMap = HashMap<NodeId, ComputedStyle>;

/// The resolved property map of one node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ComputedStyle {
    properties: PropertyMap,
}

impl ComputedStyle {
    /// Create an empty style.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value of a property.
    #[must_use]
    pub fn get(&self, property: &str) -> Option<&str> {
        self.properties.get(property).map(String::as_str)
    }

    /// Set a property, returning the previous value.
    pub fn set(&mut self, property: &str, value: impl Into<String>) -> Option<String> {
        self.properties.insert(property.to_string(), value.into())
    }

    /// Whether the property is present.
    #[must_use]
    pub fn contains(&self, property: &str) -> bool {
        self.properties.contains_key(property)
    }

    /// All properties.
    #[must_use]
    pub const fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    /// Resolved `font-size` in CSS pixels.
    #[must_use]
    pub fn font_size(&self) -> f32 {
        self.get("font-size")
            .and_then(parse_px)
            .unwrap_or(DEFAULT_FONT_SIZE_PX)
    }

    /// Font description at the given zoom.
    #[must_use]
    pub fn font(&self, zoom: f32) -> FontSpec {
        let weight = match self.get("font-weight") {
            Some("bold" | "bolder" | "700" | "800" | "900") => FontWeight::Bold,
            _ => FontWeight::Normal,
        };
        let style = match self.get("font-style") {
            Some("italic" | "oblique") => FontStyle::Italic,
            _ => FontStyle::Normal,
        };
        FontSpec {
            size: self.font_size() * zoom,
            weight,
            style,
        }
    }

    /// Text color. Unreadable values fall back to black.
    #[must_use]
    pub fn color(&self) -> ColorValue {
        self.get("color")
            .and_then(ColorValue::parse)
            .unwrap_or(ColorValue::BLACK)
    }

    /// Background color, if one paints anything.
    #[must_use]
    pub fn background_color(&self) -> Option<ColorValue> {
        self.get("background-color")
            .and_then(ColorValue::parse)
            .filter(|c| !c.is_transparent())
    }

    /// [§ 3.2 'opacity'](https://www.w3.org/TR/css-color-4/#transparency)
    ///
    /// Clamped to `[0, 1]`; defaults to 1.
    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.get("opacity")
            .and_then(parse_number)
            .map_or(1.0, |o| o.clamp(0.0, 1.0))
    }

    /// `mix-blend-mode`, defaulting to normal.
    #[must_use]
    pub fn blend_mode(&self) -> BlendMode {
        self.get("mix-blend-mode")
            .and_then(BlendMode::parse)
            .unwrap_or_default()
    }

    /// `border-radius` in CSS pixels.
    #[must_use]
    pub fn border_radius(&self) -> f32 {
        self.get("border-radius").and_then(parse_px).unwrap_or(0.0)
    }

    /// Whether `overflow: clip` is set.
    #[must_use]
    pub fn clips_overflow(&self) -> bool {
        self.get("overflow") == Some("clip")
    }

    /// `transform: translate(x, y)` in CSS pixels.
    #[must_use]
    pub fn translation(&self) -> Option<(f32, f32)> {
        self.get("transform").and_then(parse_translate)
    }

    /// Parsed `outline`.
    #[must_use]
    pub fn outline(&self) -> Option<Outline> {
        self.get("outline").and_then(parse_outline)
    }

    /// Explicit `width` in CSS pixels.
    #[must_use]
    pub fn width(&self) -> Option<f32> {
        self.get("width").and_then(parse_px)
    }

    /// Explicit `height` in CSS pixels.
    #[must_use]
    pub fn height(&self) -> Option<f32> {
        self.get("height").and_then(parse_px)
    }

    /// Listed transitions: property → duration in seconds.
    #[must_use]
    pub fn transitions(&self) -> HashMap<String, f32> {
        self.get("transition")
            .map(parse_transitions)
            .unwrap_or_default()
    }
}

impl<const N: usize> From<[(&str, &str); N]> for ComputedStyle {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self {
            properties: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_missing_values() {
        let style = ComputedStyle::new();
        assert!((style.font_size() - 16.0).abs() < f32::EPSILON);
        assert!((style.opacity() - 1.0).abs() < f32::EPSILON);
        assert_eq!(style.blend_mode(), BlendMode::Normal);
        assert_eq!(style.background_color(), None);
        assert_eq!(style.color(), ColorValue::BLACK);
    }

    #[test]
    fn test_malformed_values_are_absent() {
        let style = ComputedStyle::from([
            ("width", "100"),
            ("opacity", "half"),
            ("transform", "rotate(4deg)"),
        ]);
        assert_eq!(style.width(), None);
        assert!((style.opacity() - 1.0).abs() < f32::EPSILON);
        assert_eq!(style.translation(), None);
    }

    #[test]
    fn test_font_spec_scales_with_zoom() {
        let style = ComputedStyle::from([("font-size", "20px"), ("font-weight", "bold")]);
        let font = style.font(2.0);
        assert!((font.size - 40.0).abs() < f32::EPSILON);
        assert_eq!(font.weight, FontWeight::Bold);
        assert_eq!(font.style, FontStyle::Normal);
    }
}
