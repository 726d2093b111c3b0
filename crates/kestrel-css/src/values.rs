//! Parsing of individual declaration values.
//!
//! Declarations arrive as strings (the stylesheet parser is an external
//! collaborator). Every parser here returns `Option` and never panics: a
//! value we cannot read is treated as absent by the caller.
//!
//! [CSS Values and Units Level 4](https://www.w3.org/TR/css-values-4/)

use std::collections::HashMap;

use serde::Serialize;

/// [§ 4 Color syntax](https://www.w3.org/TR/css-color-4/#color-syntax)
///
/// sRGB color represented as RGBA components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorValue {
    /// "the red color channel" (0-255)
    pub r: u8,
    /// "the green color channel" (0-255)
    pub g: u8,
    /// "the blue color channel" (0-255)
    pub b: u8,
    /// "the alpha channel" (0-255, 255 = fully opaque)
    pub a: u8,
}

impl ColorValue {
    /// Opaque black.
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    /// Fully transparent.
    pub const TRANSPARENT: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    /// Opaque color from its channels.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse a named or hex color.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.starts_with('#') {
            Self::from_hex(value)
        } else {
            Self::from_named(value)
        }
    }

    /// [§ 4.2 The RGB hexadecimal notations](https://www.w3.org/TR/css-color-4/#hex-notation)
    ///
    /// "The syntax of a <hex-color> is a <hash-token> token whose value consists of
    /// 3, 4, 6, or 8 hexadecimal digits."
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.is_ascii() {
            return None;
        }
        let short = |i: usize| u8::from_str_radix(&hex[i..=i].repeat(2), 16).ok();
        let long = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            // "The three-digit RGB notation (#RGB) is converted into six-digit form (#RRGGBB)
            // by replicating digits, not by adding zeros."
            3 => Some(Self::rgb(short(0)?, short(1)?, short(2)?)),
            4 => Some(Self {
                r: short(0)?,
                g: short(1)?,
                b: short(2)?,
                a: short(3)?,
            }),
            6 => Some(Self::rgb(long(0)?, long(2)?, long(4)?)),
            8 => Some(Self {
                r: long(0)?,
                g: long(2)?,
                b: long(4)?,
                a: long(6)?,
            }),
            _ => None,
        }
    }

    /// [§ 6.1 Named Colors](https://www.w3.org/TR/css-color-4/#named-colors)
    ///
    /// Only the names the default stylesheet and typical test pages use.
    #[must_use]
    pub fn from_named(name: &str) -> Option<Self> {
        let color = match name.to_ascii_lowercase().as_str() {
            "white" => Self::WHITE,
            "black" => Self::BLACK,
            "red" => Self::rgb(255, 0, 0),
            "orangered" => Self::rgb(255, 69, 0),
            "orange" => Self::rgb(255, 165, 0),
            "yellow" => Self::rgb(255, 255, 0),
            "green" => Self::rgb(0, 128, 0),
            "lime" => Self::rgb(0, 255, 0),
            "blue" => Self::rgb(0, 0, 255),
            "lightblue" => Self::rgb(173, 216, 230),
            "navy" => Self::rgb(0, 0, 128),
            "purple" => Self::rgb(128, 0, 128),
            "gray" | "grey" => Self::rgb(128, 128, 128),
            "lightgray" | "lightgrey" => Self::rgb(211, 211, 211),
            "silver" => Self::rgb(192, 192, 192),
            "transparent" => Self::TRANSPARENT,
            _ => return None,
        };
        Some(color)
    }

    /// Whether the color paints nothing.
    #[must_use]
    pub const fn is_transparent(&self) -> bool {
        self.a == 0
    }
}

/// [§ 3.5 Blending modes](https://www.w3.org/TR/compositing-1/#blending)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BlendMode {
    /// `normal` (source-over).
    #[default]
    Normal,
    /// `multiply`
    Multiply,
    /// `screen`
    Screen,
    /// `overlay`
    Overlay,
    /// `darken`
    Darken,
    /// `lighten`
    Lighten,
    /// `difference`
    Difference,
    /// `color-dodge`
    ColorDodge,
    /// `color-burn`
    ColorBurn,
}

impl BlendMode {
    /// Parse a `mix-blend-mode` keyword.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let mode = match value.trim() {
            "normal" => Self::Normal,
            "multiply" => Self::Multiply,
            "screen" => Self::Screen,
            "overlay" => Self::Overlay,
            "darken" => Self::Darken,
            "lighten" => Self::Lighten,
            "difference" => Self::Difference,
            "color-dodge" => Self::ColorDodge,
            "color-burn" => Self::ColorBurn,
            _ => return None,
        };
        Some(mode)
    }
}

/// A parsed `outline: <width> solid <color>` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Outline {
    /// Stroke thickness in CSS pixels.
    pub width: f32,
    /// Stroke color.
    pub color: ColorValue,
}

/// Parse a bare number.
#[must_use]
pub fn parse_number(value: &str) -> Option<f32> {
    value.trim().parse::<f32>().ok().filter(|n| n.is_finite())
}

/// [§ 6.1 Absolute lengths](https://www.w3.org/TR/css-values-4/#absolute-lengths)
///
/// Parse `<number>px`. A missing unit is malformed.
#[must_use]
pub fn parse_px(value: &str) -> Option<f32> {
    parse_number(value.trim().strip_suffix("px")?)
}

/// [§ 4.3 Percentages](https://www.w3.org/TR/css-values-4/#percentages)
#[must_use]
pub fn parse_percent(value: &str) -> Option<f32> {
    parse_number(value.trim().strip_suffix('%')?)
}

/// Parse a `<time>` (`2s`, `500ms`) into seconds.
#[must_use]
pub fn parse_duration(value: &str) -> Option<f32> {
    let value = value.trim();
    if let Some(ms) = value.strip_suffix("ms") {
        return parse_number(ms).map(|n| n / 1000.0);
    }
    parse_number(value.strip_suffix('s')?)
}

/// [§ 12 The `transform` property](https://www.w3.org/TR/css-transforms-1/#transform-property)
///
/// Only `translate(<x>px, <y>px)` is understood. Anything else yields `None`.
#[must_use]
pub fn parse_translate(value: &str) -> Option<(f32, f32)> {
    let inner = value
        .trim()
        .strip_prefix("translate(")?
        .strip_suffix(')')?;
    let (x, y) = inner.split_once(',')?;
    Some((parse_px(x)?, parse_px(y)?))
}

/// Format a translation the way [`parse_translate`] reads it back.
#[must_use]
pub fn format_translate(x: f32, y: f32) -> String {
    format!("translate({x}px, {y}px)")
}

/// Parse `outline: <width>px solid <color>`.
#[must_use]
pub fn parse_outline(value: &str) -> Option<Outline> {
    let mut parts = value.split_whitespace();
    let width = parse_px(parts.next()?)?;
    if parts.next()? != "solid" {
        return None;
    }
    let color = ColorValue::parse(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some(Outline { width, color })
}

/// [§ 2.1 The `transition` shorthand](https://www.w3.org/TR/css-transitions-1/#transition-shorthand-property)
///
/// Parse `"opacity 2s, transform 500ms"` into property → duration (seconds).
/// Entries that do not have exactly a property and a duration are skipped.
#[must_use]
pub fn parse_transitions(value: &str) -> HashMap<String, f32> {
    let mut transitions = HashMap::new();
    for item in value.split(',') {
        let mut parts = item.split_whitespace();
        let (Some(property), Some(duration), None) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        if let Some(seconds) = parse_duration(duration) {
            let _ = transitions.insert(property.to_string(), seconds);
        }
    }
    transitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_px_requires_unit() {
        assert_eq!(parse_px("12px"), Some(12.0));
        assert_eq!(parse_px(" 1.5px "), Some(1.5));
        assert_eq!(parse_px("12"), None);
        assert_eq!(parse_px("abcpx"), None);
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("2s"), Some(2.0));
        assert_eq!(parse_duration("500ms"), Some(0.5));
        assert_eq!(parse_duration("2"), None);
    }

    #[test]
    fn test_parse_translate() {
        assert_eq!(parse_translate("translate(10px, -5px)"), Some((10.0, -5.0)));
        assert_eq!(parse_translate("rotate(10deg)"), None);
        assert_eq!(parse_translate(&format_translate(3.0, 4.5)), Some((3.0, 4.5)));
    }

    #[test]
    fn test_parse_outline() {
        assert_eq!(
            parse_outline("2px solid red"),
            Some(Outline {
                width: 2.0,
                color: ColorValue::rgb(255, 0, 0)
            })
        );
        assert_eq!(parse_outline("2px dashed red"), None);
        assert_eq!(parse_outline("solid red"), None);
    }

    #[test]
    fn test_parse_transitions_list() {
        let transitions = parse_transitions("opacity 2s, transform 500ms, bogus");
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions.get("opacity"), Some(&2.0));
        assert_eq!(transitions.get("transform"), Some(&0.5));
    }

    #[test]
    fn test_hex_colors() {
        assert_eq!(ColorValue::parse("#fff"), Some(ColorValue::WHITE));
        assert_eq!(ColorValue::parse("#00ff0080").map(|c| c.a), Some(0x80));
        assert_eq!(ColorValue::parse("#ggg"), None);
        assert_eq!(ColorValue::parse("lightblue"), Some(ColorValue::rgb(173, 216, 230)));
    }
}
