//! Frame-stepped transitions.
//!
//! [CSS Transitions Level 1](https://www.w3.org/TR/css-transitions-1/)
//!
//! An animation is sized in frames when it starts. Frame 1 shows the starting
//! value and frame `total_frames` the end value; [`Animation::animate`] steps
//! through the frames in between and then reports completion by returning
//! `None`, at which point the owner writes the end value and drops it.

use serde::Serialize;

use crate::values::{format_translate, parse_number, parse_px, parse_translate};

/// A running transition for one property of one node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Animation {
    /// Linear interpolation of a number, optionally carrying a `px` unit
    /// (`opacity`, `width`, `height`).
    Numeric {
        /// Value at frame 1.
        start: f32,
        /// Value at the final frame.
        end: f32,
        /// Whether values are formatted with a `px` suffix.
        px: bool,
        /// Length of the animation in frames.
        total_frames: u32,
        /// Current frame, starting at 1.
        frame: u32,
    },
    /// Linear interpolation of `transform: translate(x, y)`.
    Translate {
        /// Offset at frame 1.
        start: (f32, f32),
        /// Offset at the final frame.
        end: (f32, f32),
        /// Length of the animation in frames.
        total_frames: u32,
        /// Current frame, starting at 1.
        frame: u32,
    },
}

impl Animation {
    /// Start an animation between two declared values of `property`.
    ///
    /// Returns `None` when the property is not animatable or either value
    /// cannot be read.
    #[must_use]
    pub fn new(property: &str, old: &str, new: &str, total_frames: u32) -> Option<Self> {
        let total_frames = total_frames.max(1);
        match property {
            "opacity" => Some(Self::Numeric {
                start: parse_number(old)?,
                end: parse_number(new)?,
                px: false,
                total_frames,
                frame: 1,
            }),
            "width" | "height" => Some(Self::Numeric {
                start: parse_px(old)?,
                end: parse_px(new)?,
                px: true,
                total_frames,
                frame: 1,
            }),
            "transform" => Some(Self::Translate {
                start: parse_translate(old)?,
                end: parse_translate(new)?,
                total_frames,
                frame: 1,
            }),
            _ => None,
        }
    }

    /// Whether animating `property` changes box geometry.
    #[must_use]
    pub fn affects_layout(property: &str) -> bool {
        matches!(property, "width" | "height")
    }

    /// Advance one frame and return the new value, or `None` once the final
    /// frame has been reached.
    pub fn animate(&mut self) -> Option<String> {
        let (frame, total) = match self {
            Self::Numeric {
                frame,
                total_frames,
                ..
            }
            | Self::Translate {
                frame,
                total_frames,
                ..
            } => {
                *frame = frame.saturating_add(1);
                (*frame, *total_frames)
            }
        };
        if frame >= total {
            return None;
        }
        Some(self.value())
    }

    /// Value at the current frame.
    #[must_use]
    pub fn value(&self) -> String {
        match *self {
            Self::Numeric {
                start,
                end,
                px,
                total_frames,
                frame,
            } => {
                let v = lerp(start, end, progress(frame, total_frames));
                if px { format!("{v}px") } else { format!("{v}") }
            }
            Self::Translate {
                start,
                end,
                total_frames,
                frame,
            } => {
                let t = progress(frame, total_frames);
                format_translate(lerp(start.0, end.0, t), lerp(start.1, end.1, t))
            }
        }
    }

    /// Formatted end value.
    #[must_use]
    pub fn end_value(&self) -> String {
        match *self {
            Self::Numeric { end, px, .. } => {
                if px { format!("{end}px") } else { format!("{end}") }
            }
            Self::Translate { end, .. } => format_translate(end.0, end.1),
        }
    }

    /// Whether this animation is heading to the value `target`.
    #[must_use]
    pub fn targets(&self, target: &str) -> bool {
        match *self {
            Self::Numeric { end, px, .. } => {
                let parsed = if px { parse_px(target) } else { parse_number(target) };
                parsed.is_some_and(|t| (t - end).abs() < f32::EPSILON)
            }
            Self::Translate { end, .. } => parse_translate(target).is_some_and(|(x, y)| {
                (x - end.0).abs() < f32::EPSILON && (y - end.1).abs() < f32::EPSILON
            }),
        }
    }
}

/// Fraction of the way from frame 1 to the final frame.
#[allow(clippy::cast_precision_loss)]
fn progress(frame: u32, total_frames: u32) -> f32 {
    if total_frames <= 1 {
        return 1.0;
    }
    (frame.saturating_sub(1) as f32 / (total_frames - 1) as f32).min(1.0)
}

fn lerp(start: f32, end: f32, t: f32) -> f32 {
    (end - start).mul_add(t, start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_yields_inner_frames_then_stops() {
        let mut anim = Animation::new("opacity", "0", "1", 5).unwrap();
        assert_eq!(anim.value(), "0");
        let values: Vec<String> = std::iter::from_fn(|| anim.animate()).collect();
        assert_eq!(values, vec!["0.25", "0.5", "0.75"]);
        assert_eq!(anim.animate(), None);
        assert_eq!(anim.end_value(), "1");
    }

    #[test]
    fn test_width_keeps_px_unit() {
        let mut anim = Animation::new("width", "100px", "200px", 3).unwrap();
        assert_eq!(anim.animate().as_deref(), Some("150px"));
        assert_eq!(anim.animate(), None);
    }

    #[test]
    fn test_translate_interpolates_both_axes() {
        let mut anim =
            Animation::new("transform", "translate(0px, 0px)", "translate(30px, 60px)", 4)
                .unwrap();
        assert_eq!(anim.animate().as_deref(), Some("translate(10px, 20px)"));
        assert!(anim.targets("translate(30px, 60px)"));
    }

    #[test]
    fn test_unanimatable_property() {
        assert_eq!(Animation::new("color", "red", "blue", 10), None);
        assert_eq!(Animation::new("opacity", "x", "1", 10), None);
    }
}
