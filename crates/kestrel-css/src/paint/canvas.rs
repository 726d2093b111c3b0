//! The abstract drawing surface display lists are replayed onto.
//!
//! The paint engine never touches pixels. A [`Canvas`] is supplied by the
//! embedder: the browser crate rasterizes with a software backend, and
//! [`RecordingCanvas`] captures the command stream for inspection.

use kestrel_common::Rect;

use crate::layout::FontSpec;
use crate::values::{BlendMode, ColorValue};

/// A 2D drawing surface with a save/restore state stack.
///
/// `save_layer` and `save` both push a state; every push is matched by
/// exactly one `restore`.
pub trait Canvas {
    /// Fill a rectangle.
    fn draw_rect(&mut self, rect: Rect, color: ColorValue);

    /// Fill a rectangle with rounded corners.
    fn draw_rrect(&mut self, rect: Rect, radius: f32, color: ColorValue);

    /// Draw a run of text whose top-left corner is `(x, y)`.
    fn draw_text(&mut self, x: f32, y: f32, text: &str, font: &FontSpec, color: ColorValue);

    /// Stroke a line.
    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: ColorValue, thickness: f32);

    /// Push the current transform and clip.
    fn save(&mut self);

    /// Pop the last `save` or `save_layer`. A layer is blended down.
    fn restore(&mut self);

    /// Intersect the clip with a rounded rectangle.
    fn clip_rrect(&mut self, rect: Rect, radius: f32);

    /// Start an isolated group composited with `opacity` and `blend`.
    fn save_layer(&mut self, opacity: f32, blend: BlendMode);

    /// Translate subsequent drawing.
    fn translate(&mut self, dx: f32, dy: f32);

    /// Draw a pre-rastered composited layer at `rect`.
    fn draw_layer(&mut self, layer: usize, rect: Rect);
}

/// One recorded canvas call.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasCommand {
    /// [`Canvas::draw_rect`]
    Rect(Rect, ColorValue),
    /// [`Canvas::draw_rrect`]
    RRect(Rect, f32, ColorValue),
    /// [`Canvas::draw_text`]
    Text {
        /// Left edge.
        x: f32,
        /// Top edge.
        y: f32,
        /// The text.
        text: String,
        /// Text color.
        color: ColorValue,
    },
    /// [`Canvas::draw_line`]
    Line((f32, f32), (f32, f32), ColorValue, f32),
    /// [`Canvas::save`]
    Save,
    /// [`Canvas::restore`]
    Restore,
    /// [`Canvas::clip_rrect`]
    Clip(Rect, f32),
    /// [`Canvas::save_layer`]
    SaveLayer(f32, BlendMode),
    /// [`Canvas::translate`]
    Translate(f32, f32),
    /// [`Canvas::draw_layer`]
    Layer(usize, Rect),
}

/// A canvas that records every call instead of drawing.
#[derive(Debug, Clone, Default)]
pub struct RecordingCanvas {
    /// Calls in the order they were made.
    pub commands: Vec<CanvasCommand>,
}

impl RecordingCanvas {
    /// Create an empty recording.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of every `draw_text` call, in order.
    #[must_use]
    pub fn texts(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CanvasCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Canvas for RecordingCanvas {
    fn draw_rect(&mut self, rect: Rect, color: ColorValue) {
        self.commands.push(CanvasCommand::Rect(rect, color));
    }

    fn draw_rrect(&mut self, rect: Rect, radius: f32, color: ColorValue) {
        self.commands.push(CanvasCommand::RRect(rect, radius, color));
    }

    fn draw_text(&mut self, x: f32, y: f32, text: &str, _font: &FontSpec, color: ColorValue) {
        self.commands.push(CanvasCommand::Text {
            x,
            y,
            text: text.to_string(),
            color,
        });
    }

    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: ColorValue, thickness: f32) {
        self.commands
            .push(CanvasCommand::Line(from, to, color, thickness));
    }

    fn save(&mut self) {
        self.commands.push(CanvasCommand::Save);
    }

    fn restore(&mut self) {
        self.commands.push(CanvasCommand::Restore);
    }

    fn clip_rrect(&mut self, rect: Rect, radius: f32) {
        self.commands.push(CanvasCommand::Clip(rect, radius));
    }

    fn save_layer(&mut self, opacity: f32, blend: BlendMode) {
        self.commands.push(CanvasCommand::SaveLayer(opacity, blend));
    }

    fn translate(&mut self, dx: f32, dy: f32) {
        self.commands.push(CanvasCommand::Translate(dx, dy));
    }

    fn draw_layer(&mut self, layer: usize, rect: Rect) {
        self.commands.push(CanvasCommand::Layer(layer, rect));
    }
}
