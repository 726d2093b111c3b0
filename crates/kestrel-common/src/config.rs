//! Pipeline settings.
//!
//! Everything here is a constant of the rendering model (viewport size,
//! document margins, frame interval) rather than document state. Settings
//! are built once per browser and shared read-only with every tab.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error returned when settings cannot be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings document is not valid JSON for [`Settings`].
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
    /// A field holds a value the pipeline cannot run with.
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Viewport, spacing and timing configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Width of the content area in CSS pixels.
    pub viewport_width: f32,
    /// Height of the content area in CSS pixels.
    pub viewport_height: f32,
    /// Horizontal document margin.
    pub h_step: f32,
    /// Vertical document margin.
    pub v_step: f32,
    /// Distance scrolled by one scroll step, and the gap left above a box
    /// scrolled into view by focus.
    pub scroll_step: f32,
    /// Intrinsic width of `input` and `button` boxes.
    pub input_width: f32,
    /// Interval between animation frames in milliseconds.
    pub refresh_interval_ms: u64,
    /// Initial zoom factor.
    pub zoom: f32,
    /// Initial color scheme.
    pub dark_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            viewport_width: 800.0,
            viewport_height: 600.0,
            h_step: 13.0,
            v_step: 18.0,
            scroll_step: 100.0,
            input_width: 200.0,
            refresh_interval_ms: 33,
            zoom: 1.0,
            dark_mode: false,
        }
    }
}

impl Settings {
    /// Parse settings from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] when a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.viewport_width <= 0.0 || self.viewport_height <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "viewport",
                reason: format!("{}x{} has no area", self.viewport_width, self.viewport_height),
            });
        }
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "refresh-interval-ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.zoom.is_nan() || self.zoom <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "zoom",
                reason: format!("{} is not positive", self.zoom),
            });
        }
        Ok(())
    }

    /// Frame interval as a [`Duration`].
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Frame interval in seconds, used to size transitions in frames.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frame_interval_secs(&self) -> f32 {
        self.refresh_interval_ms as f32 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings = Settings::from_json_str(r#"{ "zoom": 2.0 }"#).unwrap();
        assert!((settings.zoom - 2.0).abs() < f32::EPSILON);
        assert!((settings.viewport_width - 800.0).abs() < f32::EPSILON);
        assert_eq!(settings.refresh_interval_ms, 33);
    }

    #[test]
    fn test_kebab_case_fields() {
        let settings =
            Settings::from_json_str(r#"{ "viewport-height": 300, "dark-mode": true }"#).unwrap();
        assert!((settings.viewport_height - 300.0).abs() < f32::EPSILON);
        assert!(settings.dark_mode);
    }

    #[test]
    fn test_rejects_zero_refresh_interval() {
        let err = Settings::from_json_str(r#"{ "refresh-interval-ms": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "refresh-interval-ms", .. }));
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(matches!(
            Settings::from_json_str("{ zoom: }"),
            Err(ConfigError::Parse(_))
        ));
    }
}
