use bon::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ViewerError;

// ============================================================================
// COLOUR CONFIGURATION
// ============================================================================

/// Colour representation for display elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const BLACK: Colour = Colour::new(0x00, 0x00, 0x00);
    pub const WHITE: Colour = Colour::new(0xff, 0xff, 0xff);
    pub const RED: Colour = Colour::new(0xff, 0x00, 0x00);
    pub const GREEN: Colour = Colour::new(0x00, 0xff, 0x00);
    pub const YELLOW: Colour = Colour::new(0xff, 0xff, 0x00);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Colours used when building a scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub background: Colour,
    pub grid: Colour,
    pub grid_text: Colour,
    pub object: Colour,
    pub label: Colour,
    pub vehicle: Colour,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            background: Colour::BLACK,
            grid: Colour::new(0x00, 0x60, 0x00),
            grid_text: Colour::new(0x00, 0xa0, 0x00),
            object: Colour::RED,
            label: Colour::WHITE,
            vehicle: Colour::YELLOW,
        }
    }
}

// ============================================================================
// VIEWER CONFIGURATION
// ============================================================================

/// Everything the renderer needs to come up. Serialised onto the command line
/// of the render process, so every field must round-trip through JSON.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[builder(default = "Proximity".to_string())]
    pub title: String,

    // Window configuration
    #[builder(default = 800)]
    pub window_width: u32,
    #[builder(default = 600)]
    pub window_height: u32,

    // View configuration
    #[builder(default = 10.0)]
    pub zoom_range: f64,
    #[builder(default = 1.0)]
    pub zoom_increment: f64,
    #[builder(default = true)]
    pub grid: bool,
    #[builder(default = true)]
    pub relative: bool,
    #[builder(default = true)]
    pub distance_labels: bool,

    // Scheduler configuration
    #[builder(default = Duration::from_millis(200))]
    pub frame_interval: Duration,
    #[builder(default = Duration::from_secs(1))]
    pub layout_interval: Duration,
    #[builder(default = Duration::from_millis(50))]
    pub tick_interval: Duration,

    // Object appearance
    #[builder(default = 10.0)]
    pub pick_radius: f64,
    #[builder(default = 4)]
    pub marker_radius: i32,
    #[builder(default = 2.0)]
    pub marker_line_width: f32,
    #[builder(default = 14)]
    pub vehicle_size: i32,

    // Font configuration
    pub font_path: Option<PathBuf>,
    #[builder(default = 16.0)]
    pub label_font_size: f32,

    #[builder(default)]
    pub palette: Palette,

    #[builder(default = false)]
    pub debug: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ViewerConfig {
    /// Reject values the render process could not decode or draw with.
    ///
    /// JSON has no encoding for NaN or infinity, so these must be caught
    /// before the config is put on the render process command line.
    pub fn validate(&self) -> Result<(), ViewerError> {
        positive("zoom_range", self.zoom_range)?;
        positive("zoom_increment", self.zoom_increment)?;
        finite("pick_radius", self.pick_radius)?;
        finite("marker_line_width", f64::from(self.marker_line_width))?;
        positive("label_font_size", f64::from(self.label_font_size))?;
        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> Result<(), ViewerError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ViewerError::InvalidConfig { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ViewerError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ViewerError::InvalidConfig { field, value })
    }
}
