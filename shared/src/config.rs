use crate::raster::{Extent, ExtentPolicy, GridDims};

/// Per-deployment game rules.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub grid: GridDims,
    pub extent: ExtentPolicy,
    pub cooldown_ms: i64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Zoom multiplier applied per wheel tick.
    pub wheel_step: f64,
    /// Max pointer travel, in CSS pixels, for a press/release to count as a paint.
    pub tap_threshold: f64,
    /// Smallest on-screen cell size that gets grid lines.
    pub grid_line_min_px: f64,
    pub require_auth: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid: GridDims::new(200, 100),
            extent: ExtentPolicy::Fixed(Extent::TURKEY),
            cooldown_ms: 5 * 60 * 1000,
            min_zoom: 0.5,
            max_zoom: 20.0,
            wheel_step: 1.1,
            tap_threshold: 5.0,
            grid_line_min_px: 4.0,
            require_auth: false,
        }
    }
}

impl GameConfig {
    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }
}
