/// Pan/zoom transform between screen pixels and grid cells.
///
/// At zoom 1 the whole grid fits the surface (`base_pixel_size`); `offset_*`
/// is the screen position of the grid's top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub offset_x: f64,
    pub offset_y: f64,
    pub zoom: f64,
    width: f64,
    height: f64,
    cols: u32,
    rows: u32,
    min_zoom: f64,
    max_zoom: f64,
    centered: bool,
}

/// Stroke settings for the grid-line overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLineStyle {
    pub alpha: f64,
    pub width: f64,
}

impl Viewport {
    pub fn new(cols: u32, rows: u32, min_zoom: f64, max_zoom: f64) -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            zoom: 1.0_f64.clamp(min_zoom, max_zoom),
            width: 0.0,
            height: 0.0,
            cols,
            rows,
            min_zoom,
            max_zoom,
            centered: false,
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn has_surface(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.cols > 0 && self.rows > 0
    }

    /// Cell size at zoom 1.
    pub fn base_pixel_size(&self) -> f64 {
        if !self.has_surface() {
            return 0.0;
        }
        (self.width / self.cols as f64).min(self.height / self.rows as f64)
    }

    pub fn pixel_size(&self) -> f64 {
        self.base_pixel_size() * self.zoom
    }

    pub fn grid_width_px(&self) -> f64 {
        self.cols as f64 * self.pixel_size()
    }

    pub fn grid_height_px(&self) -> f64 {
        self.rows as f64 * self.pixel_size()
    }

    /// Fractional grid coordinates under a screen point.
    pub fn screen_to_grid(&self, sx: f64, sy: f64) -> (f64, f64) {
        let size = self.pixel_size();
        if size <= 0.0 {
            return (f64::NAN, f64::NAN);
        }
        ((sx - self.offset_x) / size, (sy - self.offset_y) / size)
    }

    /// Screen position of a cell's top-left corner.
    pub fn grid_to_screen(&self, gx: f64, gy: f64) -> (f64, f64) {
        let size = self.pixel_size();
        (gx * size + self.offset_x, gy * size + self.offset_y)
    }

    /// Cell under a screen point, or `None` outside the grid.
    pub fn cell_at(&self, sx: f64, sy: f64) -> Option<(u32, u32)> {
        let (gx, gy) = self.screen_to_grid(sx, sy);
        let (gx, gy) = (gx.floor(), gy.floor());
        if !(gx >= 0.0 && gy >= 0.0 && gx < self.cols as f64 && gy < self.rows as f64) {
            return None;
        }
        Some((gx as u32, gy as u32))
    }

    /// Set zoom, keeping the screen point `(fx, fy)` over the same grid position.
    pub fn zoom_to(&mut self, zoom: f64, fx: f64, fy: f64) {
        let new_zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        let ratio = new_zoom / self.zoom;
        self.offset_x = fx - (fx - self.offset_x) * ratio;
        self.offset_y = fy - (fy - self.offset_y) * ratio;
        self.zoom = new_zoom;
    }

    /// One wheel tick: in when `delta_y < 0`, out otherwise.
    pub fn wheel(&mut self, delta_y: f64, step: f64, fx: f64, fy: f64) {
        let factor = if delta_y < 0.0 { step } else { 1.0 / step };
        self.zoom_to(self.zoom * factor, fx, fy);
    }

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// Keep at least half a screen of grid in view.
    pub fn clamp_offsets(&mut self) {
        if !self.has_surface() {
            return;
        }
        let (half_w, half_h) = (self.width / 2.0, self.height / 2.0);
        self.offset_x = self.offset_x.clamp(half_w - self.grid_width_px(), half_w);
        self.offset_y = self.offset_y.clamp(half_h - self.grid_height_px(), half_h);
    }

    /// Update the surface size. The first usable size centers the grid.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
        if !self.centered && self.has_surface() {
            self.center();
            self.centered = true;
        }
        self.clamp_offsets();
    }

    pub fn center(&mut self) {
        self.offset_x = (self.width - self.grid_width_px()) / 2.0;
        self.offset_y = (self.height - self.grid_height_px()) / 2.0;
    }

    /// `None` when cells are too small to outline.
    pub fn grid_line_style(&self, min_px: f64) -> Option<GridLineStyle> {
        if self.pixel_size() < min_px {
            return None;
        }
        Some(GridLineStyle {
            alpha: ((self.zoom - 1.0) * 0.7).clamp(0.0, 1.0),
            width: (0.25 * self.zoom).max(0.15),
        })
    }

    /// Inclusive range of cells touching the visible surface.
    pub fn visible_cells(&self) -> Option<((u32, u32), (u32, u32))> {
        if !self.has_surface() {
            return None;
        }
        let (x0, y0) = self.screen_to_grid(0.0, 0.0);
        let (x1, y1) = self.screen_to_grid(self.width, self.height);
        let clamp_x = |v: f64| v.floor().clamp(0.0, self.cols as f64 - 1.0) as u32;
        let clamp_y = |v: f64| v.floor().clamp(0.0, self.rows as f64 - 1.0) as u32;
        if x1 < 0.0 || y1 < 0.0 || x0 >= self.cols as f64 || y0 >= self.rows as f64 {
            return None;
        }
        Some(((clamp_x(x0), clamp_y(y0)), (clamp_x(x1), clamp_y(y1))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        let mut vp = Viewport::new(200, 100, 0.5, 20.0);
        vp.resize(1000.0, 600.0);
        vp
    }

    #[test]
    fn first_resize_centers_the_grid() {
        let vp = viewport();
        // min(1000/200, 600/100) = 5 px per cell, grid is 1000 x 500.
        assert_eq!(vp.pixel_size(), 5.0);
        assert_eq!(vp.offset_x, 0.0);
        assert_eq!(vp.offset_y, 50.0);
    }

    #[test]
    fn later_resizes_keep_the_pan() {
        let mut vp = viewport();
        vp.pan(-40.0, 10.0);
        vp.resize(900.0, 600.0);
        assert_eq!(vp.offset_x, -40.0);
        assert_eq!(vp.offset_y, 60.0);
    }

    #[test]
    fn round_trip_stays_within_one_cell_for_any_zoom() {
        let mut vp = viewport();
        let mut zoom = 0.5;
        while zoom <= 20.0 {
            vp.zoom_to(zoom, 321.0, 123.0);
            for (gx, gy) in [(0.0, 0.0), (17.3, 42.9), (199.5, 99.5)] {
                let (sx, sy) = vp.grid_to_screen(gx, gy);
                let (bx, by) = vp.screen_to_grid(sx, sy);
                assert!((bx - gx).abs() <= 1.0, "zoom {zoom}: x {bx} vs {gx}");
                assert!((by - gy).abs() <= 1.0, "zoom {zoom}: y {by} vs {gy}");
            }
            zoom += 0.75;
        }
    }

    #[test]
    fn zoom_keeps_focus_point_stationary() {
        let mut vp = viewport();
        let before = vp.screen_to_grid(400.0, 300.0);
        vp.wheel(-1.0, 1.1, 400.0, 300.0);
        assert!((vp.zoom - 1.1).abs() < 1e-12);
        let after = vp.screen_to_grid(400.0, 300.0);
        assert!((before.0 - after.0).abs() < 1e-9);
        assert!((before.1 - after.1).abs() < 1e-9);

        vp.wheel(1.0, 1.1, 400.0, 300.0);
        assert!((vp.zoom - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut vp = viewport();
        vp.zoom_to(100.0, 0.0, 0.0);
        assert_eq!(vp.zoom, 20.0);
        vp.zoom_to(0.01, 0.0, 0.0);
        assert_eq!(vp.zoom, 0.5);
    }

    #[test]
    fn cell_at_floors_and_rejects_outside() {
        let vp = viewport();
        assert_eq!(vp.cell_at(0.0, 50.0), Some((0, 0)));
        assert_eq!(vp.cell_at(12.0, 57.0), Some((2, 1)));
        assert_eq!(vp.cell_at(999.0, 549.0), Some((199, 99)));
        assert_eq!(vp.cell_at(10.0, 10.0), None);
        assert_eq!(vp.cell_at(-0.1, 60.0), None);
        assert_eq!(vp.cell_at(500.0, 550.0), None);
    }

    #[test]
    fn offsets_clamp_to_half_screen() {
        let mut vp = viewport();
        vp.pan(10_000.0, 10_000.0);
        vp.clamp_offsets();
        assert_eq!((vp.offset_x, vp.offset_y), (500.0, 300.0));
        vp.pan(-20_000.0, -20_000.0);
        vp.clamp_offsets();
        assert_eq!((vp.offset_x, vp.offset_y), (500.0 - 1000.0, 300.0 - 500.0));
    }

    #[test]
    fn grid_lines_need_four_pixel_cells() {
        let mut vp = viewport();
        vp.zoom_to(0.5, 0.0, 0.0);
        // 2.5 px cells.
        assert_eq!(vp.grid_line_style(4.0), None);

        vp.zoom_to(1.0, 0.0, 0.0);
        let style = vp.grid_line_style(4.0).expect("5 px cells get lines");
        assert_eq!(style.alpha, 0.0);
        assert_eq!(style.width, 0.25);

        vp.zoom_to(4.0, 0.0, 0.0);
        let style = vp.grid_line_style(4.0).expect("20 px cells get lines");
        assert_eq!(style.alpha, 1.0);
        assert_eq!(style.width, 1.0);
    }

    #[test]
    fn empty_surface_maps_nothing() {
        let vp = Viewport::new(200, 100, 0.5, 20.0);
        assert_eq!(vp.cell_at(10.0, 10.0), None);
        assert_eq!(vp.visible_cells(), None);
    }

    #[test]
    fn visible_cells_cover_the_screen() {
        let vp = viewport();
        assert_eq!(vp.visible_cells(), Some(((0, 0), (199, 99))));
    }
}
