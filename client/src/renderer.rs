use pixelwar_shared::grid::GridState;
use pixelwar_shared::raster::GridDims;
use pixelwar_shared::session::Invalidation;
use pixelwar_shared::viewport::Viewport;
use wasm_bindgen::{Clamped, JsCast};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, ImageData};

use crate::colors::rgba_css;

const BACKGROUND: &str = "#0c0f17";
const HOVER_OUTLINE: &str = "rgba(255,255,255,0.9)";

pub(crate) fn context_2d(canvas: &HtmlCanvasElement) -> Option<CanvasRenderingContext2d> {
    canvas
        .get_context("2d")
        .ok()
        .flatten()
        .and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok())
}

/// Off-screen canvas holding exactly one pixel per grid cell.
pub(crate) struct CellBuffer {
    canvas: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    dims: GridDims,
    rgba: Vec<u8>,
}

impl CellBuffer {
    pub fn new(dims: GridDims) -> Result<Self, String> {
        let document = web_sys::window()
            .and_then(|w| w.document())
            .ok_or_else(|| "no document".to_string())?;
        let canvas = document
            .create_element("canvas")
            .map_err(|_| "failed to create buffer canvas".to_string())?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| "buffer element is not a canvas".to_string())?;
        canvas.set_width(dims.cols);
        canvas.set_height(dims.rows);
        let ctx = context_2d(&canvas).ok_or_else(|| "no 2d context for buffer".to_string())?;
        Ok(Self {
            canvas,
            ctx,
            dims,
            rgba: vec![0; dims.len() * 4],
        })
    }

    /// Bring the buffer up to date with `grid`.
    pub fn apply(&mut self, grid: &GridState, invalidation: &Invalidation) {
        if invalidation.full {
            self.rebuild(grid);
            return;
        }
        for key in &invalidation.cells {
            self.patch(grid, key.x, key.y);
        }
    }

    fn rebuild(&mut self, grid: &GridState) {
        for (pixel, color) in self.rgba.chunks_exact_mut(4).zip(grid.colors()) {
            let bytes = color.map_or([0; 4], |c| c.to_rgba_bytes());
            pixel.copy_from_slice(&bytes);
        }
        match ImageData::new_with_u8_clamped_array_and_sh(
            Clamped(self.rgba.as_slice()),
            self.dims.cols,
            self.dims.rows,
        ) {
            Ok(image) => {
                let _ = self.ctx.put_image_data(&image, 0.0, 0.0);
            }
            Err(_) => web_sys::console::warn_1(&"Failed to build cell image".into()),
        }
    }

    fn patch(&mut self, grid: &GridState, x: u32, y: u32) {
        if !self.dims.contains(x, y) {
            return;
        }
        let (fx, fy) = (x as f64, y as f64);
        match grid.get(x, y) {
            Some(color) => {
                self.ctx.set_fill_style_str(&rgba_css(color.r, color.g, color.b, 1.0));
                self.ctx.fill_rect(fx, fy, 1.0, 1.0);
            }
            None => self.ctx.clear_rect(fx, fy, 1.0, 1.0),
        }
    }

    /// Draw one frame onto the visible canvas. `scale` is the device pixel ratio.
    pub fn draw(
        &self,
        ctx: &CanvasRenderingContext2d,
        vp: &Viewport,
        scale: f64,
        hovered: Option<(u32, u32)>,
        grid_line_min_px: f64,
    ) {
        let _ = ctx.set_transform(scale, 0.0, 0.0, scale, 0.0, 0.0);
        ctx.set_fill_style_str(BACKGROUND);
        ctx.fill_rect(0.0, 0.0, vp.width(), vp.height());

        ctx.set_image_smoothing_enabled(false);
        let _ = ctx.draw_image_with_html_canvas_element_and_dw_and_dh(
            &self.canvas,
            vp.offset_x,
            vp.offset_y,
            vp.grid_width_px(),
            vp.grid_height_px(),
        );

        if let Some(style) = vp.grid_line_style(grid_line_min_px)
            && style.alpha > 0.0
        {
            self.draw_grid_lines(ctx, vp, style.alpha, style.width);
        }

        if let Some((x, y)) = hovered {
            let size = vp.pixel_size();
            let (sx, sy) = vp.grid_to_screen(x as f64, y as f64);
            ctx.set_stroke_style_str(HOVER_OUTLINE);
            ctx.set_line_width(1.5);
            ctx.stroke_rect(sx, sy, size, size);
        }
    }

    fn draw_grid_lines(&self, ctx: &CanvasRenderingContext2d, vp: &Viewport, alpha: f64, width: f64) {
        let Some(((x0, y0), (x1, y1))) = vp.visible_cells() else {
            return;
        };
        let size = vp.pixel_size();
        let (left, top) = vp.grid_to_screen(x0 as f64, y0 as f64);
        let (right, bottom) = vp.grid_to_screen((x1 + 1) as f64, (y1 + 1) as f64);

        ctx.begin_path();
        for col in x0..=x1 + 1 {
            let sx = left + (col - x0) as f64 * size;
            ctx.move_to(sx, top);
            ctx.line_to(sx, bottom);
        }
        for row in y0..=y1 + 1 {
            let sy = top + (row - y0) as f64 * size;
            ctx.move_to(left, sy);
            ctx.line_to(right, sy);
        }
        ctx.set_stroke_style_str(&rgba_css(0, 0, 0, alpha));
        ctx.set_line_width(width);
        ctx.stroke();
    }
}
