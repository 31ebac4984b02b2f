//! Input state machine driving the viewport.
//!
//! Every pointer, wheel, touch and resize event goes through
//! [`ViewportController::handle`]; redraws only read the resulting state.

use crate::config::GameConfig;
use crate::viewport::Viewport;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// `button` follows DOM numbering: 0 is the primary button.
    PointerDown { x: f64, y: f64, button: i16 },
    PointerMove { x: f64, y: f64 },
    PointerUp { x: f64, y: f64 },
    PointerLeave,
    Wheel { x: f64, y: f64, delta_y: f64 },
    /// Touch events carry every touch still on the surface.
    TouchStart { touches: Vec<TouchPoint> },
    TouchMove { touches: Vec<TouchPoint> },
    TouchEnd { touches: Vec<TouchPoint> },
    Resize { width: f64, height: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureState {
    Idle,
    Dragging {
        origin_x: f64,
        origin_y: f64,
        offset_x: f64,
        offset_y: f64,
    },
    Pinching {
        start_distance: f64,
        start_zoom: f64,
        center_x: f64,
        center_y: f64,
    },
}

/// What the caller should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputResponse {
    pub redraw: bool,
    /// A completed tap on this cell: attempt to paint it.
    pub paint: Option<(u32, u32)>,
    /// Hovered cell changed (`Some(None)` means the pointer left the grid).
    pub hover: Option<Option<(u32, u32)>>,
}

#[derive(Debug, Clone)]
pub struct ViewportController {
    viewport: Viewport,
    state: GestureState,
    tap_threshold: f64,
    wheel_step: f64,
    /// Travel exceeded the tap threshold during the current gesture.
    moved: bool,
    /// A second finger joined during the current gesture.
    pinched: bool,
    hovered: Option<(u32, u32)>,
}

impl ViewportController {
    pub fn new(config: &GameConfig) -> Self {
        Self {
            viewport: Viewport::new(config.grid.cols, config.grid.rows, config.min_zoom, config.max_zoom),
            state: GestureState::Idle,
            tap_threshold: config.tap_threshold,
            wheel_step: config.wheel_step,
            moved: false,
            pinched: false,
            hovered: None,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn hovered(&self) -> Option<(u32, u32)> {
        self.hovered
    }

    pub fn handle(&mut self, event: InputEvent) -> InputResponse {
        let mut response = InputResponse::default();
        match event {
            InputEvent::PointerDown { x, y, button } => {
                if button == 0 {
                    self.begin_drag(x, y);
                }
            }
            InputEvent::PointerMove { x, y } => {
                if self.drag_to(x, y) {
                    response.redraw = true;
                }
                self.update_hover(x, y, &mut response);
            }
            InputEvent::PointerUp { x, y } => {
                if matches!(self.state, GestureState::Dragging { .. }) {
                    response.paint = self.finish_tap(x, y);
                }
            }
            InputEvent::PointerLeave => {
                if matches!(self.state, GestureState::Dragging { .. }) {
                    self.state = GestureState::Idle;
                }
                if self.hovered.take().is_some() {
                    response.hover = Some(None);
                }
            }
            InputEvent::Wheel { x, y, delta_y } => {
                if self.state == GestureState::Idle {
                    self.viewport.wheel(delta_y, self.wheel_step, x, y);
                    self.viewport.clamp_offsets();
                    response.redraw = true;
                    self.update_hover(x, y, &mut response);
                }
            }
            InputEvent::TouchStart { touches } => match touches.as_slice() {
                [t] if self.state == GestureState::Idle => self.begin_drag(t.x, t.y),
                [a, b, ..] => self.begin_pinch(*a, *b),
                _ => {}
            },
            InputEvent::TouchMove { touches } => match touches.as_slice() {
                [a, b, ..] => {
                    if let GestureState::Pinching { .. } = self.state {
                        self.pinch_to(*a, *b);
                    } else {
                        self.begin_pinch(*a, *b);
                    }
                    response.redraw = true;
                }
                [t] => {
                    if self.drag_to(t.x, t.y) {
                        response.redraw = true;
                    }
                }
                [] => {}
            },
            InputEvent::TouchEnd { touches } => match touches.as_slice() {
                [] => {
                    if matches!(self.state, GestureState::Dragging { .. }) {
                        response.paint = self.finish_tap_at_origin();
                    }
                    self.state = GestureState::Idle;
                }
                [t] if matches!(self.state, GestureState::Pinching { .. }) => {
                    // Continue as a drag from the remaining finger; never a tap.
                    self.begin_drag(t.x, t.y);
                    self.pinched = true;
                }
                _ => {}
            },
            InputEvent::Resize { width, height } => {
                self.viewport.resize(width, height);
                response.redraw = true;
            }
        }
        response
    }

    fn begin_drag(&mut self, x: f64, y: f64) {
        self.state = GestureState::Dragging {
            origin_x: x,
            origin_y: y,
            offset_x: self.viewport.offset_x,
            offset_y: self.viewport.offset_y,
        };
        self.moved = false;
        self.pinched = false;
    }

    fn drag_to(&mut self, x: f64, y: f64) -> bool {
        let GestureState::Dragging {
            origin_x,
            origin_y,
            offset_x,
            offset_y,
        } = self.state
        else {
            return false;
        };
        let (dx, dy) = (x - origin_x, y - origin_y);
        if dx.abs() > self.tap_threshold || dy.abs() > self.tap_threshold {
            self.moved = true;
        }
        self.viewport.offset_x = offset_x + dx;
        self.viewport.offset_y = offset_y + dy;
        self.viewport.clamp_offsets();
        true
    }

    fn finish_tap(&mut self, x: f64, y: f64) -> Option<(u32, u32)> {
        let GestureState::Dragging {
            origin_x, origin_y, ..
        } = self.state
        else {
            return None;
        };
        self.state = GestureState::Idle;
        let travelled =
            (x - origin_x).abs() > self.tap_threshold || (y - origin_y).abs() > self.tap_threshold;
        if self.moved || self.pinched || travelled {
            return None;
        }
        self.viewport.cell_at(x, y)
    }

    fn finish_tap_at_origin(&mut self) -> Option<(u32, u32)> {
        let GestureState::Dragging {
            origin_x, origin_y, ..
        } = self.state
        else {
            return None;
        };
        self.finish_tap(origin_x, origin_y)
    }

    fn begin_pinch(&mut self, a: TouchPoint, b: TouchPoint) {
        let distance = touch_distance(a, b);
        self.pinched = true;
        if distance <= 0.0 {
            return;
        }
        self.state = GestureState::Pinching {
            start_distance: distance,
            start_zoom: self.viewport.zoom,
            center_x: (a.x + b.x) / 2.0,
            center_y: (a.y + b.y) / 2.0,
        };
    }

    fn pinch_to(&mut self, a: TouchPoint, b: TouchPoint) {
        let GestureState::Pinching {
            start_distance,
            start_zoom,
            center_x,
            center_y,
        } = self.state
        else {
            return;
        };
        let zoom = start_zoom * touch_distance(a, b) / start_distance;
        self.viewport.zoom_to(zoom, center_x, center_y);
        self.viewport.clamp_offsets();
    }

    fn update_hover(&mut self, x: f64, y: f64, response: &mut InputResponse) {
        let cell = self.viewport.cell_at(x, y);
        if cell != self.hovered {
            self.hovered = cell;
            response.hover = Some(cell);
        }
    }
}

fn touch_distance(a: TouchPoint, b: TouchPoint) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ViewportController {
        let mut c = ViewportController::new(&GameConfig::default());
        c.handle(InputEvent::Resize {
            width: 1000.0,
            height: 600.0,
        });
        c
    }

    fn touch(x: f64, y: f64) -> TouchPoint {
        TouchPoint { x, y }
    }

    #[test]
    fn click_paints_the_cell_under_the_pointer() {
        let mut c = controller();
        c.handle(InputEvent::PointerDown { x: 12.0, y: 57.0, button: 0 });
        let r = c.handle(InputEvent::PointerUp { x: 13.0, y: 58.0 });
        assert_eq!(r.paint, Some((2, 1)));
        assert_eq!(c.state(), GestureState::Idle);
    }

    #[test]
    fn secondary_button_never_paints() {
        let mut c = controller();
        c.handle(InputEvent::PointerDown { x: 12.0, y: 57.0, button: 2 });
        let r = c.handle(InputEvent::PointerUp { x: 12.0, y: 57.0 });
        assert_eq!(r.paint, None);
    }

    #[test]
    fn drag_pans_and_suppresses_paint() {
        let mut c = controller();
        let start = c.viewport().offset_x;
        c.handle(InputEvent::PointerDown { x: 100.0, y: 100.0, button: 0 });
        let r = c.handle(InputEvent::PointerMove { x: 130.0, y: 100.0 });
        assert!(r.redraw);
        assert_eq!(c.viewport().offset_x, start + 30.0);

        // Coming back near the origin still counts as a drag.
        c.handle(InputEvent::PointerMove { x: 101.0, y: 100.0 });
        let r = c.handle(InputEvent::PointerUp { x: 101.0, y: 100.0 });
        assert_eq!(r.paint, None);
    }

    #[test]
    fn wheel_zooms_around_the_pointer() {
        let mut c = controller();
        let before = c.viewport().screen_to_grid(400.0, 300.0);
        let r = c.handle(InputEvent::Wheel { x: 400.0, y: 300.0, delta_y: -120.0 });
        assert!(r.redraw);
        assert!((c.viewport().zoom - 1.1).abs() < 1e-12);
        let after = c.viewport().screen_to_grid(400.0, 300.0);
        assert!((before.0 - after.0).abs() < 1e-9);
        assert!((before.1 - after.1).abs() < 1e-9);
    }

    #[test]
    fn pinch_keeps_midpoint_within_one_cell_and_never_paints() {
        let mut c = controller();
        let mid = (500.0, 300.0);
        let before = c.viewport().screen_to_grid(mid.0, mid.1);

        c.handle(InputEvent::TouchStart { touches: vec![touch(450.0, 300.0)] });
        c.handle(InputEvent::TouchStart {
            touches: vec![touch(450.0, 300.0), touch(550.0, 300.0)],
        });
        assert!(matches!(c.state(), GestureState::Pinching { .. }));
        c.handle(InputEvent::TouchMove {
            touches: vec![touch(350.0, 300.0), touch(650.0, 300.0)],
        });
        assert!((c.viewport().zoom - 3.0).abs() < 1e-9);

        let after = c.viewport().screen_to_grid(mid.0, mid.1);
        assert!((before.0 - after.0).abs() <= 1.0);
        assert!((before.1 - after.1).abs() <= 1.0);

        let r = c.handle(InputEvent::TouchEnd { touches: vec![touch(350.0, 300.0)] });
        assert_eq!(r.paint, None);
        let r = c.handle(InputEvent::TouchEnd { touches: vec![] });
        assert_eq!(r.paint, None);
        assert_eq!(c.state(), GestureState::Idle);
    }

    #[test]
    fn pinch_zoom_is_clamped() {
        let mut c = controller();
        c.handle(InputEvent::TouchStart {
            touches: vec![touch(490.0, 300.0), touch(510.0, 300.0)],
        });
        c.handle(InputEvent::TouchMove {
            touches: vec![touch(0.0, 300.0), touch(1000.0, 300.0)],
        });
        assert_eq!(c.viewport().zoom, 20.0);
    }

    #[test]
    fn single_touch_tap_paints() {
        let mut c = controller();
        c.handle(InputEvent::TouchStart { touches: vec![touch(12.0, 57.0)] });
        let r = c.handle(InputEvent::TouchEnd { touches: vec![] });
        assert_eq!(r.paint, Some((2, 1)));
    }

    #[test]
    fn hover_reports_changes_and_clears_on_leave() {
        let mut c = controller();
        let r = c.handle(InputEvent::PointerMove { x: 12.0, y: 57.0 });
        assert_eq!(r.hover, Some(Some((2, 1))));
        assert!(!r.redraw);
        let r = c.handle(InputEvent::PointerMove { x: 13.0, y: 57.0 });
        assert_eq!(r.hover, None);
        let r = c.handle(InputEvent::PointerLeave);
        assert_eq!(r.hover, Some(None));
        assert_eq!(c.hovered(), None);
    }
}
