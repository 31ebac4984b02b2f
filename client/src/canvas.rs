use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use pixelwar_shared::gesture::{InputEvent, TouchPoint};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{HtmlCanvasElement, PointerEvent, TouchEvent, WheelEvent};

use crate::app::Toast;
use crate::handle::MapHandle;
use crate::render_loop::RenderScheduler;
use crate::renderer::{CellBuffer, context_2d};

struct ResizeBinding {
    window: web_sys::Window,
    callback: Closure<dyn Fn()>,
}

thread_local! {
    static RESIZE_BINDING: RefCell<Option<ResizeBinding>> = const { RefCell::new(None) };
}

fn unbind_resize() {
    RESIZE_BINDING.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            old.window
                .remove_event_listener_with_callback("resize", old.callback.as_ref().unchecked_ref())
                .ok();
        }
    });
}

fn bind_resize(on_resize: impl Fn() + 'static) {
    unbind_resize();
    let Some(window) = web_sys::window() else {
        return;
    };
    let callback = Closure::<dyn Fn()>::new(on_resize);
    if window
        .add_event_listener_with_callback("resize", callback.as_ref().unchecked_ref())
        .is_err()
    {
        return;
    }
    RESIZE_BINDING.with(|slot| {
        *slot.borrow_mut() = Some(ResizeBinding { window, callback });
    });
}

fn device_pixel_ratio() -> f64 {
    web_sys::window()
        .map(|w| w.device_pixel_ratio())
        .filter(|dpr| dpr.is_finite() && *dpr > 0.0)
        .unwrap_or(1.0)
}

/// Client coordinates relative to the canvas' top-left corner.
fn local_point(canvas_ref: NodeRef<leptos::html::Canvas>, client_x: f64, client_y: f64) -> (f64, f64) {
    canvas_ref
        .get_untracked()
        .map(|el| {
            let rect = el.get_bounding_client_rect();
            (client_x - rect.left(), client_y - rect.top())
        })
        .unwrap_or((client_x, client_y))
}

fn touch_points(e: &TouchEvent, canvas_ref: NodeRef<leptos::html::Canvas>) -> Vec<TouchPoint> {
    let touches = e.touches();
    (0..touches.length())
        .filter_map(|i| touches.get(i))
        .map(|t| {
            let (x, y) = local_point(canvas_ref, t.client_x() as f64, t.client_y() as f64);
            TouchPoint { x, y }
        })
        .collect()
}

#[component]
pub fn MapCanvas(map: MapHandle) -> impl IntoView {
    let Toast(toast) = expect_context();
    let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
    let buffer: Rc<RefCell<Option<CellBuffer>>> = Rc::new(RefCell::new(None));

    let render_map = map.clone();
    let scheduler = RenderScheduler::new(move || {
        let Some(canvas) = canvas_ref.get_untracked() else {
            return false;
        };
        let canvas: &HtmlCanvasElement = &canvas;
        let Some(parent) = canvas.parent_element() else {
            return false;
        };
        let w = parent.client_width() as f64;
        let h = parent.client_height() as f64;
        if w <= 0.0 || h <= 0.0 {
            return false;
        }

        let dpr = device_pixel_ratio();
        let pw = (w * dpr).round().max(1.0) as u32;
        let ph = (h * dpr).round().max(1.0) as u32;
        if canvas.width() != pw || canvas.height() != ph {
            canvas.set_width(pw);
            canvas.set_height(ph);
        }

        let resized = render_map.with(|s| s.viewport().width() != w || s.viewport().height() != h);
        if resized {
            render_map.update(|s| {
                s.handle_input(InputEvent::Resize { width: w, height: h }, js_sys::Date::now() as i64)
            });
        }

        let Some(ctx) = context_2d(canvas) else {
            return false;
        };
        let mut buffer = buffer.borrow_mut();
        let fresh = buffer.is_none();
        if fresh {
            match CellBuffer::new(render_map.with(|s| s.grid().dims())) {
                Ok(created) => *buffer = Some(created),
                Err(e) => {
                    web_sys::console::warn_1(&format!("Cell buffer unavailable: {e}").into());
                    return false;
                }
            }
        }
        let Some(cells) = buffer.as_mut() else {
            return false;
        };

        render_map.with_mut(|s| {
            let mut invalidation = s.take_invalidation();
            invalidation.full |= fresh;
            cells.apply(s.grid(), &invalidation);
            let hovered = s
                .hovered_cell()
                .filter(|&(x, y)| s.grid().is_paintable(x, y));
            cells.draw(
                &ctx,
                s.viewport(),
                dpr,
                hovered,
                s.config().grid_line_min_px,
            );
        });
        false
    });
    let scheduler = Rc::new(scheduler);

    let sched_redraw = scheduler.clone();
    let redraw = map.ui.redraw;
    Effect::new(move || {
        redraw.track();
        sched_redraw.mark_dirty();
    });

    let sched_resize = scheduler.clone();
    bind_resize(move || sched_resize.mark_dirty());
    on_cleanup(unbind_resize);

    // Any input goes through the session; paint errors become a toast.
    let dispatch = move |map: &MapHandle, event: InputEvent| {
        let outcome = map.update(|s| s.handle_input(event, js_sys::Date::now() as i64));
        if let Some(Err(e)) = outcome.paint {
            toast.set(Some(e.to_string()));
        }
    };

    let on_wheel = {
        let map = map.clone();
        move |e: WheelEvent| {
            e.prevent_default();
            let (x, y) = local_point(canvas_ref, e.client_x() as f64, e.client_y() as f64);
            dispatch(&map, InputEvent::Wheel { x, y, delta_y: e.delta_y() });
        }
    };

    let on_pointer_down = {
        let map = map.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            if let Some(target) = e.target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.set_pointer_capture(e.pointer_id()).ok();
                el.style().set_property("cursor", "grabbing").ok();
            }
            let (x, y) = local_point(canvas_ref, e.client_x() as f64, e.client_y() as f64);
            dispatch(&map, InputEvent::PointerDown { x, y, button: e.button() });
        }
    };

    let on_pointer_move = {
        let map = map.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            let (x, y) = local_point(canvas_ref, e.client_x() as f64, e.client_y() as f64);
            dispatch(&map, InputEvent::PointerMove { x, y });
        }
    };

    let on_pointer_up = {
        let map = map.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            if let Some(target) = e.target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.style().set_property("cursor", "grab").ok();
            }
            let (x, y) = local_point(canvas_ref, e.client_x() as f64, e.client_y() as f64);
            dispatch(&map, InputEvent::PointerUp { x, y });
        }
    };

    let on_pointer_leave = {
        let map = map.clone();
        move |e: PointerEvent| {
            if e.pointer_type() == "touch" {
                return;
            }
            dispatch(&map, InputEvent::PointerLeave);
        }
    };

    let on_touch_start = {
        let map = map.clone();
        move |e: TouchEvent| {
            e.prevent_default();
            let touches = touch_points(&e, canvas_ref);
            dispatch(&map, InputEvent::TouchStart { touches });
        }
    };

    let on_touch_move = {
        let map = map.clone();
        move |e: TouchEvent| {
            e.prevent_default();
            let touches = touch_points(&e, canvas_ref);
            dispatch(&map, InputEvent::TouchMove { touches });
        }
    };

    let on_touch_end = {
        let map = map.clone();
        move |e: TouchEvent| {
            e.prevent_default();
            let touches = touch_points(&e, canvas_ref);
            dispatch(&map, InputEvent::TouchEnd { touches });
        }
    };

    view! {
        <div style="position: absolute; inset: 0; overflow: hidden;">
            <canvas
                node_ref=canvas_ref
                style="position: absolute; inset: 0; width: 100%; height: 100%; touch-action: none; image-rendering: pixelated; cursor: grab;"
                on:wheel=on_wheel
                on:pointerdown=on_pointer_down
                on:pointermove=on_pointer_move
                on:pointerup=on_pointer_up
                on:pointerleave=on_pointer_leave
                on:touchstart=on_touch_start
                on:touchmove=on_touch_move
                on:touchend=on_touch_end.clone()
                on:touchcancel=on_touch_end
            />
        </div>
    }
}
