use std::cell::{Cell, RefCell};
use std::rc::Rc;

use leptos::prelude::*;
use pixelwar_shared::cooldown::write_cooldown;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use crate::handle::MapHandle;

const TICK_MS: i32 = 1_000;

struct TickIntervalBinding {
    window: web_sys::Window,
    interval_id: Rc<Cell<Option<i32>>>,
    _callback: Closure<dyn Fn()>,
}

impl TickIntervalBinding {
    fn cancel(&self) {
        if let Some(id) = self.interval_id.take() {
            self.window.clear_interval_with_handle(id);
        }
    }
}

thread_local! {
    static COOLDOWN_TICK: RefCell<Option<TickIntervalBinding>> = const { RefCell::new(None) };
}

fn refresh(map: &MapHandle, display: RwSignal<String>) -> i64 {
    let remaining = map.with(|s| s.cooldown_remaining_ms(js_sys::Date::now() as i64));
    let mut text = String::with_capacity(24);
    write_cooldown(&mut text, remaining);
    if display.with_untracked(|current| *current != text) {
        display.set(text);
    }
    remaining
}

pub fn stop() {
    COOLDOWN_TICK.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            old.cancel();
        }
    });
}

/// Restart the once-a-second cooldown display. The tick stops itself at zero.
pub fn start(map: MapHandle, display: RwSignal<String>) {
    stop();
    if refresh(&map, display) <= 0 {
        return;
    }
    let Some(window) = web_sys::window() else {
        return;
    };

    let interval_id: Rc<Cell<Option<i32>>> = Rc::new(Cell::new(None));
    let tick_window = window.clone();
    let tick_id = interval_id.clone();
    let callback = Closure::<dyn Fn()>::new(move || {
        if refresh(&map, display) <= 0
            && let Some(id) = tick_id.take()
        {
            // The closure stays alive in the slot until the next start/stop.
            tick_window.clear_interval_with_handle(id);
        }
    });
    let Ok(id) = window.set_interval_with_callback_and_timeout_and_arguments_0(
        callback.as_ref().unchecked_ref(),
        TICK_MS,
    ) else {
        return;
    };
    interval_id.set(Some(id));

    COOLDOWN_TICK.with(|slot| {
        *slot.borrow_mut() = Some(TickIntervalBinding {
            window,
            interval_id,
            _callback: callback,
        });
    });
}
