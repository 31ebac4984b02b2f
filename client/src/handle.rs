use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use pixelwar_shared::session::HoverInfo;
use pixelwar_shared::{Color, LocalSession, MapSession};

use crate::storage;
use crate::store;

/// Reactive mirrors of session state the page chrome renders.
#[derive(Clone, Copy)]
pub(crate) struct UiSignals {
    pub selected_region: RwSignal<Option<String>>,
    pub selected_color: RwSignal<Option<Color>>,
    pub last_paint_ms: RwSignal<Option<i64>>,
    pub hover: RwSignal<Option<HoverInfo>>,
    pub region_names: RwSignal<Vec<String>>,
    /// Bumped whenever the map has invalidation for the renderer.
    pub redraw: RwSignal<u64>,
}

impl UiSignals {
    fn new(local: &LocalSession) -> Self {
        Self {
            selected_region: RwSignal::new(local.region.clone()),
            selected_color: RwSignal::new(local.color),
            last_paint_ms: RwSignal::new(local.last_paint_ms),
            hover: RwSignal::new(None),
            region_names: RwSignal::new(Vec::new()),
            redraw: RwSignal::new(0),
        }
    }
}

/// Shared owner of the map session. Every mutation goes through
/// [`MapHandle::update`], which flushes queued store writes, session
/// persistence and redraw requests once the borrow is released.
#[derive(Clone)]
pub(crate) struct MapHandle {
    session: Rc<RefCell<MapSession>>,
    pub ui: UiSignals,
}

impl MapHandle {
    pub fn new(session: MapSession, local: &LocalSession) -> Self {
        Self {
            session: Rc::new(RefCell::new(session)),
            ui: UiSignals::new(local),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&MapSession) -> R) -> R {
        f(&self.session.borrow())
    }

    /// Mutable access without the flush; the renderer uses this to take invalidation.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut MapSession) -> R) -> R {
        f(&mut self.session.borrow_mut())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut MapSession) -> R) -> R {
        let result = f(&mut self.session.borrow_mut());
        self.flush();
        result
    }

    fn flush(&self) {
        let (commands, client_id, changed, needs_redraw) = {
            let mut session = self.session.borrow_mut();
            (
                session.take_commands(),
                session.client_id().to_string(),
                session.take_session_changed(),
                session.needs_redraw(),
            )
        };
        store::dispatch(commands, client_id);

        if let Some(local) = changed {
            storage::save_session(&local);
            if self.ui.selected_region.get_untracked() != local.region {
                self.ui.selected_region.set(local.region);
            }
            if self.ui.last_paint_ms.get_untracked() != local.last_paint_ms {
                self.ui.last_paint_ms.set(local.last_paint_ms);
            }
        }

        let color = self.with(MapSession::selected_color);
        if self.ui.selected_color.get_untracked() != color {
            self.ui.selected_color.set(color);
        }

        let hover = self.with(MapSession::hover_info);
        if self.ui.hover.with_untracked(|current| *current != hover) {
            self.ui.hover.set(hover);
        }

        if needs_redraw {
            self.ui.redraw.update(|n| *n = n.wrapping_add(1));
        }
    }
}
