use std::cell::{Cell, RefCell};
use std::rc::Rc;

use leptos::prelude::*;
use pixelwar_shared::boundary::FeatureCollection;
use pixelwar_shared::store::{StorePath, paint_time_path, pixels_path, presence_root};
use pixelwar_shared::{GameConfig, MapSession};
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::canvas::MapCanvas;
use crate::colors::{color_css, contrast_css};
use crate::handle::MapHandle;
use crate::identity;
use crate::storage;
use crate::store::{ConnectionStatus, Subscription};
use crate::ticker;

const DATASET_URL: &str = "/regions.json";
const TOAST_MS: u32 = 3_500;
const RESET_PROMPT: &str = "Reset the whole map? Every claimed pixel is cleared for everyone.";

/// Transient message shown over the map.
#[derive(Clone, Copy)]
pub(crate) struct Toast(pub RwSignal<Option<String>>);

struct VisibilityBinding {
    document: web_sys::Document,
    callback: Closure<dyn Fn()>,
}

thread_local! {
    static VISIBILITY_BINDING: RefCell<Option<VisibilityBinding>> = const { RefCell::new(None) };
    static PIXELS_SUB: RefCell<Option<Subscription>> = const { RefCell::new(None) };
    static PRESENCE_SUB: RefCell<Option<Subscription>> = const { RefCell::new(None) };
    static PAINT_TIME_SUB: RefCell<Option<Subscription>> = const { RefCell::new(None) };
}

type SubscriptionSlot = std::thread::LocalKey<RefCell<Option<Subscription>>>;

fn replace_subscription(slot: &'static SubscriptionSlot, next: Option<Subscription>) {
    slot.with(|slot| {
        let mut slot = slot.borrow_mut();
        if let Some(old) = slot.take() {
            old.close();
        }
        *slot = next;
    });
}

fn unbind_visibility() {
    VISIBILITY_BINDING.with(|slot| {
        if let Some(old) = slot.borrow_mut().take() {
            old.document
                .remove_event_listener_with_callback(
                    "visibilitychange",
                    old.callback.as_ref().unchecked_ref(),
                )
                .ok();
        }
    });
}

/// Run `on_visible` whenever the tab is shown again.
fn bind_visibility(on_visible: impl Fn() + 'static) {
    unbind_visibility();
    let Some(document) = web_sys::window().and_then(|w| w.document()) else {
        return;
    };
    let visible_document = document.clone();
    let callback = Closure::<dyn Fn()>::new(move || {
        if !visible_document.hidden() {
            on_visible();
        }
    });
    if document
        .add_event_listener_with_callback("visibilitychange", callback.as_ref().unchecked_ref())
        .is_err()
    {
        return;
    }
    VISIBILITY_BINDING.with(|slot| {
        *slot.borrow_mut() = Some(VisibilityBinding { document, callback });
    });
}

fn disconnect_all() {
    unbind_visibility();
    replace_subscription(&PIXELS_SUB, None);
    replace_subscription(&PRESENCE_SUB, None);
    replace_subscription(&PAINT_TIME_SUB, None);
    ticker::stop();
}

async fn fetch_regions() -> Result<FeatureCollection, String> {
    let resp = gloo_net::http::Request::get(DATASET_URL)
        .send()
        .await
        .map_err(|e| format!("fetch error: {e}"))?;
    if !resp.ok() {
        return Err(format!("HTTP {}", resp.status()));
    }
    resp.json::<FeatureCollection>()
        .await
        .map_err(|e| format!("parse error: {e}"))
}

fn subscribe(
    slot: &'static SubscriptionSlot,
    path: &StorePath,
    map: &MapHandle,
    connection: RwSignal<ConnectionStatus>,
    on_value: impl Fn(&MapHandle, Value) + 'static,
) {
    let client_id = map.with(|s| s.client_id().to_string());
    let handler_map = map.clone();
    match Subscription::open(path, &client_id, connection, move |value| {
        on_value(&handler_map, value)
    }) {
        Ok(subscription) => replace_subscription(slot, Some(subscription)),
        Err(e) => {
            connection.set(ConnectionStatus::Reconnecting);
            web_sys::console::warn_1(&format!("Subscribe to {path} failed: {e}").into());
        }
    }
}

/// Claims and presence, opened once the grid is rasterized.
fn connect_map(map: &MapHandle, connection: RwSignal<ConnectionStatus>) {
    subscribe(&PIXELS_SUB, &pixels_path(), map, connection, |map, value| {
        let result = map.update(|s| s.apply_remote_claims(&value));
        if result.dropped > 0 {
            web_sys::console::info_1(
                &format!("Ignored {} malformed or out-of-range claim keys", result.dropped).into(),
            );
        }
    });
    subscribe(&PRESENCE_SUB, &presence_root(), map, connection, |map, value| {
        map.update(|s| s.apply_presence(&value));
    });
}

/// Switch the signed-in identity: the paint-time stream and the cooldown tick restart.
fn set_identity(
    map: &MapHandle,
    user: Option<String>,
    connection: RwSignal<ConnectionStatus>,
    cooldown_text: RwSignal<String>,
) {
    ticker::stop();
    replace_subscription(&PAINT_TIME_SUB, None);
    map.update(|s| s.set_user(user.clone()));

    if let Some(user) = user.as_deref() {
        match paint_time_path(user) {
            Ok(path) => subscribe(&PAINT_TIME_SUB, &path, map, connection, |map, value| {
                map.update(|s| s.apply_remote_paint_time(&value, js_sys::Date::now() as i64));
            }),
            Err(e) => web_sys::console::warn_1(
                &format!("User id {user:?} is not a store key ({e}); paint time stays local").into(),
            ),
        }
    }
    ticker::start(map.clone(), cooldown_text);
}

#[component]
pub fn App() -> impl IntoView {
    let local = storage::load_session();
    let map = MapHandle::new(MapSession::new(GameConfig::default(), local.clone()), &local);
    let ui = map.ui;

    let toast: RwSignal<Option<String>> = RwSignal::new(None);
    provide_context(Toast(toast));
    let connection: RwSignal<ConnectionStatus> = RwSignal::new(ConnectionStatus::Connecting);
    let cooldown_text: RwSignal<String> = RwSignal::new(String::new());
    let selector_open: RwSignal<bool> = RwSignal::new(local.region.is_none());
    let signed_in: RwSignal<Option<String>> = RwSignal::new(None);
    let dataset_ready: RwSignal<bool> = RwSignal::new(false);

    // Boot: dataset first so remote claims land on a rasterized grid.
    {
        let map = map.clone();
        spawn_local(async move {
            match fetch_regions().await {
                Ok(collection) => {
                    let errors = map.update(|s| s.load_dataset(&collection));
                    for error in &errors {
                        web_sys::console::warn_1(&format!("Skipped region: {error}").into());
                    }
                    ui.region_names
                        .set(map.with(|s| s.region_names().to_vec()));
                    // Streams first: the presence registration needs our session attached.
                    connect_map(&map, connection);
                    match map.update(MapSession::restore_selection) {
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            web_sys::console::warn_1(
                                &format!("Saved region could not be restored: {e}").into(),
                            );
                            selector_open.set(true);
                        }
                        // Nothing saved, or the dataset no longer has it.
                        None => selector_open.set(true),
                    }
                    dataset_ready.set(true);
                }
                Err(e) => {
                    web_sys::console::warn_1(&format!("Region dataset unavailable: {e}").into());
                    toast.set(Some("Map data could not be loaded".to_string()));
                }
            }

            match identity::resolve_current_user().await {
                Ok(user) => {
                    signed_in.set(user.clone());
                    set_identity(&map, user, connection, cooldown_text);
                }
                Err(e) => {
                    web_sys::console::warn_1(&format!("Identity lookup failed: {e}").into());
                    ticker::start(map.clone(), cooldown_text);
                }
            }
        });
    }
    on_cleanup(disconnect_all);

    // Sign-in can change in another tab; check again when this one is shown.
    {
        let map = map.clone();
        bind_visibility(move || {
            let map = map.clone();
            spawn_local(async move {
                let resolved = match identity::resolve_current_user().await {
                    Ok(user) => user,
                    Err(e) => {
                        web_sys::console::warn_1(&format!("Identity lookup failed: {e}").into());
                        return;
                    }
                };
                let current = signed_in.get_untracked();
                if let Some(user) = identity::switch_to(current.as_deref(), resolved) {
                    signed_in.set(user.clone());
                    set_identity(&map, user, connection, cooldown_text);
                }
            });
        });
    }

    // Any change of the last paint time restarts the cooldown display.
    {
        let map = map.clone();
        Effect::new(move || {
            ui.last_paint_ms.track();
            ticker::start(map.clone(), cooldown_text);
        });
    }

    // Toasts clear themselves; a newer message restarts the timer.
    let toast_seq = Rc::new(Cell::new(0u64));
    Effect::new(move || {
        if toast.with(Option::is_none) {
            return;
        }
        let seq = toast_seq.get().wrapping_add(1);
        toast_seq.set(seq);
        let toast_seq = toast_seq.clone();
        spawn_local(async move {
            gloo_timers::future::TimeoutFuture::new(TOAST_MS).await;
            if toast_seq.get() == seq {
                toast.set(None);
            }
        });
    });

    let on_region_change = {
        let map = map.clone();
        move |ev: web_sys::Event| {
            let name = event_target_value(&ev);
            if name.is_empty() {
                return;
            }
            match map.update(|s| s.select_region(&name)) {
                Ok(()) => selector_open.set(false),
                Err(e) => toast.set(Some(e.to_string())),
            }
        }
    };

    let on_reset = {
        let map = map.clone();
        move |_: web_sys::MouseEvent| {
            let confirmed = web_sys::window()
                .and_then(|w| w.confirm_with_message(RESET_PROMPT).ok())
                .unwrap_or(false);
            if confirmed {
                map.update(|s| s.request_reset());
            }
        }
    };

    let region_label = move || match ui.selected_region.get() {
        Some(region) => region,
        None => "No region".to_string(),
    };
    let swatch_style = move || match ui.selected_color.get() {
        Some(color) => format!(
            "display: inline-block; width: 14px; height: 14px; border-radius: 3px; background: {}; border: 1px solid {};",
            color_css(color, 1.0),
            contrast_css(color)
        ),
        None => "display: none;".to_string(),
    };
    let status_text = move || match connection.get() {
        ConnectionStatus::Connecting => "Connecting",
        ConnectionStatus::Live => "Live",
        ConnectionStatus::Reconnecting => "Reconnecting",
    };

    view! {
        <div style="position: fixed; inset: 0; background: #0c0f17; color: #e8e6e1; font-family: system-ui, sans-serif;">
            <MapCanvas map=map.clone() />

            <div style="position: absolute; top: 12px; left: 12px; display: flex; gap: 10px; align-items: center; padding: 8px 12px; border-radius: 8px; background: rgba(12,15,23,0.85);">
                <span style=swatch_style></span>
                <strong>{region_label}</strong>
                <button on:click=move |_| selector_open.set(true)>"Change region"</button>
                <span style="min-width: 150px;">{move || cooldown_text.get()}</span>
                <button on:click=on_reset>"Reset map"</button>
                <span style="opacity: 0.6; font-size: 12px;">{status_text}</span>
                <span style="opacity: 0.6; font-size: 12px;">
                    {move || signed_in.get().unwrap_or_default()}
                </span>
            </div>

            <Show when=move || ui.hover.with(Option::is_some)>
                <div style="position: absolute; bottom: 12px; left: 12px; padding: 6px 10px; border-radius: 6px; background: rgba(12,15,23,0.85); pointer-events: none;">
                    {move || ui.hover.get().map(|info| info.to_string()).unwrap_or_default()}
                </div>
            </Show>

            <Show when=move || toast.with(Option::is_some)>
                <div style="position: absolute; top: 64px; left: 50%; transform: translateX(-50%); padding: 8px 14px; border-radius: 6px; background: rgba(180,40,40,0.92);">
                    {move || toast.get().unwrap_or_default()}
                </div>
            </Show>

            <div style=move || {
                if selector_open.get() && dataset_ready.get() {
                    "position: absolute; inset: 0; display: flex; align-items: center; justify-content: center; background: rgba(0,0,0,0.55);"
                } else {
                    "display: none;"
                }
            }>
                <div style="padding: 18px 22px; border-radius: 10px; background: #161a26; display: flex; flex-direction: column; gap: 10px;">
                    <strong>"Choose your region"</strong>
                    <select on:change=on_region_change>
                        <option value="" selected=move || ui.selected_region.with(Option::is_none)>
                            "Select a region"
                        </option>
                        {move || {
                            let current = ui.selected_region.get();
                            ui.region_names
                                .get()
                                .into_iter()
                                .map(|name| {
                                    let selected = current.as_deref() == Some(name.as_str());
                                    view! {
                                        <option value=name.clone() selected=selected>{name.clone()}</option>
                                    }
                                })
                                .collect_view()
                        }}
                    </select>
                    <button on:click=move |_| selector_open.set(false)>"Close"</button>
                </div>
            </div>
        </div>
    }
}
