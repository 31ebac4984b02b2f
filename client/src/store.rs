//! Client side of the realtime store: SSE subscriptions and fire-and-forget writes.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use leptos::prelude::*;
use pixelwar_shared::store::{StoreCommand, StorePath};
use serde_json::Value;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{EventSource, MessageEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Live,
    Reconnecting,
}

/// Join segments with `/` after encoding each one.
fn join_segments(path: &StorePath, encode: impl Fn(&str) -> String) -> String {
    path.segments()
        .iter()
        .map(|segment| encode(segment))
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-encode each segment so region names survive the URL.
fn encoded_path(path: &StorePath) -> String {
    join_segments(path, |segment| {
        String::from(js_sys::encode_uri_component(segment))
    })
}

fn session_query(session: &str) -> String {
    String::from(js_sys::encode_uri_component(session))
}

thread_local! {
    static OUTBOX: RefCell<CommandQueue> = RefCell::new(CommandQueue::default());
    /// Subscriptions currently open, i.e. whether the server knows our session.
    static LIVE_STREAMS: Cell<usize> = const { Cell::new(0) };
}

fn set_live(live: &Cell<bool>, now: bool) {
    if live.replace(now) != now {
        LIVE_STREAMS.with(|n| {
            n.set(if now {
                n.get() + 1
            } else {
                n.get().saturating_sub(1)
            })
        });
    }
}

fn has_live_stream() -> bool {
    LIVE_STREAMS.with(Cell::get) > 0
}

/// One open `value` stream. Call [`Subscription::close`] to stop it.
pub struct Subscription {
    es: EventSource,
    live: Rc<Cell<bool>>,
    on_open: Closure<dyn Fn()>,
    on_error: Closure<dyn Fn()>,
    value_handler: Closure<dyn Fn(MessageEvent)>,
}

impl Subscription {
    /// Subscribe to `path`; `on_value` gets the whole subtree after every change.
    pub fn open(
        path: &StorePath,
        session: &str,
        connection: RwSignal<ConnectionStatus>,
        on_value: impl Fn(Value) + 'static,
    ) -> Result<Self, String> {
        let url = format!(
            "/api/store/{}?session={}",
            encoded_path(path),
            session_query(session)
        );
        let es = EventSource::new(&url).map_err(|_| format!("failed to open {url}"))?;

        let live = Rc::new(Cell::new(false));
        let open_live = live.clone();
        let on_open = Closure::<dyn Fn()>::new(move || {
            set_live(&open_live, true);
            connection.set(ConnectionStatus::Live);
        });
        es.set_onopen(Some(on_open.as_ref().unchecked_ref()));

        let label = path.to_string();
        let error_live = live.clone();
        let on_error = Closure::<dyn Fn()>::new(move || {
            set_live(&error_live, false);
            // EventSource reconnects on its own; the next open resends the value.
            connection.set(ConnectionStatus::Reconnecting);
            web_sys::console::warn_1(&format!("Store stream for {label} interrupted").into());
        });
        es.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        let label = path.to_string();
        let value_handler = Closure::<dyn Fn(MessageEvent)>::new(move |e: MessageEvent| {
            let Some(data) = e.data().as_string() else {
                return;
            };
            match serde_json::from_str::<Value>(&data) {
                Ok(value) => on_value(value),
                Err(err) => web_sys::console::warn_1(
                    &format!("Dropped malformed {label} event: {err}").into(),
                ),
            }
        });
        es.add_event_listener_with_callback("value", value_handler.as_ref().unchecked_ref())
            .map_err(|_| format!("failed to listen on {url}"))?;

        Ok(Self {
            es,
            live,
            on_open,
            on_error,
            value_handler,
        })
    }

    pub fn close(self) {
        let _ = self.on_open.as_ref();
        let _ = self.on_error.as_ref();
        self.es.set_onopen(None);
        self.es.set_onerror(None);
        self.es
            .remove_event_listener_with_callback(
                "value",
                self.value_handler.as_ref().unchecked_ref(),
            )
            .ok();
        self.es.close();
        set_live(&self.live, false);
    }
}

/// Pending writes for the whole page, sent strictly one after another.
#[derive(Default)]
struct CommandQueue {
    pending: VecDeque<(StoreCommand, String)>,
    draining: bool,
}

impl CommandQueue {
    /// Append a batch. Returns true when no drain is running and the caller must start one.
    fn push(&mut self, commands: Vec<StoreCommand>, session: &str) -> bool {
        self.pending
            .extend(commands.into_iter().map(|c| (c, session.to_string())));
        if self.draining || self.pending.is_empty() {
            return false;
        }
        self.draining = true;
        true
    }

    /// Next command to send; clears the drain flag once empty.
    fn next(&mut self) -> Option<(StoreCommand, String)> {
        let next = self.pending.pop_front();
        if next.is_none() {
            self.draining = false;
        }
        next
    }
}

/// Waits before each on-disconnect attempt. The server refuses the
/// registration until one of our streams is attached.
const REGISTER_BACKOFF_MS: [u32; 6] = [0, 250, 500, 1_000, 2_000, 4_000];

enum CommandError {
    NoStream,
    Failed(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoStream => f.write_str("no open stream for this session"),
            Self::Failed(e) => f.write_str(e),
        }
    }
}

async fn execute(command: &StoreCommand, session: &str) -> Result<(), CommandError> {
    let request = match command {
        StoreCommand::Write { path, value } => {
            gloo_net::http::Request::put(&format!("/api/store/{}", encoded_path(path)))
                .json(value)
                .map_err(|e| CommandError::Failed(format!("encode error: {e}")))?
        }
        StoreCommand::Remove { path } => {
            gloo_net::http::Request::delete(&format!("/api/store/{}", encoded_path(path)))
                .build()
                .map_err(|e| CommandError::Failed(format!("request error: {e}")))?
        }
        StoreCommand::RemoveOnDisconnect { path } => gloo_net::http::Request::post(&format!(
            "/api/on-disconnect/{}?session={}",
            encoded_path(path),
            session_query(session)
        ))
        .build()
        .map_err(|e| CommandError::Failed(format!("request error: {e}")))?,
    };
    let resp = request
        .send()
        .await
        .map_err(|e| CommandError::Failed(format!("fetch error: {e}")))?;
    match resp.status() {
        _ if resp.ok() => Ok(()),
        409 => Err(CommandError::NoStream),
        status => Err(CommandError::Failed(format!("HTTP {status}"))),
    }
}

async fn send(command: &StoreCommand, session: &str) -> Result<(), CommandError> {
    if !matches!(command, StoreCommand::RemoveOnDisconnect { .. }) {
        return execute(command, session).await;
    }
    let mut result = Err(CommandError::NoStream);
    for delay in REGISTER_BACKOFF_MS {
        if delay > 0 {
            gloo_timers::future::TimeoutFuture::new(delay).await;
        }
        if !has_live_stream() {
            continue;
        }
        result = execute(command, session).await;
        if !matches!(result, Err(CommandError::NoStream)) {
            break;
        }
    }
    result
}

async fn drain() {
    while let Some((command, session)) = OUTBOX.with(|q| q.borrow_mut().next()) {
        if let Err(e) = send(&command, &session).await {
            web_sys::console::warn_1(
                &format!("Store command on {} failed: {e}", command.path()).into(),
            );
        }
    }
}

/// Queue commands behind every earlier write. Failures are logged and
/// dropped; a refused on-disconnect registration is retried while it waits
/// for a stream.
pub fn dispatch(commands: Vec<StoreCommand>, session: String) {
    if commands.is_empty() {
        return;
    }
    if OUTBOX.with(|q| q.borrow_mut().push(commands, &session)) {
        spawn_local(drain());
    }
}
