//! The client runtime.
//!
//! `App` wires everything together: the socket, the reactive state
//! store, the broadcast buffer, the adapter chain, and the bootstrap
//! handshake. Cheap to clone; all clones share the same runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use pyforge_api::websocket::{SocketConfig, SocketEvent};
use pyforge_api::{MessageType, SocketHandle, WsMessage};

use crate::action::{Action, UpdatePayload};
use crate::adapter::{PyForgeWsAdapter, WsAdapter};
use crate::broadcast::BroadcastBuffer;
use crate::config::ClientConfig;
use crate::data_manager::{DataManager, ModuleChanges};
use crate::error::CoreError;
use crate::outbound::Outbound;
use crate::reducer::{reduce, ReducerContext};
use crate::router;
use crate::state::AppState;
use crate::storage::{self, DurableStorage};
use crate::store::{StateStore, StateStream};
use crate::theme::ThemeSet;

/// Runtime notifications for embedders (the view layer, extension
/// libraries). Carried on a broadcast channel; slow consumers lose old
/// events rather than blocking the runtime.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// First data tree received; the app is usable.
    Init,
    /// The backend re-sent its data tree and something moved.
    Reload(ModuleChanges),
    /// Backend alert, also folded into the notification stack.
    Notify { kind: String, message: String },
    /// The outstanding-acknowledgement set changed.
    AckListUpdated(Vec<String>),
    /// One variable changed through a batched update.
    VariableChange { name: String, value: Value },
    /// The backend asked for a favicon swap.
    Favicon(String),
}

#[derive(Default)]
struct Bootstrap {
    app_id: String,
    context: String,
    metadata: Value,
    routes: Option<Vec<(String, String)>>,
}

struct AppInner {
    config: ClientConfig,
    store: StateStore,
    storage: Arc<dyn DurableStorage>,
    themes: ThemeSet,
    outbound: Outbound,
    socket: Arc<SocketHandle>,
    socket_events: Mutex<Option<tokio::sync::mpsc::UnboundedReceiver<SocketEvent>>>,
    broadcasts: BroadcastBuffer,
    adapters: RwLock<Vec<Arc<dyn WsAdapter>>>,
    bootstrap: Mutex<Bootstrap>,
    variable_data: Mutex<Option<DataManager>>,
    function_data: Mutex<Option<DataManager>>,
    page_visible: AtomicBool,
    events: broadcast::Sender<AppEvent>,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

impl App {
    pub fn new(config: ClientConfig, storage: Arc<dyn DurableStorage>) -> Result<Self, CoreError> {
        let themes = ThemeSet::from_config(config.stylekit, &config.theme);
        let initial = AppState::initialize(
            &*storage,
            &themes,
            config.dark_mode,
            config.time_zone.as_deref(),
        );

        let cancel = CancellationToken::new();
        let socket_config = SocketConfig {
            url: config.socket_url()?,
            retry_delay: config.retry_delay,
        };
        let (socket, socket_events) = SocketHandle::new(socket_config, cancel.child_token());
        let socket = Arc::new(socket);
        let (events, _) = broadcast::channel(64);

        let adapters: Vec<Arc<dyn WsAdapter>> = vec![Arc::new(PyForgeWsAdapter::new())];

        Ok(Self {
            inner: Arc::new(AppInner {
                store: StateStore::new(initial),
                storage,
                themes,
                outbound: Outbound::new(socket.clone()),
                socket,
                socket_events: Mutex::new(Some(socket_events)),
                broadcasts: BroadcastBuffer::new(),
                adapters: RwLock::new(adapters),
                bootstrap: Mutex::new(Bootstrap::default()),
                variable_data: Mutex::new(None),
                function_data: Mutex::new(None),
                page_visible: AtomicBool::new(true),
                events,
                cancel,
                config,
            }),
        })
    }

    // ── State access ─────────────────────────────────────────────────

    pub fn state(&self) -> Arc<AppState> {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self) -> StateStream {
        self.inner.store.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<AppEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: AppEvent) {
        // No receivers is fine; events are advisory.
        let _ = self.inner.events.send(event);
    }

    /// Run one action through the reducer and publish the result.
    pub fn dispatch(&self, action: Action) {
        let ctx = ReducerContext {
            storage: &*self.inner.storage,
            outbound: &self.inner.outbound,
            themes: &self.inner.themes,
            page_visible: self.inner.page_visible.load(Ordering::Relaxed),
        };
        self.inner.store.transition(|state| reduce(state, action, &ctx));
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the runtime: spawn the event pump and the broadcast tick,
    /// then open the socket. Listeners are wired before the connection
    /// so the first frames are never lost.
    pub fn connect(&self) {
        let Some(mut socket_events) = self
            .inner
            .socket_events
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
        else {
            return; // already running
        };

        let app = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = app.inner.cancel.cancelled() => break,
                    event = socket_events.recv() => match event {
                        Some(SocketEvent::Connected { reconnect }) => app.handle_connected(reconnect),
                        Some(SocketEvent::Disconnected { reason }) => {
                            tracing::debug!(?reason, "socket disconnected");
                        }
                        Some(SocketEvent::Message(message)) => {
                            router::dispatch_ws_message(&app, message).await;
                        }
                        None => break,
                    },
                }
            }
        });

        let app = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(app.inner.config.broadcast_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = app.inner.cancel.cancelled() => break,
                    _ = tick.tick() => {
                        for (name, value) in app.inner.broadcasts.drain_one_round() {
                            app.dispatch(Action::update(name, UpdatePayload::new(value)));
                        }
                    }
                }
            }
        });

        self.inner.socket.connect();
    }

    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.socket.shutdown();
    }

    fn handle_connected(&self, reconnect: bool) {
        self.dispatch(Action::SocketConnected);
        if reconnect {
            // Ask whether the server-side app session survived the drop;
            // the AID reply named "reconnect" triggers a full re-init.
            let state = self.state();
            self.inner.outbound.send(
                MessageType::AppId,
                "reconnect",
                Value::String(self.app_id()),
                &state.client_id,
                None,
            );
        } else if self.state().client_id.is_empty() || self.app_id().is_empty() {
            self.init();
        }
    }

    /// Run the identity handshake from scratch. Also invoked when the
    /// backend reports that its app session is gone.
    pub fn init(&self) {
        if let Ok(mut boot) = self.inner.bootstrap.lock() {
            boot.app_id.clear();
            boot.context.clear();
            boot.routes = None;
        }
        let stored = self
            .inner
            .storage
            .get(storage::CLIENT_ID_KEY)
            .unwrap_or_default();
        self.inner.outbound.send(
            MessageType::Id,
            storage::CLIENT_ID_KEY,
            Value::String(stored.clone()),
            &stored,
            None,
        );
    }

    /// Record a page visibility change, persisting or clearing the
    /// blocking-dialog snapshot so it survives a background reload.
    pub fn page_visibility_changed(&self, visible: bool) {
        self.inner.page_visible.store(visible, Ordering::Relaxed);
        let block = self.state().block.clone();
        match (visible, block) {
            (false, Some(block)) => {
                if let Ok(text) = serde_json::to_string(&block) {
                    self.inner.storage.set(storage::BLOCK_KEY, &text);
                }
            }
            (true, _) => self.inner.storage.remove(storage::BLOCK_KEY),
            (false, None) => {}
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Send an acknowledged envelope in the current context; the ack id
    /// joins the outstanding list until the backend confirms it.
    pub fn send_message(
        &self,
        message_type: MessageType,
        name: &str,
        payload: Value,
    ) -> Option<String> {
        let state = self.state();
        let context = self.context();
        let ack_id = self.inner.outbound.send_with_ack(
            message_type,
            name,
            payload,
            &state.client_id,
            (!context.is_empty()).then_some(context.as_str()),
            None,
        );
        if let Some(id) = &ack_id {
            let id = id.clone();
            self.inner.store.transition(|state| {
                let mut next = (*state).clone();
                next.ack_list.push(id);
                Arc::new(next)
            });
        }
        ack_id
    }

    // ── Adapters ─────────────────────────────────────────────────────

    /// Register an extension adapter ahead of the built-in one.
    pub fn register_ws_adapter(&self, adapter: Arc<dyn WsAdapter>) {
        if let Ok(mut adapters) = self.inner.adapters.write() {
            adapters.insert(0, adapter);
        }
    }

    /// Offer a message to the adapter chain. Returns `true` when an
    /// adapter claimed it; that adapter's post hook runs before return.
    pub(crate) fn offer_to_adapters(&self, message: &WsMessage) -> bool {
        let adapters = match self.inner.adapters.read() {
            Ok(adapters) => adapters.clone(),
            Err(_) => return false,
        };
        for adapter in &adapters {
            if adapter
                .supported_message_types()
                .contains(&message.message_type)
                && adapter.handle_ws_message(message, self)
            {
                adapter.post_ws_message_processing(message, self);
                return true;
            }
        }
        false
    }

    // ── Bootstrap metadata ───────────────────────────────────────────

    pub fn app_id(&self) -> String {
        self.inner
            .bootstrap
            .lock()
            .map(|boot| boot.app_id.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_app_id(&self, id: &str) {
        if let Ok(mut boot) = self.inner.bootstrap.lock() {
            boot.app_id = id.to_owned();
        }
    }

    pub fn context(&self) -> String {
        self.inner
            .bootstrap
            .lock()
            .map(|boot| boot.context.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_context(&self, context: &str) {
        if let Ok(mut boot) = self.inner.bootstrap.lock() {
            boot.context = context.to_owned();
        }
    }

    pub fn metadata(&self) -> Value {
        self.inner
            .bootstrap
            .lock()
            .map(|boot| boot.metadata.clone())
            .unwrap_or(Value::Null)
    }

    pub(crate) fn set_metadata(&self, metadata: Value) {
        if let Ok(mut boot) = self.inner.bootstrap.lock() {
            boot.metadata = metadata;
        }
    }

    pub fn routes(&self) -> Option<Vec<(String, String)>> {
        self.inner
            .bootstrap
            .lock()
            .ok()
            .and_then(|boot| boot.routes.clone())
    }

    pub(crate) fn set_routes(&self, routes: Vec<(String, String)>) {
        if let Ok(mut boot) = self.inner.bootstrap.lock() {
            boot.routes = Some(routes);
        }
    }

    /// All bootstrap metadata present: the data tree can be requested.
    pub(crate) fn is_bootstrapped(&self) -> bool {
        if self.state().client_id.is_empty() {
            return false;
        }
        self.inner
            .bootstrap
            .lock()
            .map(|boot| !boot.app_id.is_empty() && !boot.context.is_empty() && boot.routes.is_some())
            .unwrap_or(false)
    }

    // ── Data managers ────────────────────────────────────────────────

    pub(crate) fn has_data_managers(&self) -> bool {
        self.inner
            .variable_data
            .lock()
            .map(|data| data.is_some())
            .unwrap_or(false)
    }

    pub(crate) fn install_data_managers(&self, variables: DataManager, functions: DataManager) {
        if let Ok(mut slot) = self.inner.variable_data.lock() {
            *slot = Some(variables);
        }
        if let Ok(mut slot) = self.inner.function_data.lock() {
            *slot = Some(functions);
        }
    }

    pub(crate) fn with_variable_data<R: Default>(
        &self,
        f: impl FnOnce(&mut DataManager) -> R,
    ) -> R {
        self.inner
            .variable_data
            .lock()
            .ok()
            .and_then(|mut slot| slot.as_mut().map(f))
            .unwrap_or_default()
    }

    pub(crate) fn with_function_data<R: Default>(
        &self,
        f: impl FnOnce(&mut DataManager) -> R,
    ) -> R {
        self.inner
            .function_data
            .lock()
            .ok()
            .and_then(|mut slot| slot.as_mut().map(f))
            .unwrap_or_default()
    }

    // ── Broadcasts ───────────────────────────────────────────────────

    pub(crate) fn stack_broadcast(&self, name: &str, value: Value) {
        self.inner.broadcasts.stack(name, value);
    }

    /// The broadcast rate buffer; exposed so embedders driving their
    /// own scheduler can tick it instead of [`connect`](Self::connect).
    pub fn broadcasts(&self) -> &BroadcastBuffer {
        &self.inner.broadcasts
    }
}
