// pyforge-core: Reducer-driven state layer between pyforge-api and the view.

pub mod action;
pub mod adapter;
pub mod app;
pub mod broadcast;
pub mod config;
pub mod data_manager;
pub mod error;
pub mod outbound;
pub mod reducer;
pub mod router;
pub mod state;
pub mod storage;
pub mod store;
pub mod theme;

// ── Primary re-exports ──────────────────────────────────────────────
pub use action::{Action, DataRequestOptions, FilterDesc, NamedPayload, UpdatePayload};
pub use adapter::{PyForgeWsAdapter, WsAdapter};
pub use app::{App, AppEvent};
pub use broadcast::BroadcastBuffer;
pub use config::{ClientConfig, ThemeOverrides};
pub use data_manager::{DataManager, ModuleChanges, ModuleData};
pub use error::CoreError;
pub use outbound::{Outbound, WireSink};
pub use reducer::{add_rows, reduce, ReducerContext};
pub use state::{
    AppState, BlockMessage, FileDownload, NavigateMessage, NotificationMessage,
};
pub use storage::{DurableStorage, FileStorage, MemoryStorage};
pub use store::{StateStore, StateStream};
pub use theme::{Theme, ThemeMode, ThemeSet};
