// ── Reactive state store ──
//
// Holds the current `Arc<AppState>` behind a `watch` channel.
// Transitions replace the whole snapshot; subscribers diff by pointer,
// and a reducer no-op (identical Arc returned) is not broadcast.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::state::AppState;

/// Shared handle to the single application state tree.
#[derive(Clone)]
pub struct StateStore {
    sender: Arc<watch::Sender<Arc<AppState>>>,
}

impl StateStore {
    pub fn new(initial: AppState) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<AppState> {
        self.sender.borrow().clone()
    }

    /// Run a transition and publish the result.
    ///
    /// When `f` returns the identical `Arc` (a no-op transition) the
    /// watch channel is left untouched, so subscribers see nothing.
    pub fn transition(&self, f: impl FnOnce(Arc<AppState>) -> Arc<AppState>) {
        self.sender.send_if_modified(|current| {
            let next = f(current.clone());
            if Arc::ptr_eq(&next, current) {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> StateStream {
        StateStream::new(self.sender.subscribe())
    }
}

/// A subscription to state transitions.
///
/// Provides both point-in-time snapshot access and reactive change
/// notification via `changed()` or by converting to a `Stream`.
pub struct StateStream {
    current: Arc<AppState>,
    receiver: watch::Receiver<Arc<AppState>>,
}

impl StateStream {
    fn new(receiver: watch::Receiver<Arc<AppState>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Get the snapshot captured at creation time.
    pub fn current(&self) -> &Arc<AppState> {
        &self.current
    }

    /// Get the latest snapshot (may have changed since creation).
    pub fn latest(&self) -> Arc<AppState> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next transition, returning the new snapshot.
    /// Returns `None` if the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<AppState>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> StateWatchStream {
        StateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct StateWatchStream {
    inner: WatchStream<Arc<AppState>>,
}

impl Stream for StateWatchStream {
    type Item = Arc<AppState>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::theme::ThemeSet;

    fn fresh_state() -> AppState {
        AppState::initialize(&MemoryStorage::new(), &ThemeSet::default(), false, None)
    }

    #[tokio::test]
    async fn transition_publishes_new_snapshot() {
        let store = StateStore::new(fresh_state());
        let mut stream = store.subscribe();

        store.transition(|state| {
            let mut next = (*state).clone();
            next.client_id = "c-1".to_owned();
            Arc::new(next)
        });

        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.client_id, "c-1");
        assert_eq!(store.snapshot().client_id, "c-1");
    }

    #[tokio::test(start_paused = true)]
    async fn identity_transition_is_not_broadcast() {
        let store = StateStore::new(fresh_state());
        let mut stream = store.subscribe();

        store.transition(|state| state);

        tokio::select! {
            biased;
            _ = stream.changed() => panic!("no-op transition must not wake subscribers"),
            () = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
        }
    }
}
