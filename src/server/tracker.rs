use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::watch;

/// Registry of open connections and active listeners.
///
/// Each entry holds the sending side of a close signal. Entries remove
/// themselves when their [`Tracked`] guard drops, which also happens while a
/// panicking task unwinds.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tracker {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: AtomicU64,
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    conns: HashMap<u64, watch::Sender<bool>>,
    listeners: HashMap<u64, watch::Sender<bool>>,
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Conn,
    Listener,
}

/// Membership of one connection or listener in the [`Tracker`].
#[derive(Debug)]
pub(crate) struct Tracked {
    id: u64,
    kind: Kind,
    tracker: Tracker,
    closed: watch::Receiver<bool>,
}

impl Tracker {
    pub(crate) fn add_conn(&self) -> Tracked {
        self.add(Kind::Conn)
    }

    pub(crate) fn add_listener(&self) -> Tracked {
        self.add(Kind::Listener)
    }

    /// Signals every tracked connection and listener to close.
    pub(crate) fn close_all(&self) {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        for tx in state.conns.values().chain(state.listeners.values()) {
            tx.send_replace(true);
        }
    }

    pub(crate) fn connections(&self) -> usize {
        self.read(|state| state.conns.len())
    }

    pub(crate) fn listeners(&self) -> usize {
        self.read(|state| state.listeners.len())
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.inner.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn add(&self, kind: Kind) -> Tracked {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, closed) = watch::channel(false);

        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        match kind {
            Kind::Conn => state.conns.insert(id, tx),
            Kind::Listener => state.listeners.insert(id, tx),
        };

        Tracked {
            id,
            kind,
            tracker: self.clone(),
            closed,
        }
    }

    fn remove(&self, kind: Kind, id: u64) {
        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        match kind {
            Kind::Conn => state.conns.remove(&id),
            Kind::Listener => state.listeners.remove(&id),
        };
    }
}

impl Tracked {
    /// Resolves once the tracker asks this entry to close.
    pub(crate) async fn closed(&mut self) {
        // The sender lives in the tracker until this guard drops, so the wait
        // only ends on a close signal.
        let _ = self.closed.wait_for(|closed| *closed).await;
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.tracker.remove(self.kind, self.id);
    }
}
