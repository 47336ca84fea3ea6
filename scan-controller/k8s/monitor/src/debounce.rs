//! Coalesces bursts of resource changes into a single dispatch per key.
//!
//! Every [`Debouncer::add`] pushes the key's deadline out to `now + window`.
//! Once a key has been quiet for a whole window it is handed to the
//! [`Dispatch`] implementation exactly once, and its state is discarded before
//! the dispatch runs so that a later `add` starts a fresh cycle.
//!
//! A key that keeps changing would otherwise never fire, so postponement is
//! capped: once `max_delay` has elapsed since the first `add` of a cycle, the
//! key fires even though it was touched within the last window.
//!
//! Dropping the last clone of a [`Debouncer`] closes it.

use crate::metrics::DebounceMetrics;
use ahash::AHashMap as HashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::{task::JoinSet, time::Instant};
use tracing::{debug, error, info_span, trace, Instrument};

/// Accepts keys to be debounced.
pub trait Debounce: Send + Sync {
    fn add(&self, key: String);
}

/// Receives keys once they have settled.
#[async_trait::async_trait]
pub trait Dispatch: Send + Sync + 'static {
    async fn dispatch(&self, key: String);
}

#[derive(Debug)]
pub struct Debouncer<D> {
    inner: Arc<Inner<D>>,
    handle: Arc<Handle<D>>,
}

/// Shared by the clones of a debouncer, but never by its timer tasks, so the
/// last clone going away closes the debouncer and releases the tasks.
#[derive(Debug)]
struct Handle<D>(Arc<Inner<D>>);

#[derive(Debug)]
struct Inner<D> {
    window: Duration,
    max_delay: Duration,
    dispatch: D,
    state: Mutex<State>,
    metrics: DebounceMetrics,
}

#[derive(Debug, Default)]
struct State {
    closed: bool,
    pending: HashMap<String, Pending>,
    tasks: JoinSet<()>,
}

#[derive(Copy, Clone, Debug)]
struct Pending {
    first: Instant,
    deadline: Instant,
}

enum Step {
    Sleep(Instant),
    Fire { forced: bool },
    Done,
}

// === impl Debouncer ===

impl<D: Dispatch> Debouncer<D> {
    /// Creates a debouncer with the maximum delay defaulting to five windows.
    pub fn new(window: Duration, dispatch: D, metrics: DebounceMetrics) -> Self {
        Self::with_max_delay(window, window * 5, dispatch, metrics)
    }

    /// A `max_delay` shorter than `window` is raised to `window`.
    pub fn with_max_delay(
        window: Duration,
        max_delay: Duration,
        dispatch: D,
        metrics: DebounceMetrics,
    ) -> Self {
        let inner = Arc::new(Inner {
            window,
            max_delay: max_delay.max(window),
            dispatch,
            state: Mutex::default(),
            metrics,
        });
        Self {
            handle: Arc::new(Handle(inner.clone())),
            inner,
        }
    }

    /// Cancels every pending key and in-flight dispatch. Keys added afterwards
    /// are ignored.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Closes the debouncer once `shutdown` is signaled.
    pub fn close_on(&self, shutdown: drain::Watch) -> tokio::task::JoinHandle<()> {
        let debouncer = self.clone();
        tokio::spawn(async move {
            let _release = shutdown.signaled().await;
            debouncer.close();
        })
    }

    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }
}

impl<D: Dispatch> Debounce for Debouncer<D> {
    fn add(&self, key: String) {
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        if state.closed {
            trace!(%key, "Ignoring key added after close");
            return;
        }
        self.inner.metrics.adds.inc();

        // Drop the handles of timers that already finished.
        while state.tasks.try_join_next().is_some() {}

        let deadline = now + self.inner.window;
        if let Some(pending) = state.pending.get_mut(&key) {
            trace!(%key, "Postponing");
            pending.deadline = deadline;
            return;
        }

        trace!(%key, "Debouncing");
        state.pending.insert(
            key.clone(),
            Pending {
                first: now,
                deadline,
            },
        );
        self.inner.metrics.pending.set(state.pending.len() as i64);

        let inner = self.inner.clone();
        let span = info_span!("debounce", %key);
        state.tasks.spawn(inner.run(key).instrument(span));
    }
}

impl<D> Clone for Debouncer<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<D> Drop for Handle<D> {
    fn drop(&mut self) {
        self.0.close();
    }
}

// === impl Inner ===

impl<D> Inner<D> {
    fn close(&self) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        let dropped = state.pending.len();
        state.pending.clear();
        state.tasks.abort_all();
        self.metrics.pending.set(0);
        debug!(dropped, "Closed debouncer");
    }
}

impl<D: Dispatch> Inner<D> {
    async fn run(self: Arc<Self>, key: String) {
        loop {
            match self.step(&key) {
                Step::Done => return,
                Step::Sleep(until) => tokio::time::sleep_until(until).await,
                Step::Fire { forced } => {
                    self.fire(key, forced).await;
                    return;
                }
            }
        }
    }

    fn step(&self, key: &str) -> Step {
        let mut state = self.state.lock();
        let Some(pending) = state.pending.get(key).copied() else {
            return Step::Done;
        };

        let now = Instant::now();
        let ceiling = pending.first + self.max_delay;
        if now < pending.deadline && now < ceiling {
            return Step::Sleep(pending.deadline.min(ceiling));
        }

        state.pending.remove(key);
        self.metrics.pending.set(state.pending.len() as i64);
        Step::Fire {
            forced: now < pending.deadline,
        }
    }

    async fn fire(&self, key: String, forced: bool) {
        self.metrics.fires.inc();
        if forced {
            self.metrics.forced_fires.inc();
            debug!("Maximum delay elapsed; firing");
        } else {
            debug!("Firing");
        }

        let dispatch = AssertUnwindSafe(self.dispatch.dispatch(key)).catch_unwind();
        if dispatch.await.is_err() {
            self.metrics.panics.inc();
            error!("Dispatch panicked");
        }
    }
}

#[cfg(test)]
mod tests;
