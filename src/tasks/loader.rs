//! One asynchronous fetch for one identity key.
//!
//! A `Loader` is created fresh for every cache miss and never reused. Its
//! state is the only data shared between the owning thread (which may cancel)
//! and the fetch worker (which completes), so every transition happens under
//! one mutex, and the post back to the owner queue happens under that same
//! lock. Whichever side takes the lock first wins:
//! - cancel first: the completion is swallowed and never reaches the owner;
//! - complete first: cancel becomes a no-op and the result is delivered.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::Sender;
use tracing::{debug, trace};

use crate::events::{IdentityKey, LoadCompleted, LoadOutcome};
use crate::tasks::transport::Transport;

pub type CompletionSender = Sender<LoadCompleted>;

static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl LoaderState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

struct Inner {
    state: LoaderState,
    key: Option<IdentityKey>,
    // Released on start so pending completions never keep the transport alive.
    transport: Option<Arc<dyn Transport>>,
}

struct Shared {
    id: u64,
    inner: Mutex<Inner>,
    completions: CompletionSender,
}

/// Handle to one load attempt. Clones refer to the same attempt.
#[derive(Clone)]
pub struct Loader {
    shared: Arc<Shared>,
}

impl Loader {
    pub fn new(transport: Arc<dyn Transport>, completions: CompletionSender) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed),
                inner: Mutex::new(Inner {
                    state: LoaderState::Idle,
                    key: None,
                    transport: Some(transport),
                }),
                completions,
            }),
        }
    }

    /// Diagnostic id, monotonic per process. Never used for correctness.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    #[must_use]
    pub fn state(&self) -> LoaderState {
        self.lock().state
    }

    #[must_use]
    pub fn key(&self) -> Option<IdentityKey> {
        self.lock().key
    }

    /// Whether both handles name the same load attempt.
    #[must_use]
    pub fn is(&self, other: &Loader) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Move `Idle -> Running` and hand the key to the transport.
    ///
    /// # Panics
    /// If the loader has already been started or cancelled.
    pub fn start(&self, key: IdentityKey) {
        let transport = {
            let mut inner = self.lock();
            assert!(
                inner.state == LoaderState::Idle,
                "loader {} started from state {:?}",
                self.shared.id,
                inner.state
            );
            inner.state = LoaderState::Running;
            inner.key = Some(key);
            inner.transport.take()
        };
        let Some(transport) = transport else {
            unreachable!("idle loader always holds its transport");
        };
        debug!(loader = self.shared.id, %key, "dispatching fetch");
        transport.fetch(key, FetchCompletion::new(self.clone()));
    }

    /// Best-effort cancellation. Returns `true` if this call moved the loader
    /// into `Cancelled`; terminal loaders are left untouched.
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            LoaderState::Idle | LoaderState::Running => {
                inner.state = LoaderState::Cancelled;
                inner.transport = None;
                debug!(loader = self.shared.id, key = ?inner.key, "loader cancelled");
                true
            }
            _ => false,
        }
    }

    fn finish(&self, outcome: LoadOutcome) {
        let mut inner = self.lock();
        match inner.state {
            LoaderState::Running => {}
            LoaderState::Cancelled => {
                trace!(loader = self.shared.id, "completion suppressed after cancel");
                return;
            }
            state => {
                debug!(loader = self.shared.id, ?state, "completion ignored");
                return;
            }
        }
        inner.state = match &outcome {
            LoadOutcome::Loaded(_) => LoaderState::Completed,
            LoadOutcome::Failed(_) => LoaderState::Failed,
            LoadOutcome::Cancelled => LoaderState::Cancelled,
        };
        let msg = LoadCompleted {
            loader: self.clone(),
            outcome,
        };
        if self.shared.completions.send(msg).is_err() {
            trace!(loader = self.shared.id, "owner queue closed, result dropped");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Loader")
            .field("id", &self.shared.id)
            .field("state", &inner.state)
            .field("key", &inner.key)
            .finish()
    }
}

/// One-shot completion handed to the transport with each fetch.
///
/// `complete` consumes the handle, so a transport can deliver at most once.
/// Dropping it unfired is allowed (for example on transport teardown); the
/// loader then stays `Running` until its display item supersedes it.
pub struct FetchCompletion {
    loader: Option<Loader>,
}

impl FetchCompletion {
    fn new(loader: Loader) -> Self {
        Self {
            loader: Some(loader),
        }
    }

    #[must_use]
    pub fn loader_id(&self) -> u64 {
        self.loader.as_ref().map_or(0, Loader::id)
    }

    /// True once the owning side has cancelled; workers may use it to skip work.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.loader
            .as_ref()
            .is_some_and(|l| l.state() == LoaderState::Cancelled)
    }

    pub fn complete(mut self, outcome: LoadOutcome) {
        if let Some(loader) = self.loader.take() {
            loader.finish(outcome);
        }
    }
}

impl Drop for FetchCompletion {
    fn drop(&mut self) {
        if let Some(loader) = self.loader.take() {
            debug!(loader = loader.id(), "fetch dropped without a result");
        }
    }
}

impl fmt::Debug for FetchCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCompletion")
            .field("loader", &self.loader_id())
            .finish()
    }
}

/// Strategy for creating a fresh loader whose completion is posted to
/// `completions`.
pub trait LoaderFactory {
    fn create_loader(&self, completions: CompletionSender) -> Loader;
}

impl<F> LoaderFactory for F
where
    F: Fn(CompletionSender) -> Loader,
{
    fn create_loader(&self, completions: CompletionSender) -> Loader {
        self(completions)
    }
}

/// Builds loaders that all dispatch to one shared transport.
#[derive(Clone)]
pub struct TransportLoaderFactory {
    transport: Arc<dyn Transport>,
}

impl TransportLoaderFactory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl LoaderFactory for TransportLoaderFactory {
    fn create_loader(&self, completions: CompletionSender) -> Loader {
        Loader::new(self.transport.clone(), completions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Bitmap;
    use crate::error::Error;
    use crate::tasks::transport::ManualTransport;
    use crossbeam_channel::unbounded;

    fn key() -> IdentityKey {
        IdentityKey::new(1, 42, 7)
    }

    fn loaded() -> LoadOutcome {
        LoadOutcome::Loaded(Bitmap::solid(2, 2, [0, 0, 0, 255]))
    }

    #[test]
    fn start_dispatches_key_to_transport() {
        let transport = Arc::new(ManualTransport::new());
        let (tx, _rx) = unbounded();
        let loader = Loader::new(transport.clone(), tx);
        assert_eq!(loader.state(), LoaderState::Idle);

        loader.start(key());
        assert_eq!(loader.state(), LoaderState::Running);
        assert_eq!(loader.key(), Some(key()));

        let pending = transport.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, key());
        assert_eq!(pending[0].1.loader_id(), loader.id());
    }

    #[test]
    #[should_panic(expected = "started from state")]
    fn starting_twice_panics() {
        let (tx, _rx) = unbounded();
        let loader = Loader::new(Arc::new(ManualTransport::new()), tx);
        loader.start(key());
        loader.start(key());
    }

    #[test]
    fn completion_is_posted_to_owner_queue() {
        let transport = Arc::new(ManualTransport::new());
        let (tx, rx) = unbounded();
        let loader = Loader::new(transport.clone(), tx);
        loader.start(key());

        let (_, done) = transport.take_pending().pop().unwrap();
        done.complete(loaded());

        let msg = rx.try_recv().expect("completion delivered");
        assert!(msg.loader.is(&loader));
        assert!(matches!(msg.outcome, LoadOutcome::Loaded(_)));
        assert_eq!(loader.state(), LoaderState::Completed);
    }

    #[test]
    fn failure_moves_to_failed() {
        let transport = Arc::new(ManualTransport::new());
        let (tx, rx) = unbounded();
        let loader = Loader::new(transport.clone(), tx);
        loader.start(key());

        let (_, done) = transport.take_pending().pop().unwrap();
        done.complete(LoadOutcome::Failed(Error::UnknownKey(key())));
        assert_eq!(loader.state(), LoaderState::Failed);
        assert!(matches!(
            rx.try_recv().unwrap().outcome,
            LoadOutcome::Failed(_)
        ));
    }

    #[test]
    fn cancel_before_completion_suppresses_delivery() {
        let transport = Arc::new(ManualTransport::new());
        let (tx, rx) = unbounded();
        let loader = Loader::new(transport.clone(), tx);
        loader.start(key());

        let (_, done) = transport.take_pending().pop().unwrap();
        assert!(loader.cancel());
        assert!(done.is_cancelled());
        done.complete(loaded());

        assert!(rx.try_recv().is_err());
        assert_eq!(loader.state(), LoaderState::Cancelled);
    }

    #[test]
    fn cancel_racing_completion_has_one_winner() {
        for _ in 0..1000 {
            let transport = Arc::new(ManualTransport::new());
            let (tx, rx) = unbounded();
            let loader = Loader::new(transport.clone(), tx);
            loader.start(key());
            let (_, done) = transport.take_pending().pop().unwrap();

            let barrier = Arc::new(std::sync::Barrier::new(2));
            let worker = {
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    done.complete(loaded());
                })
            };
            barrier.wait();
            let cancelled = loader.cancel();
            worker.join().unwrap();

            if cancelled {
                assert_eq!(loader.state(), LoaderState::Cancelled);
                assert!(rx.try_recv().is_err());
            } else {
                assert_eq!(loader.state(), LoaderState::Completed);
                assert!(rx.try_recv().is_ok());
                assert!(rx.try_recv().is_err());
            }
        }
    }

    #[test]
    fn cancel_after_completion_is_noop() {
        let transport = Arc::new(ManualTransport::new());
        let (tx, rx) = unbounded();
        let loader = Loader::new(transport.clone(), tx);
        loader.start(key());
        transport.take_pending().pop().unwrap().1.complete(loaded());

        assert!(!loader.cancel());
        assert!(!loader.cancel());
        assert_eq!(loader.state(), LoaderState::Completed);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn cancel_is_idempotent() {
        let (tx, _rx) = unbounded();
        let loader = Loader::new(Arc::new(ManualTransport::new()), tx);
        assert!(loader.cancel());
        assert!(!loader.cancel());
        assert_eq!(loader.state(), LoaderState::Cancelled);
    }

    #[test]
    fn dropped_completion_leaves_loader_running() {
        let transport = Arc::new(ManualTransport::new());
        let (tx, rx) = unbounded();
        let loader = Loader::new(transport.clone(), tx);
        loader.start(key());
        drop(transport.take_pending());

        assert_eq!(loader.state(), LoaderState::Running);
        assert!(rx.try_recv().is_err());
        assert!(loader.cancel());
    }

    #[test]
    fn ids_increase_and_clones_share_identity() {
        let (tx, _rx) = unbounded();
        let transport: Arc<dyn Transport> = Arc::new(ManualTransport::new());
        let a = Loader::new(transport.clone(), tx.clone());
        let b = Loader::new(transport, tx);
        assert!(b.id() > a.id());
        assert!(a.is(&a.clone()));
        assert!(!a.is(&b));
    }

    #[test]
    fn closures_act_as_factories() {
        let transport: Arc<dyn Transport> = Arc::new(ManualTransport::new());
        let factory = move |tx: CompletionSender| Loader::new(transport.clone(), tx);
        let (tx, _rx) = unbounded();
        let loader = factory.create_loader(tx);
        assert_eq!(loader.state(), LoaderState::Idle);
    }
}
