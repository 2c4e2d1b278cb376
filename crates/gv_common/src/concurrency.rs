//! Concurrency utility types shared by the engine thread, the network thread, and the async mesh
//! worker pool (see the concurrency domains the orchestrator coordinates between).

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

/// A cloneable, [`Sync`] handle that supports publishing a new version, optimized for cheap reads
/// and rare writes. Used for [`crate::config::GameConfigHandle`] and anywhere else a value needs
/// to be read every tick by the engine thread but only occasionally written by, e.g., a console
/// command or the network thread.
pub struct VersionedArc<T> {
    inner: Arc<VersionedArcInner<T>>,
    /// Last revision read by this specific handle instance.
    last_revision: AtomicUsize,
}

struct VersionedArcInner<T> {
    swapper: ArcSwap<(usize, T)>,
    updater_mutex: Mutex<()>,
}

impl<T> Clone for VersionedArc<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            last_revision: AtomicUsize::new(self.last_revision.load(AtomicOrdering::Acquire)),
        }
    }
}

impl<T: Clone> VersionedArc<T> {
    /// Constructs a new handle. It will return `true` from [`Self::was_updated`] until the first
    /// [`Self::peek`] or [`Self::read`].
    pub fn new(inner: T) -> Self {
        Self {
            inner: Arc::new(VersionedArcInner {
                swapper: ArcSwap::new(Arc::new((1, inner))),
                updater_mutex: Default::default(),
            }),
            last_revision: AtomicUsize::new(0),
        }
    }

    /// Accesses the latest version. Do not hold onto the result for long; it borrows the
    /// currently-published `Arc`, blocking its reclamation.
    pub fn peek(&self) -> impl Deref<Target = T> + '_ {
        let data = self.inner.swapper.load();
        self.last_revision.store(data.0, AtomicOrdering::Release);
        Peek(data)
    }

    /// Like [`Self::peek`], but returns `None` if nothing changed since the last peek/read on
    /// this handle.
    pub fn peek_if_changed(&self) -> Option<impl Deref<Target = T> + '_> {
        let data = self.inner.swapper.load();
        let old_revision = self.last_revision.swap(data.0, AtomicOrdering::AcqRel);
        (old_revision != data.0).then(|| Peek(data))
    }

    /// Whether the value changed since the last [`Self::peek`] or [`Self::read`] on this handle.
    pub fn was_updated(&self) -> bool {
        self.inner.swapper.load().0 != self.last_revision.load(AtomicOrdering::Acquire)
    }

    /// Clones a reference to the latest version and clears this handle's updated flag.
    pub fn read(&self) -> impl Deref<Target = T> + Clone {
        let data = self.inner.swapper.load_full();
        self.last_revision.store(data.0, AtomicOrdering::Release);
        Read(data)
    }

    /// Publishes a new version derived from the current one, visible to every handle cloned from
    /// this one. Only one update runs at a time. `mark_self_as_updated` controls whether this
    /// specific handle should immediately see its own update as "already read".
    pub fn update<F: FnOnce(&mut T)>(&self, updater: F, mark_self_as_updated: bool) {
        let _lock = self.inner.updater_mutex.lock().unwrap();
        let load = self.inner.swapper.load();
        let mut data = T::clone(&load.1);
        let new_revision = load.0.wrapping_add(1);
        drop(load);
        updater(&mut data);
        self.inner.swapper.store(Arc::new((new_revision, data)));
        if !mark_self_as_updated {
            self.last_revision.store(new_revision, AtomicOrdering::Release);
        }
    }
}

struct Peek<T>(arc_swap::Guard<Arc<(usize, T)>>);

impl<T> Deref for Peek<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.0.1
    }
}

#[derive(Clone)]
struct Read<T>(Arc<(usize, T)>);

impl<T> Deref for Read<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.0.1
    }
}
