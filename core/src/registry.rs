use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::error;

use crate::error::{ProfilerError, Result};
use crate::handle::Handle;

/// Handle-keyed map behind its own lock.
///
/// Lookups of handles the registry never saw are contract violations; they are logged here and
/// returned as errors.
pub struct Registry<H, V> {
    entries: Mutex<AHashMap<H, V>>,
}

impl<H: Handle, V> Default for Registry<H, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(AHashMap::new()),
        }
    }
}

impl<H: Handle, V> Registry<H, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: H, value: V) -> Result<()> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&handle) {
            let err = ProfilerError::already_tracked(handle);
            error!("{err}");
            return Err(err);
        }
        entries.insert(handle, value);
        Ok(())
    }

    pub fn remove(&self, handle: H) -> Result<V> {
        self.entries
            .lock()
            .remove(&handle)
            .ok_or_else(|| unknown(handle))
    }

    pub fn with<R>(&self, handle: H, f: impl FnOnce(&V) -> R) -> Result<R> {
        self.entries
            .lock()
            .get(&handle)
            .map(f)
            .ok_or_else(|| unknown(handle))
    }

    pub fn with_mut<R>(&self, handle: H, f: impl FnOnce(&mut V) -> R) -> Result<R> {
        self.entries
            .lock()
            .get_mut(&handle)
            .map(f)
            .ok_or_else(|| unknown(handle))
    }

    pub fn get(&self, handle: H) -> Result<V>
    where
        V: Clone,
    {
        self.with(handle, V::clone)
    }

    /// Like [`get`](Self::get), for callers that treat a missing entry as normal.
    pub fn find(&self, handle: H) -> Option<V>
    where
        V: Clone,
    {
        self.entries.lock().get(&handle).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn for_each_mut(&self, mut f: impl FnMut(H, &mut V)) {
        for (handle, value) in self.entries.lock().iter_mut() {
            f(*handle, value);
        }
    }

    pub fn fold<A>(&self, init: A, mut f: impl FnMut(A, H, &V) -> A) -> A {
        self.entries
            .lock()
            .iter()
            .fold(init, |acc, (handle, value)| f(acc, *handle, value))
    }
}

fn unknown<H: Handle>(handle: H) -> ProfilerError {
    let err = ProfilerError::unknown(handle);
    error!("{err}");
    err
}
