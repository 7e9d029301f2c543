use crate::runtime::{ObserverId, ReactiveRuntime, SourceId};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock, Weak};
use tracing::trace;

/// Shared backing of a memo: its own cell half (the cached value and a
/// source handle for dependents) plus its observer half (a source set in the
/// runtime graph).
struct MemoInner<T> {
    compute: Box<dyn Fn() -> T + Send + Sync>,
    cached: RwLock<Option<T>>,
    cell: SourceId,
    observer: ObserverId,
    name: Option<String>,
    runtime: Weak<ReactiveRuntime>,
}

impl<T> Drop for MemoInner<T> {
    fn drop(&mut self) {
        // Both halves go together: the observer never outlives the cell.
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.dispose_observer(self.observer);
            runtime.remove_source(self.cell);
        }
    }
}

/// A cached computed value that automatically tracks its dependencies.
///
/// Memos follow push-to-dirty, pull-to-recompute semantics: an upstream
/// change only marks the memo stale and wakes *its* dependents; the
/// computation itself runs lazily on the next read. Several upstream writes
/// in one batch therefore cost a single recomputation, and a memo nobody
/// reads never recomputes at all.
///
/// # Examples
///
/// ```
/// use filament::{create_memo, create_signal};
///
/// let (count, set_count) = create_signal(5);
/// let doubled = create_memo({
///     let count = count.clone();
///     move || count.get() * 2
/// });
/// assert_eq!(doubled.get(), 10);
///
/// set_count.set(10);
/// assert_eq!(doubled.get(), 20);
/// ```
pub struct Memo<T> {
    inner: Arc<MemoInner<T>>,
}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Memo<T> {
    /// Create a new memo. The computation runs once immediately to populate
    /// the cache and establish the initial dependency set.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Box::new(compute), None)
    }

    /// Create a memo with a debug name that shows up in trace logging.
    pub fn named<F>(compute: F, name: &str) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Box::new(compute), Some(name.to_owned()))
    }

    fn build(compute: Box<dyn Fn() -> T + Send + Sync>, name: Option<String>) -> Self {
        let runtime = ReactiveRuntime::current();
        let cell = runtime.register_source();
        let observer = runtime.register_memo(cell);
        let memo = Self {
            inner: Arc::new(MemoInner {
                compute,
                cached: RwLock::new(None),
                cell,
                observer,
                name,
                runtime: Arc::downgrade(&runtime),
            }),
        };
        // Populate the initial cache. A panic unwinds through `memo`,
        // unregistering both halves on the way out.
        memo.recompute(&runtime);
        memo
    }

    /// Get the current value, subscribing the ambient observer if one is
    /// active and recomputing first if the memo is stale.
    pub fn get(&self) -> T {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track_read(self.inner.cell);
            if runtime.is_dirty(self.inner.observer) {
                self.recompute(&runtime);
            }
        }
        self.inner
            .cached
            .read()
            .unwrap()
            .as_ref()
            .expect("memo read during its own computation")
            .clone()
    }

    /// Recompute under the memo's own observer identity: previous source
    /// edges are dropped and re-tracked, cleanups registered during the last
    /// computation run first.
    ///
    /// A panic in the computation propagates to the reader and leaves the
    /// memo dirty, so the next read retries.
    fn recompute(&self, runtime: &ReactiveRuntime) {
        let Some((_, cleanups, owned)) = runtime.prepare_run(self.inner.observer) else {
            // Already running (cyclic read) or disposed.
            return;
        };

        let result = catch_unwind(AssertUnwindSafe(|| {
            for child in owned {
                runtime.dispose_observer(child);
            }
            for cleanup in cleanups {
                cleanup();
            }
            runtime.with_observer(self.inner.observer, || (self.inner.compute)())
        }));

        runtime.finish_run(self.inner.observer);

        match result {
            Ok(value) => {
                if let Some(name) = &self.inner.name {
                    trace!(memo = %name, "memo recomputed");
                }
                *self.inner.cached.write().unwrap() = Some(value);
                runtime.mark_clean(self.inner.observer);
                // Writes made inside the computation were deferred.
                runtime.maybe_flush();
            }
            Err(panic) => resume_unwind(panic),
        }
    }
}

/// Create a new memoized computation.
///
/// # Examples
///
/// ```
/// use filament::{create_memo, create_signal};
///
/// let (count, set_count) = create_signal(5);
/// let doubled = create_memo({
///     let count = count.clone();
///     move || count.get() * 2
/// });
/// assert_eq!(doubled.get(), 10);
///
/// set_count.set(10);
/// assert_eq!(doubled.get(), 20);
/// ```
pub fn create_memo<T, F>(compute: F) -> Memo<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Memo::new(compute)
}

/// Like [`create_memo`], with a debug name for trace logging.
pub fn create_memo_named<T, F>(compute: F, name: &str) -> Memo<T>
where
    T: Clone + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Memo::named(compute, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::create_signal;

    #[test]
    fn memo_basic() {
        ReactiveRuntime::scope(|| {
            let (count, set_count) = create_signal(5);
            let doubled = create_memo(move || count.get() * 2);

            assert_eq!(doubled.get(), 10);

            set_count.set(10);
            assert_eq!(doubled.get(), 20);
        });
    }
}
