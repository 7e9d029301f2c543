use crate::runtime::{ObserverId, ReactiveRuntime};
use std::panic::resume_unwind;
use std::sync::{Arc, Weak};

/// A side effect that re-runs when its dependencies change.
///
/// The action runs once at construction to establish the initial dependency
/// set; every later run first executes the previous run's cleanups, drops
/// the old dependency edges, and re-tracks from scratch. Conditional reads
/// therefore only subscribe to what the *latest* run actually touched.
///
/// Dropping the handle does **not** stop the effect; call
/// [`Effect::dispose`] to tear it down.
///
/// # Examples
///
/// ```
/// use filament::{Effect, Signal};
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
///
/// let signal = Signal::new(5);
/// let last_seen = Arc::new(AtomicI32::new(0));
///
/// let _effect = Effect::new({
///     let (signal, last_seen) = (signal.clone(), last_seen.clone());
///     move || last_seen.store(signal.get(), Ordering::SeqCst)
/// });
/// assert_eq!(last_seen.load(Ordering::SeqCst), 5);
///
/// signal.set(10);
/// assert_eq!(last_seen.load(Ordering::SeqCst), 10);
/// ```
pub struct Effect {
    id: ObserverId,
    runtime: Weak<ReactiveRuntime>,
}

impl Effect {
    /// Create an effect and run it once synchronously.
    ///
    /// A panic during this first run unregisters the half-built observer and
    /// propagates to the caller: the effect is not considered created.
    pub fn new<F>(action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let runtime = ReactiveRuntime::current();
        let id = runtime.register_effect(Arc::new(action));

        if let Err(panic) = runtime.run_observer(id) {
            runtime.dispose_observer(id);
            resume_unwind(panic);
        }

        Self {
            id,
            runtime: Arc::downgrade(&runtime),
        }
    }

    /// Stop the effect: unsubscribe it from every source, dispose observers
    /// it created, and run its cleanups one final time.
    pub fn dispose(self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.dispose_observer(self.id);
        }
    }
}

/// Create a new effect that runs when its dependencies change.
///
/// The effect runs immediately and then again whenever any signal or memo it
/// read on its most recent run changes.
///
/// # Examples
///
/// ```
/// use filament::{create_effect, create_signal};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let (count, set_count) = create_signal(0);
/// let runs = Arc::new(AtomicUsize::new(0));
///
/// let _effect = create_effect({
///     let (count, runs) = (count.clone(), runs.clone());
///     move || {
///         let _ = count.get();
///         runs.fetch_add(1, Ordering::SeqCst);
///     }
/// });
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
///
/// set_count.set(1);
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
/// ```
pub fn create_effect<F>(action: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(action)
}

/// Run a function without dependency tracking and return its result.
///
/// Signal reads inside the closure do not subscribe the ambient observer, so
/// an effect can peek at a value without re-running when it changes.
///
/// # Examples
///
/// ```
/// use filament::{create_effect, create_signal, untrack};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let (tracked, set_tracked) = create_signal(0);
/// let (peeked, set_peeked) = create_signal(0);
/// let runs = Arc::new(AtomicUsize::new(0));
///
/// let _effect = create_effect({
///     let (tracked, peeked, runs) = (tracked.clone(), peeked.clone(), runs.clone());
///     move || {
///         let _ = tracked.get();
///         let _ = untrack(|| peeked.get());
///         runs.fetch_add(1, Ordering::SeqCst);
///     }
/// });
///
/// set_peeked.set(7); // untracked read: no re-run
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
/// set_tracked.set(1);
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
/// ```
pub fn untrack<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    ReactiveRuntime::current().untracked(f)
}

/// Register a teardown callback on the observer currently executing.
///
/// Callbacks run in registration order right before that observer's next
/// run, and exactly once more when it is disposed. Outside any observer the
/// callback is dropped without running.
///
/// # Examples
///
/// ```
/// use filament::{create_effect, create_signal, on_cleanup};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let (count, set_count) = create_signal(0);
/// let cleanups = Arc::new(AtomicUsize::new(0));
///
/// let effect = create_effect({
///     let (count, cleanups) = (count.clone(), cleanups.clone());
///     move || {
///         let _ = count.get();
///         let cleanups = cleanups.clone();
///         on_cleanup(move || {
///             cleanups.fetch_add(1, Ordering::SeqCst);
///         });
///     }
/// });
/// assert_eq!(cleanups.load(Ordering::SeqCst), 0);
///
/// set_count.set(1); // previous run's cleanup fires before the re-run
/// assert_eq!(cleanups.load(Ordering::SeqCst), 1);
///
/// effect.dispose(); // final cleanup fires at disposal
/// assert_eq!(cleanups.load(Ordering::SeqCst), 2);
/// ```
pub fn on_cleanup<F>(cleanup: F)
where
    F: FnOnce() + Send + 'static,
{
    ReactiveRuntime::current().on_cleanup(Box::new(cleanup));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn effect_runs_immediately() {
        ReactiveRuntime::scope(|| {
            let counter = Arc::new(AtomicUsize::new(0));
            let counter_clone = counter.clone();

            create_effect(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            });

            assert_eq!(counter.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn on_cleanup_outside_observer_is_noop() {
        ReactiveRuntime::scope(|| {
            on_cleanup(|| panic!("must never run"));
        });
    }
}
