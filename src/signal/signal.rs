use crate::runtime::{ReactiveRuntime, SourceId};
use std::sync::{Arc, RwLock, Weak};
use tracing::trace;

type Comparator<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Shared backing of a signal: the value itself lives here, the runtime only
/// tracks the dependency edges for the signal's source handle.
struct SignalInner<T> {
    value: RwLock<T>,
    /// Equality policy: a write producing an equal value is a no-op.
    same: Comparator<T>,
    id: SourceId,
    name: Option<String>,
    runtime: Weak<ReactiveRuntime>,
}

impl<T> SignalInner<T> {
    fn track(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track_read(self.id);
        }
        if let Some(name) = &self.name {
            trace!(signal = %name, "signal read");
        }
    }

    fn notify(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.notify(self.id);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SignalInner<T> {
    fn get(&self) -> T {
        self.track();
        self.value.read().unwrap().clone()
    }

    fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        let value = self.value.read().unwrap();
        f(&value)
    }

    fn set(&self, new_value: T) {
        {
            let mut value = self.value.write().unwrap();
            if (self.same)(&value, &new_value) {
                // Equal under the signal's comparison: no store, no
                // notification.
                return;
            }
            *value = new_value;
        }
        // Write lock released before notifying; dependents may read.
        if let Some(name) = &self.name {
            trace!(signal = %name, "signal updated");
        }
        self.notify();
    }

    fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut value = self.value.write().unwrap();
            f(&mut value);
        }
        self.notify();
    }
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        // Last handle gone: prune the source node so the arena slot is
        // reclaimed and no stale edges survive.
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_source(self.id);
        }
    }
}

/// A reactive signal that holds a value and notifies dependents when it
/// changes.
///
/// Reading a signal inside an effect or memo subscribes that observer;
/// reading it anywhere else just returns the value. Writes that leave the
/// value unchanged under the signal's equality policy notify nobody.
///
/// # Examples
///
/// ```
/// use filament::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
/// count.set(42);
/// assert_eq!(count.get(), 42);
/// ```
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Signal<T> {
    /// Create a new signal with the given initial value, comparing writes
    /// with `PartialEq`.
    pub fn new(initial: T) -> Self
    where
        T: PartialEq,
    {
        Self::build(initial, Box::new(|a: &T, b: &T| a == b), None)
    }

    /// Create a signal with a debug name that shows up in trace logging.
    pub fn named(initial: T, name: &str) -> Self
    where
        T: PartialEq,
    {
        Self::build(
            initial,
            Box::new(|a: &T, b: &T| a == b),
            Some(name.to_owned()),
        )
    }

    /// Create a signal with a custom equality policy. `same(old, new)`
    /// returning `true` turns the write into a no-op.
    ///
    /// Useful for types without `PartialEq`, or to force every write through
    /// with `|_, _| false`.
    pub fn with_comparator(
        initial: T,
        same: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::build(initial, Box::new(same), None)
    }

    fn build(initial: T, same: Comparator<T>, name: Option<String>) -> Self {
        let runtime = ReactiveRuntime::current();
        let id = runtime.register_source();
        Self {
            inner: Arc::new(SignalInner {
                value: RwLock::new(initial),
                same,
                id,
                name,
                runtime: Arc::downgrade(&runtime),
            }),
        }
    }

    /// Get the current value, subscribing the ambient observer if one is
    /// active.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Read the value by reference without cloning, still tracked.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    /// Set a new value. A value equal to the current one under the signal's
    /// equality policy is a no-op; otherwise dependents are scheduled.
    pub fn set(&self, new_value: T) {
        self.inner.set(new_value)
    }

    /// Update the value in place and notify dependents unconditionally.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.inner.update(f)
    }

    /// Split into a read half and a write half sharing this signal's state.
    pub fn split(&self) -> (ReadSignal<T>, WriteSignal<T>) {
        (
            ReadSignal {
                inner: Arc::clone(&self.inner),
            },
            WriteSignal {
                inner: Arc::clone(&self.inner),
            },
        )
    }
}

/// The read half of a signal; see [`create_signal`].
pub struct ReadSignal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> ReadSignal<T> {
    /// Get the current value, subscribing the ambient observer if one is
    /// active.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Read the value by reference without cloning, still tracked.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }
}

/// The write half of a signal; see [`create_signal`].
pub struct WriteSignal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for WriteSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> WriteSignal<T> {
    /// Set a new value. A value equal to the current one under the signal's
    /// equality policy is a no-op; otherwise dependents are scheduled.
    pub fn set(&self, new_value: T) {
        self.inner.set(new_value)
    }

    /// Update the value in place and notify dependents unconditionally.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.inner.update(f)
    }
}

/// Create a new signal, returning its read and write halves.
///
/// # Examples
///
/// ```
/// use filament::create_signal;
///
/// let (count, set_count) = create_signal(0);
/// assert_eq!(count.get(), 0);
/// set_count.set(42);
/// assert_eq!(count.get(), 42);
/// ```
pub fn create_signal<T>(initial: T) -> (ReadSignal<T>, WriteSignal<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Signal::new(initial).split()
}

/// Like [`create_signal`], with a debug name for trace logging.
pub fn create_signal_named<T>(initial: T, name: &str) -> (ReadSignal<T>, WriteSignal<T>)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Signal::named(initial, name).split()
}
