//! # Filament
//!
//! A fine-grained reactive dependency engine for Rust.
//!
//! Filament keeps a live dependency graph between three kinds of node and
//! keeps it consistent under arbitrary read/write patterns:
//!
//! - [`Signal<T>`] - mutable state cells that notify dependents when changed
//! - [`Memo<T>`] - cached computations, marked stale on push and recomputed
//!   lazily on the next read
//! - [`Effect`] - side effects that auto-track the cells they read and
//!   re-run when any of them change
//!
//! Dependencies are discovered automatically: running an effect (or memo)
//! sets an ambient observer, and every signal read during that run
//! subscribes the observer. Edges are rebuilt from scratch on every run, so
//! conditionally-read cells only wake an observer if its *latest* run
//! actually read them.
//!
//! Propagation is deferred and deduplicated by a scheduler: a write enqueues
//! the affected effects and the queue flushes once the current synchronous
//! work unwinds, or at the exit of the outermost [`batch`]. Each effect runs
//! at most once per turn regardless of how many of its sources changed.
//!
//! ```
//! use filament::{batch, create_effect, create_memo, create_signal};
//!
//! let (a, set_a) = create_signal(1);
//! let (b, set_b) = create_signal(2);
//! let sum = create_memo({
//!     let (a, b) = (a.clone(), b.clone());
//!     move || a.get() + b.get()
//! });
//!
//! batch(|| {
//!     set_a.set(10);
//!     set_b.set(20);
//! });
//! assert_eq!(sum.get(), 30);
//! ```
//!
//! The engine is single-threaded in spirit: observers run cooperatively, one
//! at a time, on the thread that triggered the flush. Graph mutation is
//! guarded by a lock so a multi-threaded host can share a runtime, but no
//! two observers ever execute in parallel on one runtime.

pub mod runtime;
pub mod signal;

// Re-export main types for convenience
pub use runtime::batch;
pub use signal::{
    create_effect, create_memo, create_memo_named, create_signal, create_signal_named,
    on_cleanup, untrack, Effect, Memo, ReadSignal, Signal, WriteSignal,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_works() {
        // Basic smoke test
        let (signal, set_signal) = create_signal(0);
        assert_eq!(signal.get(), 0);
        set_signal.set(42);
        assert_eq!(signal.get(), 42);
    }
}
