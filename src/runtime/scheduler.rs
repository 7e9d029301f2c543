//! Deduplicating, batch-aware effect scheduler.
//!
//! Writes never run effects in place. They enqueue the affected observers
//! and the queue is flushed once the current synchronous work unwinds: at
//! the end of the outermost write when nothing reactive is on the stack, or
//! at the exit of the outermost [`batch`] otherwise. Within one flush each
//! observer runs at most once before its turn, in first-enqueued order, and
//! observers enqueued by the flush itself are appended to the same pass.

use std::any::Any;
use std::panic::{resume_unwind, AssertUnwindSafe};
use tracing::{error, trace};

use super::context::{Context, ObserverId, ReactiveRuntime};

impl Context {
    /// Add an observer to the pending queue unless it is already waiting.
    pub(super) fn enqueue(&mut self, id: ObserverId) {
        if self.queued.insert(id) {
            trace!(observer = ?id, "effect enqueued");
            self.queue.push(id);
        }
    }
}

impl ReactiveRuntime {
    /// Group several writes into one propagation cycle.
    ///
    /// Inside the closure, writes enqueue their dependents but nothing is
    /// flushed; the single flush happens when the outermost batch exits.
    /// Batches nest transparently.
    ///
    /// Prefer the free function [`batch`] unless you hold a runtime handle
    /// already.
    pub fn batch<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.ctx().batch_depth += 1;

        let result = std::panic::catch_unwind(AssertUnwindSafe(f));

        self.ctx().batch_depth -= 1;
        self.maybe_flush();

        match result {
            Ok(r) => r,
            Err(e) => resume_unwind(e),
        }
    }

    /// Flush the pending queue unless propagation is already deferred: by an
    /// open batch, by a flush in progress, or by an observer run that is
    /// still on the stack (its completion triggers the flush instead).
    pub(crate) fn maybe_flush(&self) {
        {
            let mut ctx = self.ctx();
            if ctx.batch_depth > 0
                || ctx.flushing
                || ctx.active_runs > 0
                || ctx.queue.is_empty()
            {
                return;
            }
            ctx.flushing = true;
        }
        self.flush();
    }

    /// Run every pending observer exactly once per turn, in enqueue order.
    ///
    /// The iteration tolerates growth: an observer run may enqueue further
    /// observers (including itself, via a write to one of its own sources)
    /// and those are appended to the same pass. A panicking observer is
    /// isolated: the error is reported and the rest of the flush proceeds.
    fn flush(&self) {
        trace!("flush started");
        let mut at = 0;
        loop {
            let next = {
                let mut ctx = self.ctx();
                if at >= ctx.queue.len() {
                    ctx.queue.clear();
                    ctx.queued.clear();
                    ctx.flushing = false;
                    break;
                }
                let id = ctx.queue[at];
                at += 1;
                // From here on the observer may be re-enqueued; a write
                // landing during its own run schedules a fresh run in the
                // same pass instead of being dropped.
                ctx.queued.remove(&id);
                id
            };
            if let Err(panic) = self.run_observer(next) {
                error!(
                    observer = ?next,
                    panic = panic_message(panic.as_ref()),
                    "observer panicked during flush; continuing"
                );
            }
        }
        trace!("flush finished");
    }

    /// Execute one effect observer: dispose children and run cleanups from
    /// the previous run, then invoke the action with tracking enabled.
    ///
    /// Skips silently when the observer was disposed while pending or is
    /// already running. The caller decides whether a panic propagates
    /// (initial construction) or is isolated (flush).
    pub(crate) fn run_observer(&self, id: ObserverId) -> std::thread::Result<()> {
        let Some((action, cleanups, owned)) = self.prepare_run(id) else {
            return Ok(());
        };

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            for child in owned {
                self.dispose_observer(child);
            }
            for cleanup in cleanups {
                cleanup();
            }
            if let Some(action) = action {
                self.with_observer(id, || action());
            }
        }));

        self.finish_run(id);
        // Writes made during the run were deferred; release them now that
        // the run has unwound.
        self.maybe_flush();
        result
    }
}

/// Group several writes into one propagation cycle on the current runtime.
///
/// # Examples
///
/// ```
/// use filament::{batch, create_effect, create_signal};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let (a, set_a) = create_signal(1);
/// let (b, set_b) = create_signal(2);
/// let runs = Arc::new(AtomicUsize::new(0));
///
/// let _effect = create_effect({
///     let (a, b, runs) = (a.clone(), b.clone(), runs.clone());
///     move || {
///         let _ = a.get() + b.get();
///         runs.fetch_add(1, Ordering::SeqCst);
///     }
/// });
/// assert_eq!(runs.load(Ordering::SeqCst), 1);
///
/// batch(|| {
///     set_a.set(10);
///     set_b.set(20);
/// });
/// // Both writes propagated in a single re-run.
/// assert_eq!(runs.load(Ordering::SeqCst), 2);
/// ```
pub fn batch<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    ReactiveRuntime::current().batch(f)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
