use indexmap::IndexSet;
use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;
use std::collections::HashSet;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, trace};

new_key_type! {
    /// Stable handle for a value-producing node: a signal, or the cell half
    /// of a memo. Handles stay valid until the node is explicitly removed.
    pub struct SourceId;
}

new_key_type! {
    /// Stable handle for a computation node: an effect, or the observer half
    /// of a memo.
    pub struct ObserverId;
}

pub(crate) type EffectFn = Arc<dyn Fn() + Send + Sync>;
pub(crate) type CleanupFn = Box<dyn FnOnce() + Send>;

/// Edges from a source to the observers that read it during their last run.
#[derive(Default)]
pub(super) struct SourceNode {
    pub(super) dependents: IndexSet<ObserverId>,
}

pub(super) enum ObserverKind {
    /// Re-runnable side effect; the scheduler invokes the action on flush.
    Effect { action: EffectFn },
    /// Observer half of a memo. `cell` is the memo's own source node.
    /// Staleness propagates through `cell` without recomputing; the actual
    /// recomputation happens on the next read.
    Memo { cell: SourceId, dirty: bool },
}

pub(super) struct ObserverNode {
    pub(super) kind: ObserverKind,
    /// Sources read during the last run. Cleared and rebuilt from scratch on
    /// every run, so conditional reads drop edges to cells no longer read.
    pub(super) sources: IndexSet<SourceId>,
    /// Teardown callbacks from the last run, executed in registration order
    /// before the next run and once more at disposal.
    pub(super) cleanups: Vec<CleanupFn>,
    /// Observers created during the last run; disposed before the next run
    /// and at disposal.
    pub(super) owned: Vec<ObserverId>,
    pub(super) running: bool,
    pub(super) owner: Option<ObserverId>,
}

/// The dependency graph plus ambient and scheduler state, behind one lock.
/// User computations never run while the lock is held.
pub(super) struct Context {
    pub(super) sources: SlotMap<SourceId, SourceNode>,
    pub(super) observers: SlotMap<ObserverId, ObserverNode>,
    pub(super) current_observer: Option<ObserverId>,
    pub(super) cleanup_owner: Option<ObserverId>,
    // Scheduler state; the queue/flush methods live in scheduler.rs.
    pub(super) queue: Vec<ObserverId>,
    pub(super) queued: HashSet<ObserverId>,
    pub(super) flushing: bool,
    pub(super) batch_depth: usize,
    /// Number of observer runs currently on the call stack. While non-zero,
    /// scheduled effects wait until the outermost run unwinds.
    pub(super) active_runs: usize,
}

impl Context {
    fn new() -> Self {
        Self {
            sources: SlotMap::with_key(),
            observers: SlotMap::with_key(),
            current_observer: None,
            cleanup_owner: None,
            queue: Vec::new(),
            queued: HashSet::new(),
            flushing: false,
            batch_depth: 0,
            active_runs: 0,
        }
    }

    fn clear(&mut self) {
        self.sources.clear();
        self.observers.clear();
        self.current_observer = None;
        self.cleanup_owner = None;
        self.queue.clear();
        self.queued.clear();
        self.flushing = false;
        self.batch_depth = 0;
        self.active_runs = 0;
    }
}

/// Hybrid reactive runtime for managing reactive primitives.
///
/// Supports both a global runtime (default) and scoped runtimes for
/// isolation. The runtime owns the dependency graph between signals, effects
/// and memos, the ambient tracking pointers, and the effect scheduler.
///
/// # Examples
///
/// Using the default global runtime:
///
/// ```
/// use filament::Signal;
///
/// let signal = Signal::new(42);
/// assert_eq!(signal.get(), 42);
/// ```
///
/// Using scoped runtimes for isolation:
///
/// ```
/// use filament::runtime::ReactiveRuntime;
/// use filament::Signal;
///
/// ReactiveRuntime::scope(|| {
///     let signal = Signal::new(0);
///     assert_eq!(signal.get(), 0);
/// });
/// // Runtime and all its state is dropped here
/// ```
pub struct ReactiveRuntime {
    inner: Mutex<Context>,
}

// Thread-local stack for scoped runtimes
thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<ReactiveRuntime>>> = RefCell::new(vec![]);
}

impl ReactiveRuntime {
    /// Create a new isolated runtime with its own dependency graph.
    pub fn new() -> Arc<Self> {
        debug!("creating reactive runtime");
        Arc::new(ReactiveRuntime {
            inner: Mutex::new(Context::new()),
        })
    }

    /// Run a function with a fresh isolated runtime.
    ///
    /// Useful for testing or embedding independent reactive contexts. The
    /// runtime and all its state is dropped when the function returns.
    ///
    /// # Examples
    ///
    /// ```
    /// use filament::runtime::ReactiveRuntime;
    /// use filament::Signal;
    ///
    /// ReactiveRuntime::scope(|| {
    ///     let signal = Signal::new(0);
    ///     assert_eq!(signal.get(), 0);
    /// });
    /// ```
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let runtime = Self::new();
        Self::with_runtime(runtime, f)
    }

    /// Get or create the global runtime (fallback).
    pub fn global() -> Arc<Self> {
        static RUNTIME: OnceLock<Arc<ReactiveRuntime>> = OnceLock::new();
        Arc::clone(RUNTIME.get_or_init(Self::new))
    }

    /// Get the current reactive runtime (scoped or global fallback).
    pub fn current() -> Arc<Self> {
        RUNTIME_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .cloned()
                .unwrap_or_else(Self::global)
        })
    }

    /// Run a function with a specific runtime as the current context.
    ///
    /// Pushes the runtime onto the thread-local stack for the duration of
    /// the function execution; panic-safe.
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = catch_unwind(AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => resume_unwind(e),
        }
    }

    /// Drop every node, pending effect and ambient pointer from this runtime.
    ///
    /// Useful for resetting between tests. Handles held by primitives
    /// created before the clear become inert.
    pub fn clear(&self) {
        self.ctx().clear();
        debug!("runtime cleared");
    }

    pub(super) fn ctx(&self) -> MutexGuard<'_, Context> {
        self.inner.lock().unwrap()
    }

    /// Register a new source node (a signal, or a memo's cell half).
    pub(crate) fn register_source(&self) -> SourceId {
        self.ctx().sources.insert(SourceNode::default())
    }

    /// Remove a source node, severing its dependent edges. Observers that
    /// still list it as a source skip the stale handle on their next run.
    pub(crate) fn remove_source(&self, source: SourceId) {
        self.ctx().sources.remove(source);
    }

    /// Register an effect observer. If another observer is currently
    /// executing it becomes the owner, and disposes this one as part of its
    /// own cleanup path.
    pub(crate) fn register_effect(&self, action: EffectFn) -> ObserverId {
        self.register_observer_node(ObserverKind::Effect { action })
    }

    /// Register the observer half of a memo, initially dirty.
    pub(crate) fn register_memo(&self, cell: SourceId) -> ObserverId {
        self.register_observer_node(ObserverKind::Memo { cell, dirty: true })
    }

    fn register_observer_node(&self, kind: ObserverKind) -> ObserverId {
        let mut guard = self.ctx();
        let ctx = &mut *guard;
        let owner = ctx.current_observer;
        let id = ctx.observers.insert(ObserverNode {
            kind,
            sources: IndexSet::new(),
            cleanups: Vec::new(),
            owned: Vec::new(),
            running: false,
            owner,
        });
        if let Some(parent) = owner {
            if let Some(parent_node) = ctx.observers.get_mut(parent) {
                parent_node.owned.push(id);
            }
        }
        trace!(observer = ?id, ?owner, "observer registered");
        id
    }

    /// Record a read of `source` by the ambient observer, if any.
    ///
    /// The subscription is bidirectional: the source learns its dependent,
    /// the observer remembers the source so it can unsubscribe before its
    /// next run. Reads outside any observer return untracked.
    pub(crate) fn track_read(&self, source: SourceId) {
        let mut guard = self.ctx();
        let ctx = &mut *guard;
        let Some(observer) = ctx.current_observer else {
            return;
        };
        let Some(node) = ctx.sources.get_mut(source) else {
            return;
        };
        if node.dependents.insert(observer) {
            trace!(?source, ?observer, "dependency tracked");
        }
        if let Some(observer_node) = ctx.observers.get_mut(observer) {
            observer_node.sources.insert(source);
        }
    }

    /// Propagate a source change: memos along the way are marked dirty (once)
    /// and traversed through their own cells, effects are enqueued. The
    /// actual effect runs happen when the scheduler flushes.
    pub(crate) fn notify(&self, source: SourceId) {
        enum Mark {
            Cascade(SourceId),
            Run,
            Skip,
        }

        {
            let mut guard = self.ctx();
            let ctx = &mut *guard;
            let Some(node) = ctx.sources.get(source) else {
                return;
            };
            // Snapshot the dependents: marking may mutate dependent sets.
            let mut worklist: Vec<ObserverId> = node.dependents.iter().copied().collect();
            let mut at = 0;
            while at < worklist.len() {
                let id = worklist[at];
                at += 1;
                let mark = match ctx.observers.get_mut(id) {
                    Some(ObserverNode {
                        kind: ObserverKind::Memo { cell, dirty },
                        ..
                    }) => {
                        if *dirty {
                            // Already stale; its dependents were reached when
                            // it was first dirtied.
                            Mark::Skip
                        } else {
                            *dirty = true;
                            Mark::Cascade(*cell)
                        }
                    }
                    Some(ObserverNode {
                        kind: ObserverKind::Effect { .. },
                        ..
                    }) => Mark::Run,
                    None => Mark::Skip,
                };
                match mark {
                    Mark::Cascade(cell) => {
                        trace!(observer = ?id, "memo marked dirty");
                        if let Some(cell_node) = ctx.sources.get(cell) {
                            worklist.extend(cell_node.dependents.iter().copied());
                        }
                    }
                    Mark::Run => ctx.enqueue(id),
                    Mark::Skip => {}
                }
            }
        }
        self.maybe_flush();
    }

    /// Run a function with a specific observer as the ambient tracking and
    /// cleanup target; previous pointers are restored afterwards, panics
    /// included.
    pub(crate) fn with_observer<F, R>(&self, id: ObserverId, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let (prev_observer, prev_owner) = {
            let mut ctx = self.ctx();
            (
                ctx.current_observer.replace(id),
                ctx.cleanup_owner.replace(id),
            )
        };

        let result = catch_unwind(AssertUnwindSafe(f));

        {
            let mut ctx = self.ctx();
            ctx.current_observer = prev_observer;
            ctx.cleanup_owner = prev_owner;
        }

        match result {
            Ok(r) => r,
            Err(e) => resume_unwind(e),
        }
    }

    /// Run a function with the ambient tracking pointer cleared, so reads
    /// inside it create no subscriptions. The cleanup owner is untouched.
    pub(crate) fn untracked<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = self.ctx().current_observer.take();

        let result = catch_unwind(AssertUnwindSafe(f));

        self.ctx().current_observer = prev;

        match result {
            Ok(r) => r,
            Err(e) => resume_unwind(e),
        }
    }

    /// Append a teardown callback to the ambient cleanup owner's list.
    /// Without an active owner the callback is dropped.
    pub(crate) fn on_cleanup(&self, cleanup: CleanupFn) {
        let mut guard = self.ctx();
        let ctx = &mut *guard;
        if let Some(owner) = ctx.cleanup_owner {
            if let Some(node) = ctx.observers.get_mut(owner) {
                node.cleanups.push(cleanup);
            }
        }
    }

    /// Whether a memo observer needs recomputation.
    pub(crate) fn is_dirty(&self, id: ObserverId) -> bool {
        match self.ctx().observers.get(id) {
            Some(ObserverNode {
                kind: ObserverKind::Memo { dirty, .. },
                ..
            }) => *dirty,
            _ => false,
        }
    }

    /// Mark a memo observer as clean after a recomputation.
    pub(crate) fn mark_clean(&self, id: ObserverId) {
        if let Some(ObserverNode {
            kind: ObserverKind::Memo { dirty, .. },
            ..
        }) = self.ctx().observers.get_mut(id)
        {
            *dirty = false;
        }
    }

    /// Begin an observer run: set the re-entrancy guard, take the previous
    /// run's cleanups and owned children, and drop all stale source edges so
    /// tracking starts from a blank slate.
    ///
    /// Returns `None` when the observer is gone or already running; in the
    /// latter case any triggering write has already been queued, so the
    /// update is deferred to the next run rather than lost.
    pub(crate) fn prepare_run(
        &self,
        id: ObserverId,
    ) -> Option<(Option<EffectFn>, Vec<CleanupFn>, Vec<ObserverId>)> {
        let mut guard = self.ctx();
        let ctx = &mut *guard;
        let node = ctx.observers.get_mut(id)?;
        if node.running {
            return None;
        }
        node.running = true;
        let cleanups = std::mem::take(&mut node.cleanups);
        let owned = std::mem::take(&mut node.owned);
        let sources = std::mem::take(&mut node.sources);
        let action = match &node.kind {
            ObserverKind::Effect { action } => Some(Arc::clone(action)),
            ObserverKind::Memo { .. } => None,
        };
        for source in sources {
            if let Some(source_node) = ctx.sources.get_mut(source) {
                source_node.dependents.shift_remove(&id);
            }
        }
        ctx.active_runs += 1;
        Some((action, cleanups, owned))
    }

    /// End an observer run begun by a successful `prepare_run`.
    pub(crate) fn finish_run(&self, id: ObserverId) {
        let mut ctx = self.ctx();
        ctx.active_runs -= 1;
        if let Some(node) = ctx.observers.get_mut(id) {
            node.running = false;
        }
    }

    /// Remove an observer for good: sever its edges, drop it from the
    /// pending queue, dispose its owned children and run its cleanups one
    /// final time.
    pub(crate) fn dispose_observer(&self, id: ObserverId) {
        let (cleanups, owned) = {
            let mut guard = self.ctx();
            let ctx = &mut *guard;
            let Some(node) = ctx.observers.remove(id) else {
                return;
            };
            for source in &node.sources {
                if let Some(source_node) = ctx.sources.get_mut(*source) {
                    source_node.dependents.shift_remove(&id);
                }
            }
            ctx.queued.remove(&id);
            trace!(observer = ?id, owner = ?node.owner, "observer disposed");
            (node.cleanups, node.owned)
        };
        for child in owned {
            self.dispose_observer(child);
        }
        for cleanup in cleanups {
            cleanup();
        }
    }
}
