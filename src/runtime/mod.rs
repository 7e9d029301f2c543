//! Runtime support for reactive primitives.
//!
//! This module provides the infrastructure behind the primitives: the
//! dependency graph (an arena of source and observer nodes addressed by
//! stable handles), the ambient tracking pointers that make reads inside an
//! observer auto-subscribe, and the deduplicating scheduler that defers and
//! batches effect runs.

mod context;
mod scheduler;

pub use context::{ObserverId, ReactiveRuntime, SourceId};
pub use scheduler::batch;
