//! Fine-grained reactive primitives.
//!
//! This module provides the core building blocks for reactive programming:
//! - Signals: reactive state containers
//! - Memos: lazily cached computed values
//! - Effects: side effects that react to changes, with cleanup support

mod effect;
mod memo;
mod signal;

pub use effect::{create_effect, on_cleanup, untrack, Effect};
pub use memo::{create_memo, create_memo_named, Memo};
pub use signal::{
    create_signal, create_signal_named, ReadSignal, Signal, WriteSignal,
};
