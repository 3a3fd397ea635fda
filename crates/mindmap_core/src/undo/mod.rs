//! Command-based undo/redo.
//!
//! # Responsibility
//! - Define reversible commands and the engine that records them.
//! - Deliver node change events raised by command actions.
//!
//! # Invariants
//! - Every document mutation made through the engine is undoable.
//! - Undo stacks are single-threaded and need no locking.

pub mod command;
pub mod engine;
pub mod notify;
