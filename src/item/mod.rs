/// Generic paging item reader and its query collaborators.
pub mod paging;

/// Pass-through processor that sleeps before handing each item on.
pub mod delay;

#[cfg(feature = "logger")]
/// This module provides a logger item writer, useful for debugging.
pub mod logger;

#[cfg(feature = "rdbc")]
/// This module provides RDBC (SQLx) query contexts and item writers.
pub mod rdbc;
