//! Data structures shared across the executive.
pub(crate) mod arena;
pub(crate) mod heap;
pub(crate) mod prio_bitmap;
