//! File primitives shared by the queue, history and signal layers.

pub mod atomic;
pub mod dedup;

pub use atomic::atomic_write;
pub use dedup::BoundedDedupSet;
