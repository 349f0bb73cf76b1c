//! Mutual-exclusion primitives. The scheduler lock in `crate::proc` is the
//! only lock in the core; this is its building block.

pub mod spinmutex;
