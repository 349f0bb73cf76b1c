//! The scheduling core: process table, thread pool, MLFQ, stride, the
//! dispatcher loop, and the sleep/wakeup primitives built on them.
//!
//! `process` owns the process table, `thread` the per-process thread pool,
//! `stride` and `mlfq` the two scheduling policies, `dispatcher` picks
//! between them, and `sync` layers sleep/wakeup and join on top. All of it
//! shares one lock, `SCHED`.

pub mod dispatcher;
pub mod mlfq;
pub mod process;
pub mod stride;
pub mod sync;
pub mod thread;

use crate::sync::spinmutex::SpinMutex;
use process::SchedState;

/// The single global scheduler lock, guarding the process table, MLFQ, and
/// stride state together.
pub static SCHED: SpinMutex<SchedState> = SpinMutex::new(SchedState::new());
