//! Compile-time tunables for the scheduling core.
//!
//! Every knob the scheduler reads is a `const` here rather than a
//! runtime-parsed value.

/// Maximum number of processes.
pub const NPROC: usize = 64;
/// Maximum number of kernel threads per process.
pub const NTHREAD: usize = 8;
/// Maximum number of CPUs.
pub const NCPU: usize = 8;
/// Bytes reserved for a thread's kernel stack.
pub const KSTACKSIZE: usize = 4096 * 4;
/// Bytes in one user page.
pub const PGSIZE: u64 = 4096;
/// Maximum number of open files per process.
pub const NOFILE: usize = 16;

/// Total scheduling weight. `stride.ticket` always sums to this.
pub const MAXTICKET: u32 = 10000;
/// Maximum weight reservable by stride-share processes. Must be `< MAXTICKET`
/// so the MLFQ aggregate (slot 0) always keeps a non-zero ticket count.
pub const MAXSTRIDE: u32 = 8000;
/// Pass values are rescaled once any active slot's pass exceeds this, by
/// subtracting `MAXPASS - SCALEPASS` from every active slot.
pub const MAXPASS: u64 = 1 << 40;
/// Keep window preserved across a pass rescale.
pub const SCALEPASS: u64 = 1 << 20;
/// Fixed-point fractional bits used by stride pass values. Avoids touching
/// FPU state at scheduling boundaries.
pub const PASS_FRAC_BITS: u32 = 32;

/// Number of MLFQ priority levels.
pub const MLFQ_LEVELS: usize = 3;
/// Per-level round-robin time quantum, in ticks.
pub const MLFQ_QUANTUM: [u32; MLFQ_LEVELS] = [5, 10, 20];
/// Per-level cumulative run-time budget before demotion, in ticks.
pub const MLFQ_EXPIRE: [u32; MLFQ_LEVELS] = [20, 40, 200];
/// Boost interval: every `MLFQ_EXPIRE[MLFQ_LEVELS - 1]` ticks, every process
/// below level 0 is promoted back to level 0.
pub const BOOST_INTERVAL: u32 = MLFQ_EXPIRE[MLFQ_LEVELS - 1];

/// Slice length used by `yieldable` for stride-scheduled processes: the
/// finest MLFQ quantum, so a stride participant is at least as preemptable
/// as the most latency-sensitive MLFQ level.
pub const STRIDE_QUANTUM: u32 = MLFQ_QUANTUM[0];
