//! Sleep/wakeup and the blocking syscalls built on them.
//!
//! The scheduler lock is this crate's only mutual-exclusion primitive:
//! every wait condition here is `sleep(chan, ...)` on the already-held
//! `SCHED` lock rather than on a second caller-supplied lock, since the
//! other lock kinds a real kernel would pass (buffer locks, device locks)
//! belong to subsystems (filesystem, device I/O) this crate doesn't
//! implement. `chan` is an opaque `u64`; the two namespaces below keep
//! `wait`'s channel (a stable per-process address stand-in) and
//! `thread_join`'s (`tid` cast to an address) from colliding, the way
//! distinct real addresses never would.

use crate::error::{SchedError, SchedResult};
use crate::proc::process::{ProcessState, SchedState};
use crate::proc::thread::{ThreadState, Tid};

const WAIT_CHANNEL_TAG: u64 = 1 << 62;
const JOIN_CHANNEL_TAG: u64 = 1 << 61;

pub fn wait_channel(proc_slot: usize) -> u64 {
    WAIT_CHANNEL_TAG | proc_slot as u64
}

pub fn join_channel(tid: Tid) -> u64 {
    JOIN_CHANNEL_TAG | tid as u64
}

/// Transition the calling thread to SLEEPING on `chan`. The scheduler lock
/// is already held by the caller; the actual suspension, giving up the
/// CPU, happens when the dispatcher's context switch returns control to
/// the scheduler loop, not here.
pub fn sleep(state: &mut SchedState, proc_slot: usize, chan: u64) {
    let thread_index = state.processes[proc_slot].threads.current;
    let thread = &mut state.processes[proc_slot].threads.threads[thread_index];
    thread.chan = Some(chan);
    thread.state = ThreadState::Sleeping;
}

/// Promote every SLEEPING thread matching `chan`, of every RUNNABLE
/// process, back to RUNNABLE. A `wakeup` that happens before the matching
/// `sleep` finishes its transition is simply not observed by this pass;
/// both hold `SCHED`, so there is no missed-wakeup race, only non-queuing
/// semantics: a wakeup with no sleeper yet waiting is not remembered.
pub fn wakeup(state: &mut SchedState, chan: u64) {
    for p in state.processes.iter_mut() {
        if p.state != ProcessState::Runnable {
            continue;
        }
        for t in p.threads.threads.iter_mut() {
            if t.state == ThreadState::Sleeping && t.chan == Some(chan) {
                t.state = ThreadState::Runnable;
                t.chan = None;
            }
        }
    }
}

/// Tear down the exiting process's bookkeeping and wake whoever needs to
/// observe it.
pub fn exit(state: &mut SchedState, proc_slot: usize) {
    let outcome = state.exit(proc_slot);
    if let Some(parent) = outcome.parent {
        wakeup(state, wait_channel(parent));
    }
    if let Some(init) = outcome.wake_init {
        wakeup(state, wait_channel(init));
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Reaped(i32),
    NoChildren,
    /// The caller went to sleep on `wait_channel(proc_slot)`; the dispatcher
    /// will eventually run this process's thread again, which should call
    /// `wait_step` again.
    Blocked,
}

/// One step of `wait()`. A real kernel's `wait` loops forever inside the
/// syscall, suspended between steps by `sleep`'s context switch; this
/// crate exposes the loop body as a single step so it can be driven (and
/// tested) without a real suspension mechanism.
pub fn wait_step(state: &mut SchedState, proc_slot: usize) -> WaitOutcome {
    if let Some(pid) = state.reap_zombie_child(proc_slot) {
        return WaitOutcome::Reaped(pid);
    }
    if !state.has_children(proc_slot) || state.processes[proc_slot].killed {
        return WaitOutcome::NoChildren;
    }
    sleep(state, proc_slot, wait_channel(proc_slot));
    WaitOutcome::Blocked
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Done(usize),
    Unknown,
    Blocked,
}

/// One step of `thread_join(tid, &out)`.
pub fn thread_join_step(state: &mut SchedState, proc_slot: usize, tid: Tid) -> JoinOutcome {
    if state.processes[proc_slot].threads.get(tid).is_none() {
        return JoinOutcome::Unknown;
    }
    if let Some(retval) = state.processes[proc_slot].thread_join(tid) {
        return JoinOutcome::Done(retval);
    }
    sleep(state, proc_slot, join_channel(tid));
    JoinOutcome::Blocked
}

/// Record the return value, mark the thread ZOMBIE, and wake whoever is
/// joining it.
pub fn thread_exit(state: &mut SchedState, proc_slot: usize, tid: Tid, retval: usize) {
    state.processes[proc_slot].thread_exit(tid, retval);
    wakeup(state, join_channel(tid));
}

/// Move a process from MLFQ scheduling to a stride reservation. Refuses a
/// process that already holds one; this crate has no combine-shares rule
/// to fall back on (see DESIGN.md).
pub fn set_cpu_share(state: &mut SchedState, proc_slot: usize, percent: i32) -> SchedResult<()> {
    if percent <= 0 {
        return Err(SchedError::ShareRefused);
    }
    if state.processes[proc_slot].sched.is_stride() {
        return Err(SchedError::ShareRefused);
    }
    let usage = (percent as u32).saturating_mul(crate::param::MAXTICKET) / 100;
    let old_sched = state.processes[proc_slot].sched;
    let stride_index = state.stride.append(proc_slot, usage)?;
    log::debug!(
        "set_cpu_share: proc_slot {} reserves {} tickets at stride index {}",
        proc_slot,
        usage,
        stride_index
    );
    state.mlfq.remove(old_sched.level as usize, old_sched.index);
    state.processes[proc_slot].sched = crate::proc::process::SchedInfo {
        level: -1,
        index: stride_index,
        elapsed: 0,
        start: crate::hal::trap::ticks(),
    };
    Ok(())
}

/// Current MLFQ level, or -1 if stride-scheduled.
pub fn getlev(state: &SchedState, proc_slot: usize) -> i32 {
    state.processes[proc_slot].sched.level
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wakeup_promotes_only_matching_channel_on_runnable_process() {
        let mut s = SchedState::new();
        let slot = s.alloc().unwrap();
        s.processes[slot].state = ProcessState::Runnable;
        sleep(&mut s, slot, 42);
        wakeup(&mut s, 99);
        assert_eq!(s.processes[slot].threads.threads[0].state, ThreadState::Sleeping);
        wakeup(&mut s, 42);
        assert_eq!(s.processes[slot].threads.threads[0].state, ThreadState::Runnable);
    }

    #[test]
    fn kill_wakes_sleeper_and_later_exit_lets_parent_reap() {
        let mut s = SchedState::new();
        let init = s.alloc().unwrap();
        s.init_slot = Some(init);
        s.processes[init].state = ProcessState::Runnable;

        let child_pid = s.fork(init).unwrap();
        let child = s.processes.iter().position(|p| p.pid == child_pid).unwrap();
        sleep(&mut s, child, 7);

        s.kill(child_pid).unwrap();
        assert_eq!(s.processes[child].threads.threads[0].state, ThreadState::Runnable);

        exit(&mut s, child);
        assert_eq!(wait_step(&mut s, init), WaitOutcome::Reaped(child_pid));
    }

    #[test]
    fn join_wakes_exactly_one_waiter() {
        let mut s = SchedState::new();
        let slot = s.alloc().unwrap();
        s.processes[slot].state = ProcessState::Runnable;
        let b = s.processes[slot].thread_create(2, 0, 0).unwrap();

        assert_eq!(thread_join_step(&mut s, slot, b), JoinOutcome::Blocked);
        thread_exit(&mut s, slot, b, 0xdead);
        assert_eq!(thread_join_step(&mut s, slot, b), JoinOutcome::Done(0xdead));
    }

    #[test]
    fn set_cpu_share_then_exit_restores_slot_zero_tickets() {
        let mut s = SchedState::new();
        let init = s.alloc().unwrap();
        s.init_slot = Some(init);
        s.processes[init].state = ProcessState::Runnable;
        let before = s.stride.entries[0].ticket;

        let pid = s.fork(init).unwrap();
        let slot = s.processes.iter().position(|p| p.pid == pid).unwrap();
        set_cpu_share(&mut s, slot, 20).unwrap();
        assert_ne!(s.stride.entries[0].ticket, before);

        exit(&mut s, slot);
        wait_step(&mut s, init);
        assert_eq!(s.stride.entries[0].ticket, before);
    }

    #[test]
    fn set_cpu_share_rejects_nonpositive_percent() {
        let mut s = SchedState::new();
        let slot = s.alloc().unwrap();
        assert_eq!(set_cpu_share(&mut s, slot, 0), Err(SchedError::ShareRefused));
    }

    #[test]
    fn getlev_reports_mlfq_then_stride() {
        let mut s = SchedState::new();
        let slot = s.alloc().unwrap();
        assert_eq!(getlev(&s, slot), 0);
        set_cpu_share(&mut s, slot, 10).unwrap();
        assert_eq!(getlev(&s, slot), -1);
    }
}
