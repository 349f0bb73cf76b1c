//! Per-CPU dispatcher loop: consults the stride layer first, falling
//! through to the MLFQ levels underneath its aggregate slot.
//!
//! The real register-save/restore half of a context switch is the
//! `context_switch` collaborator (`hal::context`) and cannot run without
//! real hardware or a real second thread to switch to, so it is compiled
//! only for non-test builds. The bookkeeping around it (victim selection,
//! elapsed-tick accounting, demotion, boost) stays exercisable on the host
//! either way.

use crate::param::NPROC;
use crate::proc::process::{ProcessState, SchedState};
use crate::proc::stride::StrideSlot;
use crate::proc::thread::ThreadState;
use crate::proc::SCHED;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Nothing runnable; the aggregate was credited a virtual-time tick.
    Idle,
    Ran { proc_slot: usize, thread_index: usize },
}

fn mlfq_has_runnable(state: &SchedState) -> bool {
    state.processes.iter().any(|p| p.sched.level >= 0 && p.is_runnable())
}

/// One iteration of the dispatcher loop body: pick a victim, run it, and
/// account for the slice. Enabling interrupts before the lock and the
/// boost check bracket this in `run_once` below.
fn dispatch_locked(state: &mut SchedState) -> DispatchOutcome {
    // Snapshot runnability before consulting either scheduler layer, so
    // neither `select`'s nor `next`'s closures need to borrow `state`
    // itself (both already borrow a field of it as `&mut`/`&self`).
    let mlfq_runnable = mlfq_has_runnable(state);
    let proc_runnable: arrayvec::ArrayVec<bool, NPROC> =
        state.processes.iter().map(|p| p.is_runnable()).collect();

    let stride_winner = state.stride.select(|i| match state.stride.slot_of(i) {
        StrideSlot::Inactive => false,
        StrideSlot::MlfqAggregate => mlfq_runnable,
        StrideSlot::Process(slot) => proc_runnable[slot],
    });

    let Some(stride_index) = stride_winner else {
        state.stride.advance_pass(0);
        return DispatchOutcome::Idle;
    };

    let proc_slot = match state.stride.slot_of(stride_index) {
        StrideSlot::Process(slot) => slot,
        StrideSlot::MlfqAggregate => match state.mlfq.next(|p| proc_runnable[p]) {
            Some((_, _, slot)) => slot,
            None => {
                // Stride thought the aggregate had something runnable, but
                // the MLFQ scan disagrees (e.g. killed since selection);
                // credit the tick and let the next iteration resettle.
                state.stride.advance_pass(0);
                return DispatchOutcome::Idle;
            }
        },
        StrideSlot::Inactive => unreachable!("select never returns an inactive slot"),
    };

    let Some(thread_index) = state.processes[proc_slot].threads.pick_runnable() else {
        return DispatchOutcome::Idle;
    };

    state.processes[proc_slot].threads.current = thread_index;
    state.processes[proc_slot].threads.threads[thread_index].state = ThreadState::Running;
    unsafe {
        crate::hal::cpu::current().proc = Some(proc_slot);
    }

    let slice_start = crate::hal::trap::ticks();
    state.processes[proc_slot].sched.start = slice_start;

    #[cfg(not(test))]
    {
        let cpu = unsafe { crate::hal::cpu::current() };
        let thread_ctx = &mut state.processes[proc_slot].threads.threads[thread_index].context as *mut _;
        unsafe { crate::hal::context::switch(&mut cpu.context as *mut _, thread_ctx) };
    }

    let slice_ticks = (crate::hal::trap::ticks() - slice_start) as u32;

    unsafe {
        crate::hal::cpu::current().proc = None;
    }
    if state.processes[proc_slot].threads.threads[thread_index].state == ThreadState::Running {
        state.processes[proc_slot].threads.threads[thread_index].state = ThreadState::Runnable;
    }

    account_slice(state, proc_slot, slice_ticks);

    DispatchOutcome::Ran { proc_slot, thread_index }
}

/// Post-slice bookkeeping: stride-pass accrual for whichever of the
/// process or the MLFQ aggregate ran, then demotion or quantum-exhaustion
/// decisions for MLFQ participants.
fn account_slice(state: &mut SchedState, proc_slot: usize, slice_ticks: u32) {
    let sched = state.processes[proc_slot].sched;
    if sched.is_stride() {
        state.stride.advance_pass(sched.index);
        return;
    }

    // MLFQ accrues virtual time against the aggregate slot regardless.
    state.stride.advance_pass(0);

    if state.processes[proc_slot].state == ProcessState::Zombie || state.processes[proc_slot].killed {
        return;
    }

    state.processes[proc_slot].sched.elapsed += slice_ticks;
    let elapsed = state.processes[proc_slot].sched.elapsed;
    let (decision, new_level, new_index) =
        state.mlfq.update(sched.level as usize, sched.index, proc_slot, elapsed, slice_ticks);
    let demoted = new_level != sched.level as usize;
    if demoted {
        log::debug!(
            "demote proc_slot {} from level {} to level {}",
            proc_slot,
            sched.level,
            new_level
        );
    }
    state.processes[proc_slot].sched.level = new_level as i32;
    state.processes[proc_slot].sched.index = new_index;
    if demoted {
        state.processes[proc_slot].sched.elapsed = 0;
    }
    let _ = decision;
}

fn maybe_boost(state: &mut SchedState) {
    if crate::hal::trap::ticks() < state.boost_deadline {
        return;
    }
    let moved = state.mlfq.boost();
    if !moved.is_empty() {
        log::debug!("boost: {} process(es) returned to level 0", moved.len());
    }
    for (slot, new_index) in moved {
        state.processes[slot].sched.level = 0;
        state.processes[slot].sched.index = new_index;
        state.processes[slot].sched.elapsed = 0;
    }
    state.boost_deadline += crate::param::BOOST_INTERVAL as u64;
}

/// One full dispatcher-loop iteration for the calling CPU.
pub fn run_once() -> DispatchOutcome {
    crate::hal::trap::intr_on();
    let mut guard = SCHED.lock();
    let outcome = dispatch_locked(&mut guard);
    maybe_boost(&mut guard);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::process::ProcessState;

    #[test]
    fn idle_system_credits_aggregate_and_reports_idle() {
        let mut state = SchedState::new();
        let before = state.stride.entries[0].pass;
        let outcome = dispatch_locked(&mut state);
        assert_eq!(outcome, DispatchOutcome::Idle);
        assert!(state.stride.entries[0].pass > before);
    }

    #[test]
    fn dispatches_a_runnable_mlfq_process() {
        let mut state = SchedState::new();
        let slot = state.alloc().unwrap();
        state.processes[slot].state = ProcessState::Runnable;
        state.processes[slot].threads.threads[0].state = ThreadState::Runnable;

        let outcome = dispatch_locked(&mut state);
        assert_eq!(outcome, DispatchOutcome::Ran { proc_slot: slot, thread_index: 0 });
    }

    #[test]
    fn stride_participant_is_preferred_when_runnable() {
        let mut state = SchedState::new();
        let mlfq_slot = state.alloc().unwrap();
        state.processes[mlfq_slot].state = ProcessState::Runnable;
        state.processes[mlfq_slot].threads.threads[0].state = ThreadState::Runnable;

        let stride_slot = state.alloc().unwrap();
        state.processes[stride_slot].state = ProcessState::Runnable;
        state.processes[stride_slot].threads.threads[0].state = ThreadState::Runnable;
        crate::proc::sync::set_cpu_share(&mut state, stride_slot, 50).unwrap();
        state.stride.entries[0].pass = 1_000_000;

        let outcome = dispatch_locked(&mut state);
        assert_eq!(outcome, DispatchOutcome::Ran { proc_slot: stride_slot, thread_index: 0 });
    }

    #[test]
    fn boost_runs_once_deadline_crosses() {
        let mut state = SchedState::new();
        let slot = state.alloc().unwrap();
        state.mlfq.demote(0, state.processes[slot].sched.index, slot);
        state.processes[slot].sched.level = 1;

        state.boost_deadline = 0;
        maybe_boost(&mut state);
        assert_eq!(state.processes[slot].sched.level, 0);
    }
}
