//! Process/thread syscall handlers.
//!
//! Each handler locks `proc::SCHED` for just as long as the underlying
//! operation needs, and surfaces every recoverable error as `-1`. Calls
//! belonging to subsystems this crate does not implement (`sleep`, `sbrk`,
//! and the rest of the file/VM surface) are not reimplemented here.

use crate::hal::cpu;
use crate::proc::dispatcher;
use crate::proc::sync::{self, JoinOutcome, WaitOutcome};
use crate::proc::thread::{Tid, ThreadState};
use crate::proc::SCHED;

fn current_slot() -> Option<usize> {
    unsafe { cpu::current() }.proc
}

/// Create a child process as a copy of the calling process.
pub fn sys_fork() -> i64 {
    let Some(slot) = current_slot() else { return -1 };
    let mut state = SCHED.lock();
    match state.fork(slot) {
        Ok(pid) => pid as i64,
        Err(e) => e.as_retval(),
    }
}

/// Terminate the calling process. Never returns; the caller's thread has
/// already been marked ZOMBIE by the time this loops into the dispatcher
/// forever.
pub fn sys_exit() -> ! {
    let slot = current_slot().expect("exit with no current process");
    {
        let mut state = SCHED.lock();
        sync::exit(&mut state, slot);
    }
    loop {
        dispatcher::run_once();
    }
}

/// Block until a child exits, reaping it and returning its pid.
pub fn sys_wait() -> i64 {
    let Some(slot) = current_slot() else { return -1 };
    loop {
        let outcome = {
            let mut state = SCHED.lock();
            sync::wait_step(&mut state, slot)
        };
        match outcome {
            WaitOutcome::Reaped(pid) => return pid as i64,
            WaitOutcome::NoChildren => return -1,
            WaitOutcome::Blocked => {
                dispatcher::run_once();
            }
        }
    }
}

/// Mark a process for termination and wake its sleeping threads.
pub fn sys_kill(pid: i32) -> i64 {
    let mut state = SCHED.lock();
    match state.kill(pid) {
        Ok(()) => 0,
        Err(e) => e.as_retval(),
    }
}

/// Give up the calling thread's remaining slice. Tries an in-process
/// thread switch first (`Process::next_thread`); if no other thread in
/// this process is runnable, falls through to the CPU scheduler.
pub fn sys_yield() -> i64 {
    let Some(slot) = current_slot() else { return -1 };
    let mut state = SCHED.lock();
    let outgoing = state.processes[slot].threads.current;
    state.processes[slot].threads.threads[outgoing].state = ThreadState::Runnable;

    if let Some(peer) = state.processes[slot].next_thread() {
        #[cfg(not(test))]
        {
            let outgoing_ctx = &mut state.processes[slot].threads.threads[outgoing].context as *mut _;
            let peer_ctx = &mut state.processes[slot].threads.threads[peer].context as *mut _;
            unsafe { crate::hal::context::switch(outgoing_ctx, peer_ctx) };
        }
        #[cfg(test)]
        let _ = peer;
        return 0;
    }
    drop(state);
    dispatcher::run_once();
    0
}

/// Report the calling process's current MLFQ level, or -1 if stride-scheduled.
pub fn sys_getlev() -> i64 {
    let Some(slot) = current_slot() else { return -1 };
    let state = SCHED.lock();
    sync::getlev(&state, slot) as i64
}

/// Reserve a fixed percentage of CPU time for the calling process via the
/// stride scheduler.
pub fn sys_set_cpu_share(percent: i32) -> i64 {
    let Some(slot) = current_slot() else { return -1 };
    let mut state = SCHED.lock();
    match sync::set_cpu_share(&mut state, slot, percent) {
        Ok(()) => 0,
        Err(e) => e.as_retval(),
    }
}

/// Allocate and start a new thread in the calling process, writing its tid
/// to `out_tid`.
pub fn sys_thread_create(out_tid: &mut Tid, start: u64, arg: usize) -> i64 {
    let Some(slot) = current_slot() else { return -1 };
    let mut state = SCHED.lock();
    let tid = state.alloc_tid();
    match state.processes[slot].thread_create(tid, start, arg) {
        Ok(tid) => {
            *out_tid = tid;
            0
        }
        Err(e) => e.as_retval(),
    }
}

/// Terminate the calling thread, recording `retval` for any joiner. Never
/// returns.
pub fn sys_thread_exit(retval: usize) -> ! {
    let slot = current_slot().expect("thread_exit with no current process");
    let tid = {
        let state = SCHED.lock();
        let idx = state.processes[slot].threads.current;
        state.processes[slot].threads.threads[idx].tid
    };
    {
        let mut state = SCHED.lock();
        sync::thread_exit(&mut state, slot, tid, retval);
    }
    loop {
        dispatcher::run_once();
    }
}

/// Block until thread `tid` exits, writing its return value to
/// `out_retval`.
pub fn sys_thread_join(tid: Tid, out_retval: &mut usize) -> i64 {
    let Some(slot) = current_slot() else { return -1 };
    loop {
        let outcome = {
            let mut state = SCHED.lock();
            sync::thread_join_step(&mut state, slot, tid)
        };
        match outcome {
            JoinOutcome::Done(retval) => {
                *out_retval = retval;
                return 0;
            }
            JoinOutcome::Unknown => return -1,
            JoinOutcome::Blocked => {
                dispatcher::run_once();
            }
        }
    }
}
