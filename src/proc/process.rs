//! The process table and the single scheduler-wide state that owns it
//! together with the MLFQ and stride structures. The table is a single
//! owner handing out short-lived mutable borrows under a lock guard, rather
//! than each process managing its own scheduling bookkeeping.

use arrayvec::ArrayVec;

use crate::error::{invariant_violation, SchedError, SchedResult};
use crate::hal::memory::{AddressSpace, StubAddressSpace};
use crate::param::{NOFILE, NPROC, NTHREAD};
use crate::proc::mlfq::Mlfq;
use crate::proc::stride::{Stride, StrideSlot};
use crate::proc::thread::{Thread, ThreadPool, ThreadState, Tid};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ProcessState {
    #[default]
    Unused,
    Embryo,
    Runnable,
    Zombie,
}

/// Where a process sits in the two-level scheduler. `level == -1` means
/// stride-scheduled, with `index` naming its slot in `Stride::entries`;
/// otherwise `(level, index)` names its slot in `Mlfq::levels`.
#[derive(Copy, Clone, Debug, Default)]
pub struct SchedInfo {
    pub level: i32,
    pub index: usize,
    pub elapsed: u32,
    pub start: u64,
}

impl SchedInfo {
    pub fn is_stride(&self) -> bool {
        self.level < 0
    }
}

#[derive(Copy, Clone)]
pub struct Process {
    pub pid: i32,
    pub name: [u8; 16],
    pub address_space: StubAddressSpace,
    pub memory_size: u64,
    /// Back-reference only, never an owning handle.
    pub parent: Option<usize>,
    pub killed: bool,
    pub threads: ThreadPool,
    pub open_files: [Option<u32>; NOFILE],
    pub cwd: Option<u32>,
    pub sched: SchedInfo,
    pub state: ProcessState,
}

impl Process {
    const fn new() -> Process {
        Process {
            pid: 0,
            name: [0; 16],
            address_space: StubAddressSpace { size: 0 },
            memory_size: 0,
            parent: None,
            killed: false,
            threads: ThreadPool::new(),
            open_files: [None; NOFILE],
            cwd: None,
            sched: SchedInfo {
                level: 0,
                index: 0,
                elapsed: 0,
                start: 0,
            },
            state: ProcessState::Unused,
        }
    }

    /// Runnable by the dispatcher iff at least one thread is RUNNABLE.
    pub fn is_runnable(&self) -> bool {
        self.state == ProcessState::Runnable && self.threads.is_runnable()
    }

    fn set_name(&mut self, name: &str) {
        self.name = [0; 16];
        for (dst, src) in self.name.iter_mut().zip(name.as_bytes()) {
            *dst = *src;
        }
    }

    /// Create a new thread at `start` with argument `arg`. `tid` is
    /// assigned by the caller (`SchedState`'s monotonic thread-id counter),
    /// since a single process has no global-id source of its own.
    pub fn thread_create(&mut self, tid: Tid, start: u64, arg: usize) -> SchedResult<Tid> {
        let index = self.threads.alloc_slot().ok_or(SchedError::OutOfSlots)?;

        let kernel_stack = match self.threads.threads[index].kernel_stack {
            Some(page) => page,
            None => crate::hal::memory::alloc_page().ok_or(SchedError::OutOfMemory)?,
        };

        let user_stack = match self.threads.user_stacks[index] {
            Some(base) => base,
            None => {
                let new_size = self
                    .address_space
                    .resize(self.memory_size, crate::param::PGSIZE as i64)
                    .map_err(|_| SchedError::OutOfMemory)?;
                self.memory_size = new_size;
                new_size - crate::param::PGSIZE
            }
        };

        let current_trapframe = self.threads.threads[self.threads.current].trapframe;

        let thread = &mut self.threads.threads[index];
        thread.tid = tid;
        thread.state = ThreadState::Runnable;
        thread.kernel_stack = Some(kernel_stack);
        thread.trapframe = current_trapframe;
        thread.entry_point = start;
        thread.arg = arg;
        self.threads.user_stacks[index] = Some(user_stack);

        Ok(tid)
    }

    /// Marks the thread ZOMBIE and records its return value. Waking the
    /// joiner is the caller's job (`proc::sync::wakeup`), since that is
    /// scheduler-table-wide.
    pub fn thread_exit(&mut self, tid: Tid, retval: usize) {
        if let Some(t) = self.threads.get_mut(tid) {
            t.retval = retval;
            t.state = ThreadState::Zombie;
        }
    }

    /// Release a ZOMBIE thread's slot, keeping its kernel/user stacks
    /// cached at the same index. Returns its `retval`. `None` if `tid`
    /// does not name a ZOMBIE thread of this process; the caller sleeps
    /// and retries.
    pub fn thread_join(&mut self, tid: Tid) -> Option<usize> {
        let index = self
            .threads
            .threads
            .iter()
            .position(|t| t.state != ThreadState::Unused && t.tid == tid)?;
        if self.threads.threads[index].state != ThreadState::Zombie {
            return None;
        }
        let retval = self.threads.threads[index].retval;
        self.threads.release(index);
        Some(retval)
    }

    /// Switch to another RUNNABLE thread in this process without reloading
    /// the page directory. Returns the peer's index so the caller can
    /// perform the actual context switch; `None` if no other thread is
    /// runnable, in which case the caller falls through to the CPU
    /// scheduler.
    pub fn next_thread(&mut self) -> Option<usize> {
        let current = self.threads.current;
        let peer = self.threads.next_runnable_after(current)?;
        if self.threads.threads[current].state == ThreadState::Running {
            self.threads.threads[current].state = ThreadState::Runnable;
        }
        self.threads.threads[peer].state = ThreadState::Running;
        self.threads.current = peer;
        Some(peer)
    }
}

impl Default for Process {
    fn default() -> Self {
        Process::new()
    }
}

/// The single lock-guarded owner of every scheduler data structure: all
/// scheduler data lives under one global spinlock, held as
/// `proc::SCHED: SpinMutex<SchedState>`.
pub struct SchedState {
    pub processes: [Process; NPROC],
    pub mlfq: Mlfq,
    pub stride: Stride,
    next_pid: i32,
    next_tid: Tid,
    pub init_slot: Option<usize>,
    pub boost_deadline: u64,
}

/// What `SchedState::exit` observed: who to wake. `wake_init` is set when a
/// reparented child was already a zombie, so `init` needs waking to reap
/// it.
pub struct ExitOutcome {
    pub parent: Option<usize>,
    pub wake_init: Option<usize>,
}

impl SchedState {
    pub const fn new() -> SchedState {
        SchedState {
            processes: [Process::new(); NPROC],
            mlfq: Mlfq::new(),
            stride: Stride::new(),
            next_pid: 1,
            next_tid: 1,
            init_slot: None,
            boost_deadline: crate::param::BOOST_INTERVAL as u64,
        }
    }

    pub fn alloc_tid(&mut self) -> Tid {
        let tid = self.next_tid;
        self.next_tid += 1;
        tid
    }

    /// Allocate a fresh process table slot. On any failure past the
    /// initial slot search, the partially initialized slot is rolled back
    /// to `Unused`.
    pub fn alloc(&mut self) -> SchedResult<usize> {
        let slot = self
            .processes
            .iter()
            .position(|p| p.state == ProcessState::Unused)
            .ok_or(SchedError::OutOfSlots)?;

        let pid = self.next_pid;
        self.next_pid += 1;

        let address_space = match StubAddressSpace::create() {
            Some(a) => a,
            None => return Err(SchedError::OutOfMemory),
        };

        let kernel_stack = match crate::hal::memory::alloc_page() {
            Some(page) => page,
            None => return Err(SchedError::OutOfMemory),
        };

        let mlfq_index = match self.mlfq.admit(slot) {
            Some(i) => i,
            None => return Err(SchedError::OutOfSlots),
        };
        log::trace!("admit pid {} at slot {} (mlfq index {})", pid, slot, mlfq_index);

        let tid = self.alloc_tid();
        let proc = &mut self.processes[slot];
        *proc = Process::new();
        proc.pid = pid;
        proc.state = ProcessState::Embryo;
        proc.address_space = address_space;
        proc.sched = SchedInfo {
            level: 0,
            index: mlfq_index,
            elapsed: 0,
            start: crate::hal::trap::ticks(),
        };
        let mut thread0 = Thread::new();
        thread0.tid = tid;
        thread0.state = ThreadState::Embryo;
        thread0.kernel_stack = Some(kernel_stack);
        proc.threads.threads[0] = thread0;
        proc.threads.current = 0;

        Ok(slot)
    }

    /// Create a child process as a copy of `parent_slot`.
    pub fn fork(&mut self, parent_slot: usize) -> SchedResult<i32> {
        let child_slot = match self.alloc() {
            Ok(slot) => slot,
            Err(e) => return Err(e),
        };

        let (parent_size, parent_current, parent_trapframe, parent_open_files, parent_cwd, parent_user_stacks) = {
            let parent = &self.processes[parent_slot];
            (
                parent.memory_size,
                parent.threads.current,
                parent.threads.threads[parent.threads.current].trapframe,
                parent.open_files,
                parent.cwd,
                parent.threads.user_stacks,
            )
        };

        let copy_result = {
            let (parent_slice, child_slice) = if parent_slot < child_slot {
                let (left, right) = self.processes.split_at_mut(child_slot);
                (&left[parent_slot], &mut right[0])
            } else {
                let (left, right) = self.processes.split_at_mut(parent_slot);
                (&right[0], &mut left[child_slot])
            };
            parent_slice
                .address_space
                .copy_into(&mut child_slice.address_space, parent_size)
        };
        if copy_result.is_err() {
            self.rollback_embryo(child_slot);
            return Err(SchedError::OutOfMemory);
        }

        let child = &mut self.processes[child_slot];
        child.memory_size = parent_size;
        child.parent = Some(parent_slot);
        child.threads.threads[0].trapframe = parent_trapframe;
        child.threads.threads[0].retval = 0;
        child.open_files = parent_open_files;
        child.cwd = parent_cwd;
        child.threads.user_stacks = parent_user_stacks;
        // The parent's current thread's user-stack slot becomes the
        // child's slot 0.
        child.threads.user_stacks.swap(0, parent_current);
        child.threads.current = 0;
        child.state = ProcessState::Runnable;
        let child_pid = child.pid;

        Ok(child_pid)
    }

    fn rollback_embryo(&mut self, slot: usize) {
        let sched = self.processes[slot].sched;
        self.mlfq.remove(sched.level.max(0) as usize, sched.index);
        self.processes[slot] = Process::new();
    }

    /// Marks the process and every non-UNUSED thread ZOMBIE, wakes the
    /// parent, and reparents children to `init` (waking `init` if a
    /// reparented child is already a zombie). Entering the scheduler
    /// without returning is left to the caller (the dispatcher), since this
    /// function only performs the bookkeeping. `init` exiting is fatal.
    pub fn exit(&mut self, slot: usize) -> ExitOutcome {
        if Some(slot) == self.init_slot {
            invariant_violation!("init exiting");
        }

        let mut wake_init = false;
        for i in 0..NPROC {
            if self.processes[i].parent == Some(slot) {
                self.processes[i].parent = self.init_slot;
                if self.processes[i].state == ProcessState::Zombie {
                    wake_init = true;
                }
            }
        }

        let proc = &mut self.processes[slot];
        proc.state = ProcessState::Zombie;
        for t in proc.threads.threads.iter_mut() {
            if t.state != ThreadState::Unused {
                t.state = ThreadState::Zombie;
            }
        }
        ExitOutcome {
            parent: proc.parent,
            wake_init: wake_init.then_some(()).and(self.init_slot),
        }
    }

    /// Sweep the caller's children for a ZOMBIE, tear it down fully, and
    /// return its pid. `None` when the caller has no zombie child yet; see
    /// `proc::sync::wait`, which calls this in a loop and sleeps between
    /// attempts.
    pub fn reap_zombie_child(&mut self, parent_slot: usize) -> Option<i32> {
        let child_slot = (0..NPROC).find(|&i| {
            self.processes[i].parent == Some(parent_slot) && self.processes[i].state == ProcessState::Zombie
        })?;

        let pid = self.processes[child_slot].pid;
        let sched = self.processes[child_slot].sched;
        if sched.is_stride() {
            self.stride.delete(sched.index);
        } else {
            self.mlfq.remove(sched.level as usize, sched.index);
        }
        let size = self.processes[child_slot].memory_size;
        self.processes[child_slot].address_space.destroy(size);
        self.processes[child_slot] = Process::new();
        Some(pid)
    }

    pub fn has_children(&self, parent_slot: usize) -> bool {
        self.processes.iter().any(|p| p.parent == Some(parent_slot) && p.state != ProcessState::Unused)
    }

    /// Mark the process named by `pid` for termination, waking any of its
    /// sleeping threads so they observe the `killed` flag.
    pub fn kill(&mut self, pid: i32) -> SchedResult<()> {
        let slot = self
            .processes
            .iter()
            .position(|p| p.state != ProcessState::Unused && p.pid == pid)
            .ok_or(SchedError::NotFound)?;

        log::warn!("kill pid {} at slot {}", pid, slot);
        self.processes[slot].killed = true;
        for t in self.processes[slot].threads.threads.iter_mut() {
            if t.state == ThreadState::Sleeping {
                t.state = ThreadState::Runnable;
            }
        }
        Ok(())
    }

    pub fn name(&self, slot: usize) -> &str {
        let name = &self.processes[slot].name;
        let len = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        core::str::from_utf8(&name[..len]).unwrap_or("")
    }

    pub fn set_name(&mut self, slot: usize, name: &str) {
        self.processes[slot].set_name(name);
    }

    /// One line per non-UNUSED process, for a console hook to print. This
    /// crate doesn't implement that console hook itself.
    pub fn dump(&self) -> ArrayVec<(i32, ProcessState, i32, usize), NPROC> {
        let mut out = ArrayVec::new();
        for p in self.processes.iter().filter(|p| p.state != ProcessState::Unused) {
            let _ = out.try_push((p.pid, p.state, p.sched.level, p.sched.index));
        }
        out
    }
}

impl Default for SchedState {
    fn default() -> Self {
        SchedState::new()
    }
}

/// The MLFQ slot a process claims must point back to it, and a stride
/// participant's slot must agree too. Exercised in tests, not on any hot
/// path.
pub fn check_back_references(state: &SchedState) {
    for (slot, p) in state.processes.iter().enumerate() {
        if p.state == ProcessState::Unused {
            continue;
        }
        if p.sched.level >= 0 {
            let level = p.sched.level as usize;
            if state.mlfq.levels[level].slots[p.sched.index] != Some(slot) {
                invariant_violation!("mlfq back-reference broken for slot {}", slot);
            }
        } else if state.stride.slot_of(p.sched.index) != StrideSlot::Process(slot) {
            invariant_violation!("stride back-reference broken for slot {}", slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_places_process_in_embryo_at_mlfq_level_zero() {
        let mut s = SchedState::new();
        let slot = s.alloc().unwrap();
        assert_eq!(s.processes[slot].state, ProcessState::Embryo);
        assert_eq!(s.processes[slot].sched.level, 0);
        assert_eq!(s.mlfq.levels[0].slots[s.processes[slot].sched.index], Some(slot));
    }

    #[test]
    fn alloc_fails_when_table_full() {
        let mut s = SchedState::new();
        for _ in 0..NPROC {
            s.alloc().unwrap();
        }
        assert_eq!(s.alloc(), Err(SchedError::OutOfSlots));
    }

    #[test]
    fn fork_inherits_and_swaps_user_stack_slot() {
        let mut s = SchedState::new();
        let parent = s.alloc().unwrap();
        s.processes[parent].state = ProcessState::Runnable;
        s.processes[parent].threads.current = 2;
        s.processes[parent].threads.user_stacks[2] = Some(0xbeef);
        s.processes[parent].threads.user_stacks[0] = Some(0xdead);

        let child_pid = s.fork(parent).unwrap();
        let child_slot = s
            .processes
            .iter()
            .position(|p| p.pid == child_pid)
            .unwrap();
        assert_eq!(s.processes[child_slot].threads.current, 0);
        assert_eq!(s.processes[child_slot].threads.user_stacks[0], Some(0xbeef));
        assert_eq!(s.processes[child_slot].parent, Some(parent));
    }

    #[test]
    fn exit_marks_zombie_and_threads_zombie() {
        let mut s = SchedState::new();
        let init = s.alloc().unwrap();
        s.init_slot = Some(init);
        s.processes[init].state = ProcessState::Runnable;

        let child = s.alloc().unwrap();
        s.processes[child].state = ProcessState::Runnable;
        s.processes[child].parent = Some(init);
        s.processes[child].threads.threads[0].state = ThreadState::Running;

        s.exit(child);
        assert_eq!(s.processes[child].state, ProcessState::Zombie);
        assert_eq!(s.processes[child].threads.threads[0].state, ThreadState::Zombie);
    }

    #[test]
    fn wait_reaps_zombie_and_frees_slot() {
        let mut s = SchedState::new();
        let init = s.alloc().unwrap();
        s.init_slot = Some(init);
        let child = s.alloc().unwrap();
        s.processes[child].parent = Some(init);
        s.exit(child);

        let pid = s.processes[child].pid;
        let reaped = s.reap_zombie_child(init).unwrap();
        assert_eq!(reaped, pid);
        assert_eq!(s.processes[child].state, ProcessState::Unused);
    }

    #[test]
    fn fork_n_and_wait_n_yields_every_pid_once() {
        let mut s = SchedState::new();
        let init = s.alloc().unwrap();
        s.init_slot = Some(init);
        s.processes[init].state = ProcessState::Runnable;

        let mut pids = ArrayVec::<i32, 8>::new();
        for _ in 0..5 {
            let pid = s.fork(init).unwrap();
            pids.push(pid);
        }
        for slot in 0..NPROC {
            if s.processes[slot].parent == Some(init) {
                s.exit(slot);
            }
        }
        let mut reaped = ArrayVec::<i32, 8>::new();
        while let Some(pid) = s.reap_zombie_child(init) {
            reaped.push(pid);
        }
        reaped.sort_unstable();
        let mut expected = pids;
        expected.sort_unstable();
        assert_eq!(reaped, expected);
    }

    #[test]
    fn kill_promotes_sleeping_threads_and_sets_flag() {
        let mut s = SchedState::new();
        let slot = s.alloc().unwrap();
        s.processes[slot].threads.threads[0].state = ThreadState::Sleeping;
        let pid = s.processes[slot].pid;

        s.kill(pid).unwrap();
        assert!(s.processes[slot].killed);
        assert_eq!(s.processes[slot].threads.threads[0].state, ThreadState::Runnable);
    }

    #[test]
    fn kill_unknown_pid_fails() {
        let mut s = SchedState::new();
        assert_eq!(s.kill(99999), Err(SchedError::NotFound));
    }

    #[test]
    fn next_thread_switches_to_runnable_peer_and_parks_current() {
        let mut s = SchedState::new();
        let slot = s.alloc().unwrap();
        let proc = &mut s.processes[slot];
        proc.threads.threads[0].state = ThreadState::Running;
        proc.threads.current = 0;
        proc.threads.threads[3].state = ThreadState::Runnable;
        proc.threads.threads[3].tid = 42;

        let peer = proc.next_thread().unwrap();
        assert_eq!(peer, 3);
        assert_eq!(proc.threads.current, 3);
        assert_eq!(proc.threads.threads[0].state, ThreadState::Runnable);
        assert_eq!(proc.threads.threads[3].state, ThreadState::Running);
    }

    #[test]
    fn next_thread_returns_none_with_no_other_runnable_peer() {
        let mut s = SchedState::new();
        let slot = s.alloc().unwrap();
        let proc = &mut s.processes[slot];
        proc.threads.threads[0].state = ThreadState::Running;
        proc.threads.current = 0;
        assert_eq!(proc.next_thread(), None);
    }
}
