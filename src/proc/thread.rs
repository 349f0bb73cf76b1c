//! Kernel threads: the per-process thread pool.
//!
//! Each process owns a fixed-size array of threads rather than a single
//! kernel stack, trapframe, and context. Slots are reused across
//! create/exit cycles, in a plain struct-of-fields style throughout.

use crate::hal::context::Context;
use crate::param::NTHREAD;

pub type Tid = i32;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ThreadState {
    #[default]
    Unused,
    Embryo,
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

/// One kernel thread. Threads within a process share its address space and
/// are switched without reloading the page directory.
#[derive(Copy, Clone)]
pub struct Thread {
    pub tid: Tid,
    pub state: ThreadState,
    /// Base of this thread's kernel stack, if one is currently assigned.
    /// Kept across `thread_join` so a later `thread_create` at the same
    /// slot index can reuse it.
    pub kernel_stack: Option<u64>,
    /// Saved callee-saved registers for a kernel-thread switch.
    pub context: Context,
    /// Address of this thread's trapframe, inside its kernel stack. Full
    /// register contents are a trap-dispatch concern this crate doesn't
    /// model; the scheduler only ever needs the address to hand to
    /// `context_switch`.
    pub trapframe: Option<u64>,
    /// Opaque rendezvous key this thread is sleeping on, if `Sleeping`.
    pub chan: Option<u64>,
    /// `start` from `thread_create`: where the trap frame's instruction
    /// pointer is set to resume in user mode. Kept alongside the opaque
    /// trapframe address since this crate doesn't model trapframe
    /// contents.
    pub entry_point: u64,
    /// `arg` from `thread_create`, written onto the new user stack.
    pub arg: usize,
    /// Value recorded by `thread_exit`, read back by `thread_join`.
    pub retval: usize,
}

impl Thread {
    pub const fn new() -> Thread {
        Thread {
            tid: 0,
            state: ThreadState::Unused,
            kernel_stack: None,
            context: Context::new(),
            trapframe: None,
            chan: None,
            entry_point: 0,
            arg: 0,
            retval: 0,
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Thread::new()
    }
}

/// A process's thread pool: `NTHREAD` fixed slots, a cached user-stack base
/// per slot, and the index of the thread currently assigned to this
/// process's CPU.
#[derive(Copy, Clone)]
pub struct ThreadPool {
    pub threads: [Thread; NTHREAD],
    pub user_stacks: [Option<u64>; NTHREAD],
    pub current: usize,
}

impl ThreadPool {
    pub const fn new() -> ThreadPool {
        ThreadPool {
            threads: [Thread::new(); NTHREAD],
            user_stacks: [None; NTHREAD],
            current: 0,
        }
    }

    /// True iff at least one thread is `Runnable`, i.e. this process is a
    /// candidate for the dispatcher to pick.
    pub fn is_runnable(&self) -> bool {
        self.threads.iter().any(|t| t.state == ThreadState::Runnable)
    }

    /// True iff every thread has torn down, so it's safe for the enclosing
    /// process to be reaped.
    pub fn all_unused(&self) -> bool {
        self.threads.iter().all(|t| t.state == ThreadState::Unused)
    }

    fn find(&self, tid: Tid) -> Option<usize> {
        self.threads
            .iter()
            .position(|t| t.state != ThreadState::Unused && t.tid == tid)
    }

    /// Find a runnable thread starting just after `current`, wrapping
    /// around. Shared by `next_thread` and the dispatcher's per-process
    /// thread pick.
    pub fn next_runnable_after(&self, after: usize) -> Option<usize> {
        (1..=self.threads.len()).find_map(|offset| {
            let idx = (after + offset) % self.threads.len();
            (self.threads[idx].state == ThreadState::Runnable).then_some(idx)
        })
    }

    /// The thread the dispatcher should run when it picks this process:
    /// `current` itself if still runnable, otherwise the next runnable
    /// peer.
    pub fn pick_runnable(&self) -> Option<usize> {
        if self.threads[self.current].state == ThreadState::Runnable {
            return Some(self.current);
        }
        self.next_runnable_after(self.current)
    }

    /// Allocate a new thread slot in `Embryo` state. Reuses a cached
    /// kernel/user stack at the chosen index if one is present there.
    /// `alloc_tid` supplies a fresh id; kernel-stack allocation for a
    /// previously-unused index is the caller's job, since it needs the
    /// page allocator this crate doesn't implement.
    pub fn alloc_slot(&mut self) -> Option<usize> {
        self.threads
            .iter()
            .position(|t| t.state == ThreadState::Unused)
    }

    pub fn get(&self, tid: Tid) -> Option<&Thread> {
        self.find(tid).map(|i| &self.threads[i])
    }

    pub fn get_mut(&mut self, tid: Tid) -> Option<&mut Thread> {
        self.find(tid).map(move |i| &mut self.threads[i])
    }

    /// Release a `Zombie` thread's slot back to `Unused`, keeping its
    /// kernel and user stacks cached at the same index for reuse. This is
    /// the contract `thread_join` relies on.
    pub fn release(&mut self, index: usize) {
        let kernel_stack = self.threads[index].kernel_stack;
        self.threads[index] = Thread::new();
        self.threads[index].kernel_stack = kernel_stack;
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        ThreadPool::new()
    }
}
