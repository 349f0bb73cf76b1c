//! MLFQ scheduler: K priority levels, each a fixed-size array of
//! process-table slot indices with a round-robin cursor.
//!
//! `mlfq_next` is real round-robin-with-cursor rather than a stub, and
//! every level array is sized `NPROC`, since a level can in principle hold
//! every process in the table at once.

use arrayvec::ArrayVec;

use crate::error::invariant_violation;
use crate::param::{MLFQ_EXPIRE, MLFQ_LEVELS, MLFQ_QUANTUM, NPROC};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MlfqDecision {
    Keep,
    Next,
}

pub struct MlfqLevel {
    pub slots: [Option<usize>; NPROC],
    pub cursor: usize,
}

impl MlfqLevel {
    const fn new() -> MlfqLevel {
        MlfqLevel {
            slots: [None; NPROC],
            cursor: 0,
        }
    }

    fn find_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.is_none())
    }
}

pub struct Mlfq {
    pub levels: [MlfqLevel; MLFQ_LEVELS],
}

impl Mlfq {
    pub const fn new() -> Mlfq {
        Mlfq {
            levels: [MlfqLevel::new(), MlfqLevel::new(), MlfqLevel::new()],
        }
    }

    /// Place `proc_slot` at level 0, where every newly allocated process
    /// starts.
    pub fn admit(&mut self, proc_slot: usize) -> Option<usize> {
        let index = self.levels[0].find_free()?;
        self.levels[0].slots[index] = Some(proc_slot);
        Some(index)
    }

    pub fn remove(&mut self, level: usize, index: usize) {
        self.levels[level].slots[index] = None;
    }

    /// Demote `proc_slot` out of `(level, index)` into `level + 1`. Returns
    /// the new index. Panics if the next level somehow has no room, which
    /// can only happen if `NPROC` processes are simultaneously below level
    /// 0; the process table size already bounds that, so this check exists
    /// purely for consistency.
    pub fn demote(&mut self, level: usize, index: usize, proc_slot: usize) -> (usize, usize) {
        self.levels[level].slots[index] = None;
        let next_level = level + 1;
        let next_index = self.levels[next_level]
            .find_free()
            .unwrap_or_else(|| invariant_violation!("mlfq demote: level {} full", next_level));
        self.levels[next_level].slots[next_index] = Some(proc_slot);
        (next_level, next_index)
    }

    /// Scan level `level` circularly starting at its cursor, looking for
    /// the first process for which `runnable` holds. Advances the cursor
    /// past a successful hit, and not otherwise.
    fn next_in_level(&mut self, level: usize, runnable: &impl Fn(usize) -> bool) -> Option<(usize, usize)> {
        let slots = &self.levels[level].slots;
        let start = self.levels[level].cursor;
        for offset in 0..slots.len() {
            let index = (start + offset) % slots.len();
            if let Some(proc_slot) = slots[index] {
                if runnable(proc_slot) {
                    self.levels[level].cursor = (index + 1) % slots.len();
                    return Some((index, proc_slot));
                }
            }
        }
        None
    }

    /// Starting at level 0, the first runnable process found at any level,
    /// together with its `(level, index)` slot. `runnable(proc_slot)` is
    /// the process-table lookup for "has a RUNNABLE thread".
    pub fn next(&mut self, runnable: impl Fn(usize) -> bool) -> Option<(usize, usize, usize)> {
        for level in 0..MLFQ_LEVELS {
            if let Some((index, proc_slot)) = self.next_in_level(level, &runnable) {
                return Some((level, index, proc_slot));
            }
        }
        None
    }

    /// Post-slice policy update. The caller handles the stride-pass
    /// bookkeeping separately; this only decides whether to demote and
    /// whether to keep or pick a new victim next iteration. Returns the
    /// decision plus the (possibly demoted) `(level, index)`.
    pub fn update(
        &mut self,
        level: usize,
        index: usize,
        proc_slot: usize,
        elapsed: u32,
        slice_ticks: u32,
    ) -> (MlfqDecision, usize, usize) {
        if elapsed >= MLFQ_EXPIRE[level] && level + 1 < MLFQ_LEVELS {
            let (new_level, new_index) = self.demote(level, index, proc_slot);
            return (MlfqDecision::Next, new_level, new_index);
        }
        if slice_ticks >= MLFQ_QUANTUM[level] {
            return (MlfqDecision::Next, level, index);
        }
        (MlfqDecision::Keep, level, index)
    }

    /// Relocate every process below level 0 back to level 0, preserving
    /// allocation order. Returns `(proc_slot, new_index)` for each move so
    /// the caller can refresh that process's cached `(level, index)`. Fatal
    /// if level 0 cannot hold everyone; boost must never be scheduled while
    /// level 0 could overflow.
    pub fn boost(&mut self) -> ArrayVec<(usize, usize), NPROC> {
        let mut moved = ArrayVec::new();
        for level in 1..MLFQ_LEVELS {
            for index in 0..self.levels[level].slots.len() {
                if let Some(proc_slot) = self.levels[level].slots[index].take() {
                    let new_index = self.levels[0].find_free().unwrap_or_else(|| {
                        invariant_violation!("mlfq boost: level 0 full")
                    });
                    self.levels[0].slots[new_index] = Some(proc_slot);
                    moved.push((proc_slot, new_index));
                }
            }
        }
        moved
    }
}

impl Default for Mlfq {
    fn default() -> Self {
        Mlfq::new()
    }
}

/// Timer-interrupt predicate: has the currently running participant used up
/// its slice? `level < 0` means stride-scheduled, which uses
/// `STRIDE_QUANTUM` instead of an MLFQ level's quantum.
pub fn yieldable(level: i32, slice_ticks: u32) -> bool {
    if level < 0 {
        slice_ticks >= crate::param::STRIDE_QUANTUM
    } else {
        slice_ticks >= MLFQ_QUANTUM[level as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_places_at_level_zero() {
        let mut m = Mlfq::new();
        let idx = m.admit(5).unwrap();
        assert_eq!(m.levels[0].slots[idx], Some(5));
    }

    #[test]
    fn next_finds_runnable_and_advances_cursor() {
        let mut m = Mlfq::new();
        let a = m.admit(1).unwrap();
        let b = m.admit(2).unwrap();
        let (level, index, proc_slot) = m.next(|_| true).unwrap();
        assert_eq!(level, 0);
        assert_eq!(index, a);
        assert_eq!(proc_slot, 1);
        // cursor advanced past a; next call finds b next.
        let (_, index2, proc_slot2) = m.next(|_| true).unwrap();
        assert_eq!(index2, b);
        assert_eq!(proc_slot2, 2);
    }

    #[test]
    fn next_skips_non_runnable_processes() {
        let mut m = Mlfq::new();
        m.admit(1).unwrap();
        m.admit(2).unwrap();
        let (_, _, proc_slot) = m.next(|p| p == 2).unwrap();
        assert_eq!(proc_slot, 2);
    }

    #[test]
    fn next_falls_through_levels() {
        let mut m = Mlfq::new();
        let idx0 = m.admit(1).unwrap();
        m.demote(0, idx0, 1);
        assert_eq!(m.next(|p| p == 1).unwrap().0, 1);
    }

    #[test]
    fn demotion_on_expired_budget() {
        let mut m = Mlfq::new();
        let idx = m.admit(9).unwrap();
        let (decision, level, _) = m.update(0, idx, 9, MLFQ_EXPIRE[0], 0);
        assert_eq!(decision, MlfqDecision::Next);
        assert_eq!(level, 1);
    }

    #[test]
    fn quantum_exhaustion_without_demotion() {
        let mut m = Mlfq::new();
        let idx = m.admit(9).unwrap();
        let (decision, level, index) = m.update(0, idx, 9, 0, MLFQ_QUANTUM[0]);
        assert_eq!(decision, MlfqDecision::Next);
        assert_eq!((level, index), (0, idx));
    }

    #[test]
    fn keep_when_neither_expired_nor_exhausted() {
        let mut m = Mlfq::new();
        let idx = m.admit(9).unwrap();
        let (decision, ..) = m.update(0, idx, 9, 0, 1);
        assert_eq!(decision, MlfqDecision::Keep);
    }

    #[test]
    fn boost_relocates_lower_levels_to_level_zero() {
        let mut m = Mlfq::new();
        let idx = m.admit(1).unwrap();
        m.demote(0, idx, 1);
        let moved = m.boost();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].0, 1);
        assert_eq!(m.levels[0].slots[moved[0].1], Some(1));
        assert!(m.levels[1].slots.iter().all(|s| s.is_none()));
    }

    #[test]
    fn priority_decay_timeline() {
        // a single CPU-bound process, run to its expire budget at each
        // level in turn, then boosted.
        let mut m = Mlfq::new();
        let mut level = 0usize;
        let mut index = m.admit(1).unwrap();
        for _ in 0..MLFQ_EXPIRE[0] {
            let (_, l, i) = m.update(level, index, 1, MLFQ_EXPIRE[0], 0);
            level = l;
            index = i;
        }
        assert_eq!(level, 1);
        for _ in 0..MLFQ_EXPIRE[1] {
            let (_, l, i) = m.update(level, index, 1, MLFQ_EXPIRE[1], 0);
            level = l;
            index = i;
        }
        assert_eq!(level, 2);
        let moved = m.boost();
        assert_eq!(moved[0].0, 1);
    }
}
