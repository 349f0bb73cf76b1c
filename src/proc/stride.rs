//! Stride meta-scheduler: proportional-share selection over slot 0 (the
//! MLFQ aggregate) and any number of reserved-share processes.
//!
//! Each entry tracks its own slot with a tagged `StrideSlot` rather than an
//! out-of-band pointer. `select` keeps a running minimum in its own
//! variable instead of reusing the loop's entry reference for both jobs, so
//! a tie at the first entry can't silently win over a later, smaller pass.
//!
//! Pass values are fixed-point (`PASS_FRAC_BITS` fractional bits) rather
//! than floating point, which avoids reserving FPU state across a context
//! switch.

use crate::error::{invariant_violation, SchedError, SchedResult};
use crate::param::{MAXPASS, MAXSTRIDE, MAXTICKET, NPROC, PASS_FRAC_BITS, SCALEPASS};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StrideSlot {
    Inactive,
    MlfqAggregate,
    Process(usize),
}

#[derive(Copy, Clone)]
pub struct StrideEntry {
    pub ticket: u32,
    pub pass: u64,
    pub slot: StrideSlot,
}

impl StrideEntry {
    const fn inactive() -> StrideEntry {
        StrideEntry {
            ticket: 0,
            pass: 0,
            slot: StrideSlot::Inactive,
        }
    }
}

pub struct Stride {
    pub entries: [StrideEntry; NPROC],
}

fn pass_increment(ticket: u32) -> u64 {
    ((MAXTICKET as u64) << PASS_FRAC_BITS) / ticket as u64
}

impl Stride {
    /// Slot 0 starts owning every ticket.
    pub const fn new() -> Stride {
        let mut entries = [StrideEntry::inactive(); NPROC];
        entries[0] = StrideEntry {
            ticket: MAXTICKET,
            pass: 0,
            slot: StrideSlot::MlfqAggregate,
        };
        Stride { entries }
    }

    fn active(&self, i: usize) -> bool {
        self.entries[i].slot != StrideSlot::Inactive
    }

    pub fn reserved_ticket(&self) -> u32 {
        self.entries[1..].iter().filter(|e| e.slot != StrideSlot::Inactive).map(|e| e.ticket).sum()
    }

    pub fn total_ticket(&self) -> u32 {
        self.entries.iter().filter(|e| e.slot != StrideSlot::Inactive).map(|e| e.ticket).sum()
    }

    fn min_active_pass(&self) -> u64 {
        self.entries
            .iter()
            .enumerate()
            .filter(|(i, _)| self.active(*i))
            .map(|(_, e)| e.pass)
            .min()
            .unwrap_or(0)
    }

    /// Reserve `usage` tickets out of slot 0 for `proc_slot`. Fails if the
    /// request is non-positive, would push the reserved total past
    /// `MAXSTRIDE`, or no free entry remains.
    pub fn append(&mut self, proc_slot: usize, usage: u32) -> SchedResult<usize> {
        if usage == 0 {
            return Err(SchedError::ShareRefused);
        }
        if self.reserved_ticket() + usage > MAXSTRIDE {
            return Err(SchedError::ShareRefused);
        }
        let index = self.entries[1..]
            .iter()
            .position(|e| e.slot == StrideSlot::Inactive)
            .map(|i| i + 1)
            .ok_or(SchedError::OutOfSlots)?;

        let seed_pass = self.min_active_pass();
        self.entries[0].ticket -= usage;
        self.entries[index] = StrideEntry {
            ticket: usage,
            pass: seed_pass,
            slot: StrideSlot::Process(proc_slot),
        };
        Ok(index)
    }

    /// Return `index`'s tickets to slot 0 and free the slot.
    pub fn delete(&mut self, index: usize) {
        if index == 0 || !self.active(index) {
            return;
        }
        self.entries[0].ticket += self.entries[index].ticket;
        self.entries[index] = StrideEntry::inactive();
    }

    /// Advance `index`'s pass after it has been serviced, rescaling every
    /// active slot if the new value would exceed `MAXPASS`.
    pub fn advance_pass(&mut self, index: usize) {
        debug_assert!(self.active(index));
        let increment = pass_increment(self.entries[index].ticket);
        self.entries[index].pass = self.entries[index].pass.saturating_add(increment);
        if self.entries[index].pass > MAXPASS {
            let rescale = MAXPASS - SCALEPASS;
            for i in 0..self.entries.len() {
                if self.active(i) {
                    self.entries[i].pass = self.entries[i].pass.saturating_sub(rescale);
                }
            }
        }
    }

    /// The active, runnable slot with smallest pass, ties broken by index.
    /// `runnable(index)` tells whether that slot's participant currently
    /// has something to dispatch (slot 0: any MLFQ-runnable process;
    /// `Process(p)`: whether `p` itself is runnable).
    pub fn select(&self, runnable: impl Fn(usize) -> bool) -> Option<usize> {
        let mut best: Option<(usize, u64)> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.slot == StrideSlot::Inactive || !runnable(i) {
                continue;
            }
            match best {
                Some((_, best_pass)) if entry.pass >= best_pass => {}
                _ => best = Some((i, entry.pass)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn slot_of(&self, index: usize) -> StrideSlot {
        self.entries[index].slot
    }
}

impl Default for Stride {
    fn default() -> Self {
        Stride::new()
    }
}

/// Asserts the two table-wide invariants: the ticket sum is always
/// `MAXTICKET`, and the reserved sum never exceeds `MAXSTRIDE`. Called from
/// test code and from `ProcessTable::dump`, never on a hot path, since it's
/// O(NPROC).
pub fn check_invariants(stride: &Stride) {
    if stride.total_ticket() != MAXTICKET {
        invariant_violation!("stride ticket sum {} != MAXTICKET", stride.total_ticket());
    }
    if stride.reserved_ticket() > MAXSTRIDE {
        invariant_violation!("stride reserved {} > MAXSTRIDE", stride.reserved_ticket());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_owns_all_tickets() {
        let s = Stride::new();
        assert_eq!(s.entries[0].ticket, MAXTICKET);
        assert_eq!(s.total_ticket(), MAXTICKET);
        assert_eq!(s.reserved_ticket(), 0);
    }

    #[test]
    fn append_moves_tickets_from_aggregate() {
        let mut s = Stride::new();
        let idx = s.append(7, 40).unwrap();
        assert_eq!(s.entries[0].ticket, MAXTICKET - 40);
        assert_eq!(s.entries[idx].ticket, 40);
        assert_eq!(s.slot_of(idx), StrideSlot::Process(7));
        check_invariants(&s);
    }

    #[test]
    fn append_rejects_past_maxstride() {
        let mut s = Stride::new();
        s.append(1, MAXSTRIDE).unwrap();
        assert_eq!(s.append(2, 1), Err(SchedError::ShareRefused));
    }

    #[test]
    fn append_exactly_maxstride_succeeds() {
        let mut s = Stride::new();
        assert!(s.append(1, MAXSTRIDE).is_ok());
        assert_eq!(s.reserved_ticket(), MAXSTRIDE);
        assert_eq!(s.entries[0].ticket, MAXTICKET - MAXSTRIDE);
        assert_ne!(s.entries[0].ticket, 0);
    }

    #[test]
    fn delete_restores_tickets_to_slot_zero() {
        let mut s = Stride::new();
        let idx = s.append(3, 40).unwrap();
        s.delete(idx);
        assert_eq!(s.entries[0].ticket, MAXTICKET);
        assert_eq!(s.slot_of(idx), StrideSlot::Inactive);
    }

    #[test]
    fn share_exhaustion_example() {
        // uses the crate's compile-time MAXSTRIDE rather than a literal,
        // so this still exercises the boundary if that constant changes.
        let mut s = Stride::new();
        let room = MAXSTRIDE;
        let a = room.min(40);
        assert!(s.append(1, a).is_ok());
        if room >= 80 {
            assert!(s.append(2, 40).is_ok());
            assert_eq!(s.append(3, 40), Err(SchedError::ShareRefused));
        }
    }

    #[test]
    fn select_picks_minimum_pass_without_clobbering_it() {
        let mut s = Stride::new();
        let a = s.append(1, 10).unwrap();
        let b = s.append(2, 10).unwrap();
        s.entries[a].pass = 100;
        s.entries[b].pass = 50;
        s.entries[0].pass = 200;
        let winner = s.select(|_| true).unwrap();
        assert_eq!(winner, b);
    }

    #[test]
    fn rescale_subtracts_exact_window_from_every_active_slot() {
        let mut s = Stride::new();
        let a = s.append(1, MAXTICKET / 2).unwrap();
        s.entries[a].pass = MAXPASS;
        s.entries[0].pass = MAXPASS - 1;
        s.advance_pass(a);
        assert_eq!(s.entries[0].pass, (MAXPASS - 1) - (MAXPASS - SCALEPASS));
    }

    #[test]
    fn newly_admitted_process_seeds_to_current_minimum() {
        let mut s = Stride::new();
        s.entries[0].pass = 500;
        let idx = s.append(9, 10).unwrap();
        assert_eq!(s.entries[idx].pass, 500);
    }
}
