// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::vec;

/// Read state of one CPU's frozen buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CpuReadState {
    /// May be read in the next drain step.
    Active,

    /// A read returned fewer pages than allowed: the buffer is empty. Never
    /// read again.
    Drained,

    /// The page quota is used up. Never read again.
    Exhausted,
}

#[derive(Clone, Copy, Debug)]
struct QuotaEntry {
    remaining: usize,
    state: CpuReadState,
}

/// Per-CPU lifetime page budget.
///
/// Invariants: `remaining` never increases, and the pages charged to a CPU
/// never exceed the initial quota. Indices are CPU slots `0..cpu_count()`;
/// methods panic on an out-of-range slot.
#[derive(Clone, Debug)]
pub struct PageQuota {
    initial: usize,
    entries: vec::Vec<QuotaEntry>,
}

impl PageQuota {
    /// Creates a budget of `quota` pages for each of `cpus` CPUs. A zero quota
    /// starts every CPU as [`CpuReadState::Exhausted`].
    pub fn new(cpus: usize, quota: usize) -> Self {
        let state = if quota == 0 {
            CpuReadState::Exhausted
        } else {
            CpuReadState::Active
        };

        return Self {
            initial: quota,
            entries: vec![
                QuotaEntry {
                    remaining: quota,
                    state
                };
                cpus
            ],
        };
    }

    /// Initial per-CPU quota.
    pub fn initial_quota(&self) -> usize {
        self.initial
    }

    /// Number of CPU slots.
    pub fn cpu_count(&self) -> usize {
        self.entries.len()
    }

    /// Pages `cpu` may still read.
    pub fn remaining(&self, cpu: usize) -> usize {
        self.entries[cpu].remaining
    }

    /// Pages charged to `cpu` so far.
    pub fn pages_read(&self, cpu: usize) -> usize {
        self.initial - self.entries[cpu].remaining
    }

    /// Current state of `cpu`.
    pub fn state(&self, cpu: usize) -> CpuReadState {
        self.entries[cpu].state
    }

    /// Returns true if any CPU is still [`CpuReadState::Active`].
    pub fn any_active(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.state == CpuReadState::Active)
    }

    /// Pages `cpu` may read in one step with the given per-step `ceiling`:
    /// `min(ceiling, remaining)`, or 0 if the CPU is no longer active.
    pub fn allowance(&self, cpu: usize, ceiling: usize) -> usize {
        let entry = &self.entries[cpu];
        if entry.state != CpuReadState::Active {
            return 0;
        }

        return ceiling.min(entry.remaining);
    }

    /// Records that `cpu` read `read` pages out of an `allowed` allowance and
    /// returns its new state.
    ///
    /// Charges beyond the remaining budget are clamped.
    pub fn charge(&mut self, cpu: usize, allowed: usize, read: usize) -> CpuReadState {
        let entry = &mut self.entries[cpu];
        debug_assert!(read <= allowed, "read more pages than allowed");
        debug_assert!(read <= entry.remaining, "read past the page quota");

        entry.remaining -= read.min(entry.remaining);
        if entry.state == CpuReadState::Active {
            if entry.remaining == 0 {
                entry.state = CpuReadState::Exhausted;
            } else if read < allowed {
                entry.state = CpuReadState::Drained;
            }
        }

        return entry.state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowance_is_bounded_by_ceiling_and_remaining() {
        let mut quota = PageQuota::new(2, 40);
        assert_eq!(quota.allowance(0, 32), 32);
        assert_eq!(quota.charge(0, 32, 32), CpuReadState::Active);
        assert_eq!(quota.allowance(0, 32), 8);
        assert_eq!(quota.charge(0, 8, 8), CpuReadState::Exhausted);
        assert_eq!(quota.allowance(0, 32), 0);
        assert_eq!(quota.pages_read(0), 40);
        assert_eq!(quota.remaining(0), 0);

        assert_eq!(quota.state(1), CpuReadState::Active);
        assert!(quota.any_active());
    }

    #[test]
    fn short_read_drains() {
        let mut quota = PageQuota::new(1, 1024);
        assert_eq!(quota.charge(0, 32, 10), CpuReadState::Drained);
        assert_eq!(quota.allowance(0, 32), 0);
        assert_eq!(quota.pages_read(0), 10);
        assert!(!quota.any_active());
    }

    #[test]
    fn exhausted_wins_over_drained() {
        let mut quota = PageQuota::new(1, 4);
        assert_eq!(quota.charge(0, 4, 4), CpuReadState::Exhausted);
    }

    #[test]
    fn zero_quota_starts_exhausted() {
        let quota = PageQuota::new(3, 0);
        assert_eq!(quota.cpu_count(), 3);
        assert_eq!(quota.state(2), CpuReadState::Exhausted);
        assert_eq!(quota.allowance(2, 32), 0);
        assert!(!quota.any_active());
    }

    #[test]
    fn remaining_never_increases() {
        let mut quota = PageQuota::new(1, 100);
        let mut last = quota.remaining(0);
        for _ in 0..10 {
            let allowed = quota.allowance(0, 32);
            quota.charge(0, allowed, allowed);
            assert!(quota.remaining(0) <= last);
            assert!(quota.pages_read(0) <= quota.initial_quota());
            last = quota.remaining(0);
        }
        assert_eq!(quota.state(0), CpuReadState::Exhausted);
    }
}
