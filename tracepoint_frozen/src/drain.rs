// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::boxed;
use std::vec;

use crate::*;

/// Totals for one drain session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Drain steps run.
    pub steps: u64,
    /// Pages consumed across all CPUs.
    pub pages: u64,
    /// Events written.
    pub events: u64,
    /// Parse errors recorded.
    pub parse_errors: u64,
    /// Pages flagged with lost events.
    pub lost_event_pages: u64,
}

/// Owns the per-CPU readers of one session and decides how much to read in
/// each drain step.
///
/// Each step reads every still-active CPU in ascending CPU order, up to
/// `min(pages_per_tick, remaining quota)` pages. A CPU returning fewer pages
/// than allowed is drained; one reaching its quota is exhausted. Neither is
/// read again.
pub struct DrainController {
    session_id: u64,
    readers: vec::Vec<CpuReader>,
    quota: PageQuota,
    scratch: ParsingScratch,
    decode_config: DecodeConfig,
    writer: boxed::Box<dyn TraceWriter>,
    pages_per_tick: usize,
    steps: u64,
}

impl DrainController {
    /// Creates a controller with no readers. `pages_per_tick` is clamped to
    /// `1..=scratch.capacity_pages()`.
    pub fn new(
        session_id: u64,
        writer: boxed::Box<dyn TraceWriter>,
        scratch: ParsingScratch,
        pages_per_tick: usize,
    ) -> Self {
        let pages_per_tick = pages_per_tick.clamp(1, scratch.capacity_pages());
        return Self {
            session_id,
            readers: vec::Vec::new(),
            quota: PageQuota::new(0, 0),
            scratch,
            decode_config: DecodeConfig::default(),
            writer,
            pages_per_tick,
            steps: 0,
        };
    }

    /// Installs the readers (sorted by CPU) with a fresh quota of `page_quota`
    /// pages each, and sizes the scratch slots to the largest reader page.
    /// Readers are installed once per session.
    pub fn set_readers(
        &mut self,
        mut readers: vec::Vec<CpuReader>,
        decode_config: DecodeConfig,
        page_quota: usize,
    ) {
        debug_assert!(self.readers.is_empty(), "readers installed twice");
        readers.sort_by_key(|reader| reader.cpu());
        if let Some(page_size) = readers.iter().map(|reader| reader.page_size()).max() {
            self.scratch.set_page_size(page_size);
        }

        self.quota = PageQuota::new(readers.len(), page_quota);
        self.readers = readers;
        self.decode_config = decode_config;
    }

    /// Runs one drain step. Returns true if another step is needed, i.e. some
    /// CPU read its full allowance and is still active.
    pub fn read_tick(&mut self) -> bool {
        self.steps += 1;
        self.scratch.allocate_if_needed();

        let mut more = false;
        for (slot, reader) in self.readers.iter_mut().enumerate() {
            let allowed = self.quota.allowance(slot, self.pages_per_tick);
            if allowed == 0 {
                continue;
            }

            let read = reader.read_frozen(
                &mut self.scratch,
                allowed,
                &self.decode_config,
                self.writer.as_mut(),
            );

            match self.quota.charge(slot, allowed, read) {
                CpuReadState::Active => more = true,
                CpuReadState::Drained => {
                    tracing::debug!(
                        session_id = self.session_id,
                        cpu = reader.cpu(),
                        pages = self.quota.pages_read(slot),
                        "frozen buffer drained"
                    );
                }
                CpuReadState::Exhausted => {
                    tracing::debug!(
                        session_id = self.session_id,
                        cpu = reader.cpu(),
                        pages = self.quota.pages_read(slot),
                        "frozen buffer page quota exhausted"
                    );
                }
            }
        }

        return more;
    }

    /// Commits everything written so far, then calls `on_done`.
    pub fn flush(&mut self, on_done: FlushCallback) {
        self.writer.flush(on_done);
    }

    /// Session the controller belongs to.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Returns true once readers are installed.
    pub fn has_readers(&self) -> bool {
        !self.readers.is_empty()
    }

    /// The readers, in ascending CPU order.
    pub fn readers(&self) -> &[CpuReader] {
        &self.readers
    }

    /// Per-reader quota, indexed like [`Self::readers`].
    pub fn quota(&self) -> &PageQuota {
        &self.quota
    }

    /// Effective per-CPU page ceiling for one step.
    pub fn pages_per_tick(&self) -> usize {
        self.pages_per_tick
    }

    /// The parsing scratch.
    pub fn scratch(&self) -> &ParsingScratch {
        &self.scratch
    }

    /// Mutable access to the parsing scratch.
    pub fn scratch_mut(&mut self) -> &mut ParsingScratch {
        &mut self.scratch
    }

    /// Totals so far.
    pub fn stats(&self) -> DrainStats {
        let mut stats = DrainStats {
            steps: self.steps,
            ..Default::default()
        };

        for reader in &self.readers {
            let reader_stats = reader.stats();
            stats.pages += reader_stats.pages;
            stats.events += reader_stats.events;
            stats.parse_errors += reader_stats.parse_errors;
            stats.lost_event_pages += reader_stats.lost_event_pages;
        }

        return stats;
    }
}

impl core::fmt::Debug for DrainController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        return f
            .debug_struct("DrainController")
            .field("session_id", &self.session_id)
            .field("readers", &self.readers)
            .field("quota", &self.quota)
            .field("pages_per_tick", &self.pages_per_tick)
            .field("steps", &self.steps)
            .finish_non_exhaustive();
    }
}
