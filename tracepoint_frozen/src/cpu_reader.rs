// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::boxed;
use std::io;
use std::sync;

use tracepoint_tracefs::TracePipeRaw;
use tracepoint_tracefs::TranslationTable;

use crate::*;

/// Source of raw ring buffer pages for one CPU.
///
/// Each call consumes at most one page. `Ok(0)` or `WouldBlock` means the
/// buffer is empty.
pub trait PageSource {
    /// Reads the next page into `page`, returning the number of bytes read.
    fn read_page(&mut self, page: &mut [u8]) -> io::Result<usize>;
}

impl PageSource for TracePipeRaw {
    fn read_page(&mut self, page: &mut [u8]) -> io::Result<usize> {
        return TracePipeRaw::read_page(self, page);
    }
}

/// Running totals for one [`CpuReader`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuReaderStats {
    /// Pages consumed.
    pub pages: u64,
    /// Events written.
    pub events: u64,
    /// Parse errors recorded in bundles.
    pub parse_errors: u64,
    /// Pages flagged with lost events.
    pub lost_event_pages: u64,
}

/// Reads and decodes the frozen buffer of one CPU.
pub struct CpuReader {
    cpu: usize,
    source: boxed::Box<dyn PageSource>,
    table: sync::Arc<TranslationTable>,
    clock: FtraceClock,
    stats: CpuReaderStats,
}

impl CpuReader {
    /// Creates a reader for `cpu` that pulls pages from `source` and decodes
    /// them with `table`.
    pub fn new(
        cpu: usize,
        source: boxed::Box<dyn PageSource>,
        table: sync::Arc<TranslationTable>,
        clock: FtraceClock,
    ) -> Self {
        return Self {
            cpu,
            source,
            table,
            clock,
            stats: CpuReaderStats::default(),
        };
    }

    /// CPU index.
    pub fn cpu(&self) -> usize {
        self.cpu
    }

    /// Size of one ring buffer page (sub-buffer) of this CPU, from the
    /// table's page header layout.
    pub fn page_size(&self) -> usize {
        self.table.page_header().page_size()
    }

    /// Clock stamped on every bundle.
    pub fn clock(&self) -> FtraceClock {
        self.clock
    }

    /// Totals so far.
    pub fn stats(&self) -> CpuReaderStats {
        self.stats
    }

    /// Consumes up to `max_pages` pages (also limited by the scratch
    /// capacity), writes one bundle per page and returns the number of pages
    /// consumed.
    ///
    /// Reading stops at the first empty read or I/O error. Consumed pages are
    /// gone from the kernel buffer whether or not they decode cleanly.
    pub fn read_frozen(
        &mut self,
        scratch: &mut ParsingScratch,
        max_pages: usize,
        config: &DecodeConfig,
        writer: &mut dyn TraceWriter,
    ) -> usize {
        let max_pages = max_pages.min(scratch.capacity_pages());

        let mut pages = 0;
        while pages < max_pages {
            let page = scratch.page_mut(pages);
            match self.source.read_page(page) {
                Ok(0) => break,
                Ok(len) => {
                    // A short read still holds a whole page header; zero the rest.
                    page[len..].fill(0);
                    pages += 1;
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => break,
                Err(error) => {
                    tracing::debug!(cpu = self.cpu, %error, "trace_pipe_raw read failed");
                    break;
                }
            }
        }

        for index in 0..pages {
            let Some(page) = scratch.page(index) else {
                break;
            };

            let mut bundle = parse_page(page, self.cpu, &self.table, config);
            bundle.ftrace_clock = self.clock;

            self.stats.pages += 1;
            self.stats.events += bundle.events.len() as u64;
            self.stats.parse_errors += bundle.parse_errors.len() as u64;
            if bundle.lost_events {
                self.stats.lost_event_pages += 1;
            }

            if !bundle.parse_errors.is_empty() {
                tracing::debug!(
                    cpu = self.cpu,
                    errors = bundle.parse_errors.len(),
                    first = %bundle.parse_errors[0],
                    "ring buffer page decoded with errors"
                );
            }

            writer.write_bundle(bundle);
        }

        return pages;
    }
}

impl core::fmt::Debug for CpuReader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        return f
            .debug_struct("CpuReader")
            .field("cpu", &self.cpu)
            .field("clock", &self.clock)
            .field("stats", &self.stats)
            .finish_non_exhaustive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections;
    use std::vec;
    use tracepoint_tracefs::PageHeaderFormat;
    use tracepoint_tracefs::TraceEventFormat;

    /// Serves empty (header-only) pages, then ends with `end`.
    struct FakeSource {
        pages: collections::VecDeque<vec::Vec<u8>>,
        end: Option<io::ErrorKind>,
    }

    impl PageSource for FakeSource {
        fn read_page(&mut self, page: &mut [u8]) -> io::Result<usize> {
            match self.pages.pop_front() {
                Some(bytes) => {
                    page[..bytes.len()].copy_from_slice(&bytes);
                    return Ok(bytes.len());
                }
                None => match self.end {
                    Some(kind) => return Err(io::Error::from(kind)),
                    None => return Ok(0),
                },
            }
        }
    }

    fn table() -> sync::Arc<TranslationTable> {
        let format = TraceEventFormat::parse(
            "test",
            "name: e
ID: 1
format:
\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;
\tfield:unsigned char common_flags;\toffset:2;\tsize:1;\tsigned:0;
\tfield:unsigned char common_preempt_count;\toffset:3;\tsize:1;\tsigned:0;
\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;

",
        )
        .unwrap();
        return sync::Arc::new(TranslationTable::new(PageHeaderFormat::DEFAULT_64, vec![format]).unwrap());
    }

    fn reader(pages: usize, end: Option<io::ErrorKind>) -> CpuReader {
        let mut page = vec![0u8; 64];
        page[..8].copy_from_slice(&77u64.to_ne_bytes());
        let source = FakeSource {
            pages: (0..pages).map(|_| page.clone()).collect(),
            end,
        };
        return CpuReader::new(3, boxed::Box::new(source), table(), FtraceClock::Unspecified);
    }

    #[test]
    fn reads_at_most_max_pages() {
        let mut reader = reader(10, None);
        let mut scratch = ParsingScratch::with_capacity(4096, 32);
        let mut writer = MemoryTraceWriter::new();
        let config = DecodeConfig::default();

        assert_eq!(reader.read_frozen(&mut scratch, 4, &config, &mut writer), 4);
        assert_eq!(writer.staged_len(), 4);
        assert_eq!(reader.read_frozen(&mut scratch, 32, &config, &mut writer), 6);
        assert_eq!(reader.read_frozen(&mut scratch, 32, &config, &mut writer), 0);
        assert_eq!(writer.staged_len(), 10);
        assert_eq!(reader.stats().pages, 10);
        assert_eq!(reader.stats().parse_errors, 0);
    }

    #[test]
    fn clamps_to_scratch_capacity() {
        let mut reader = reader(10, None);
        let mut scratch = ParsingScratch::with_capacity(4096, 3);
        let mut writer = MemoryTraceWriter::new();

        assert_eq!(reader.read_frozen(&mut scratch, 8, &DecodeConfig::default(), &mut writer), 3);
    }

    #[test]
    fn stops_on_would_block_and_errors() {
        for kind in [io::ErrorKind::WouldBlock, io::ErrorKind::Other] {
            let mut reader = reader(2, Some(kind));
            let mut scratch = ParsingScratch::new(4096);
            let mut writer = MemoryTraceWriter::new();

            assert_eq!(reader.read_frozen(&mut scratch, 32, &DecodeConfig::default(), &mut writer), 2);
            assert_eq!(writer.staged_len(), 2);
        }
    }

    #[test]
    fn bundles_carry_cpu_and_page_timestamp() {
        let mut reader = reader(1, None);
        let mut scratch = ParsingScratch::new(4096);
        let mut writer = MemoryTraceWriter::new();
        let committed = writer.committed();

        reader.read_frozen(&mut scratch, 1, &DecodeConfig::default(), &mut writer);
        writer.flush(boxed::Box::new(|| {}));

        let bundles = committed.bundles();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].cpu, 3);
        assert_eq!(bundles[0].page_timestamp, 77);
        assert!(bundles[0].events.is_empty());
    }
}
