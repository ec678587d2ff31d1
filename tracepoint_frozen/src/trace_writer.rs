// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::boxed;
use std::cell;
use std::io;
use std::rc;
use std::vec;

use crate::*;

/// Callback invoked once a flush has committed everything written before it.
pub type FlushCallback = boxed::Box<dyn FnOnce() + 'static>;

/// Destination for decoded bundles.
///
/// Bundles are staged by `write_bundle` and committed by `flush`.
pub trait TraceWriter {
    /// Stages one bundle.
    fn write_bundle(&mut self, bundle: FtraceEventBundle);

    /// Commits every staged bundle, then calls `on_done` exactly once, even if
    /// the commit failed.
    fn flush(&mut self, on_done: FlushCallback);
}

/// Writes each bundle as one line of JSON.
///
/// Lines are staged in memory and written to the output (followed by an
/// output flush) on [`TraceWriter::flush`]. Bytes the output accepted are
/// never written again. If a commit fails, the unwritten bytes stay staged for
/// the next flush, up to [`Self::DEFAULT_MAX_PENDING`] bytes; whole lines past
/// that limit are dropped.
#[derive(Debug)]
pub struct JsonTraceWriter<W: io::Write> {
    out: W,
    staged: vec::Vec<u8>,
    max_pending: usize,
}

impl<W: io::Write> JsonTraceWriter<W> {
    /// Default limit on bytes kept staged after a failed commit.
    pub const DEFAULT_MAX_PENDING: usize = 16 * 1024 * 1024;

    /// Creates a writer for `out`.
    pub fn new(out: W) -> Self {
        return Self {
            out,
            staged: vec::Vec::new(),
            max_pending: Self::DEFAULT_MAX_PENDING,
        };
    }

    /// Sets the limit on bytes kept staged after a failed commit.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        return self;
    }

    /// Returns the output.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Returns the output, dropping anything not yet flushed.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn commit(&mut self) -> io::Result<()> {
        let mut written = 0;
        let result = loop {
            if written == self.staged.len() {
                break self.out.flush();
            }

            match self.out.write(&self.staged[written..]) {
                Ok(0) => break Err(io::ErrorKind::WriteZero.into()),
                Ok(len) => written += len,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                Err(error) => break Err(error),
            }
        };

        self.staged.drain(..written);
        if result.is_err() && self.staged.len() > self.max_pending {
            self.drop_pending_lines();
        }

        return result;
    }

    /// Keeps only the tail of a partly written line, so the output stays one
    /// JSON value per line.
    fn drop_pending_lines(&mut self) {
        let keep = match self.staged.iter().position(|&b| b == b'\n') {
            Some(newline) => newline + 1,
            None => self.staged.len(),
        };

        tracing::warn!(
            dropped_bytes = self.staged.len() - keep,
            "dropping trace output that could not be committed"
        );
        self.staged.truncate(keep);
    }
}

impl<W: io::Write> TraceWriter for JsonTraceWriter<W> {
    fn write_bundle(&mut self, bundle: FtraceEventBundle) {
        let start = self.staged.len();
        match serde_json::to_writer(&mut self.staged, &bundle) {
            Ok(()) => self.staged.push(b'\n'),
            Err(error) => {
                self.staged.truncate(start);
                tracing::warn!(cpu = bundle.cpu, %error, "failed to serialize bundle");
            }
        }
    }

    fn flush(&mut self, on_done: FlushCallback) {
        if let Err(error) = self.commit() {
            tracing::warn!(%error, "failed to commit trace output");
        }

        on_done();
    }
}

/// Shared view of the bundles a [`MemoryTraceWriter`] has committed.
#[derive(Clone, Debug, Default)]
pub struct CommittedBundles {
    inner: rc::Rc<cell::RefCell<Committed>>,
}

#[derive(Debug, Default)]
struct Committed {
    bundles: vec::Vec<FtraceEventBundle>,
    flushes: usize,
}

impl CommittedBundles {
    /// Returns a copy of the committed bundles, oldest first.
    pub fn bundles(&self) -> vec::Vec<FtraceEventBundle> {
        self.inner.borrow().bundles.clone()
    }

    /// Number of committed bundles.
    pub fn len(&self) -> usize {
        self.inner.borrow().bundles.len()
    }

    /// Returns true if nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().bundles.is_empty()
    }

    /// Total events across committed bundles.
    pub fn event_count(&self) -> usize {
        self.inner
            .borrow()
            .bundles
            .iter()
            .map(|bundle| bundle.events.len())
            .sum()
    }

    /// Number of flushes performed.
    pub fn flush_count(&self) -> usize {
        self.inner.borrow().flushes
    }
}

/// Keeps bundles in memory. Staged bundles move to the
/// [`CommittedBundles`] handle on flush.
#[derive(Debug, Default)]
pub struct MemoryTraceWriter {
    staged: vec::Vec<FtraceEventBundle>,
    committed: CommittedBundles,
}

impl MemoryTraceWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Returns a handle to the committed bundles. It stays valid after the
    /// writer is dropped.
    pub fn committed(&self) -> CommittedBundles {
        self.committed.clone()
    }

    /// Number of bundles written but not yet flushed.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }
}

impl TraceWriter for MemoryTraceWriter {
    fn write_bundle(&mut self, bundle: FtraceEventBundle) {
        self.staged.push(bundle);
    }

    fn flush(&mut self, on_done: FlushCallback) {
        {
            let mut committed = self.committed.inner.borrow_mut();
            committed.bundles.append(&mut self.staged);
            committed.flushes += 1;
        }

        on_done();
    }
}
