// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::boxed;
use std::cell;
use std::path;
use std::rc;
use std::sync;
use std::vec;

use tokio_util::sync::CancellationToken;
use tracepoint_tracefs::system_page_size;
use tracepoint_tracefs::Tracefs;
use tracepoint_tracefs::TranslationTable;

use crate::*;

/// Static registration data for a data source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataSourceDescriptor {
    /// Name hosts use to select the data source.
    pub name: &'static str,

    /// Registration flags. No flags are defined yet.
    pub flags: u32,
}

/// Drains the frozen (stopped) per-CPU ftrace buffers of a tracefs instance
/// into a [`TraceWriter`].
///
/// Work happens in bounded drain steps posted to the host's [`TaskRunner`].
/// Each step reposts itself while some CPU still has data and quota left.
/// Dropping the data source cancels any queued step and closes the per-CPU
/// readers right away; queued steps do not keep them alive.
///
/// Setup problems (no tracefs, no CPUs, unreadable metadata) are logged and
/// leave the data source inert: it never posts a step but still flushes.
pub struct FrozenFtraceDataSource {
    task_runner: rc::Rc<dyn TaskRunner>,
    config: FrozenFtraceConfig,
    session_id: u64,
    controller: rc::Rc<cell::RefCell<DrainController>>,
    cancel: CancellationToken,
    tracefs_root: Option<path::PathBuf>,
    started: bool,
}

impl FrozenFtraceDataSource {
    /// Registration data: name `linux.frozen_ftrace`, no flags.
    pub const DESCRIPTOR: DataSourceDescriptor = DataSourceDescriptor {
        name: "linux.frozen_ftrace",
        flags: 0,
    };

    /// Creates the data source. A malformed config blob is logged and replaced
    /// by the default config.
    pub fn new(
        task_runner: rc::Rc<dyn TaskRunner>,
        ds_config: &DataSourceConfig,
        session_id: u64,
        writer: boxed::Box<dyn TraceWriter>,
    ) -> Self {
        let config = match FrozenFtraceConfig::parse(&ds_config.frozen_ftrace_config_raw) {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(session_id, %error, "using default frozen ftrace config");
                FrozenFtraceConfig::default()
            }
        };

        let scratch = ParsingScratch::new(system_page_size());
        let controller = DrainController::new(session_id, writer, scratch, config.pages_per_tick);

        return Self {
            task_runner,
            config,
            session_id,
            controller: rc::Rc::new(cell::RefCell::new(controller)),
            cancel: CancellationToken::new(),
            tracefs_root: None,
            started: false,
        };
    }

    /// Reads from the tracefs mounted at `root` instead of guessing the mount
    /// point.
    pub fn with_tracefs_root(mut self, root: impl Into<path::PathBuf>) -> Self {
        self.tracefs_root = Some(root.into());
        return self;
    }

    /// The effective config.
    pub fn config(&self) -> &FrozenFtraceConfig {
        &self.config
    }

    /// Session this data source belongs to.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Returns true if the data source has readers, i.e. was started and found
    /// something to drain.
    pub fn is_active(&self) -> bool {
        self.controller.borrow().has_readers()
    }

    /// Totals so far.
    pub fn stats(&self) -> DrainStats {
        self.controller.borrow().stats()
    }

    /// Snapshot of the per-CPU quota, indexed by reader (ascending CPU).
    pub fn quota(&self) -> PageQuota {
        self.controller.borrow().quota().clone()
    }

    /// Locates tracefs, opens one reader per CPU and posts the first drain
    /// step. Any failure leaves the data source inert.
    pub fn start(&mut self) {
        if self.started {
            tracing::warn!(session_id = self.session_id, "frozen ftrace already started");
            return;
        }

        self.controller.borrow_mut().scratch_mut().allocate_if_needed();

        match self.open_readers() {
            Ok((readers, decode_config)) => self.start_with_readers(readers, decode_config),
            Err(error) => {
                self.started = true;
                tracing::info!(
                    session_id = self.session_id,
                    %error,
                    "frozen ftrace inactive"
                );
            }
        }
    }

    /// Starts draining the given readers instead of opening tracefs.
    pub fn start_with_readers(&mut self, readers: vec::Vec<CpuReader>, decode_config: DecodeConfig) {
        if self.started {
            tracing::warn!(session_id = self.session_id, "frozen ftrace already started");
            return;
        }

        self.started = true;
        if readers.is_empty() {
            tracing::info!(session_id = self.session_id, "frozen ftrace has no readers");
            return;
        }

        tracing::debug!(
            session_id = self.session_id,
            cpus = readers.len(),
            page_quota = self.config.page_quota,
            "frozen ftrace starting"
        );

        self.controller
            .borrow_mut()
            .set_readers(readers, decode_config, self.config.page_quota);

        post_drain_step(
            &self.task_runner,
            rc::Rc::downgrade(&self.controller),
            self.cancel.clone(),
        );
    }

    /// Commits everything written so far, then calls `on_done` once. Drain
    /// steps still pending are not waited for.
    pub fn flush(&self, _request_id: u64, on_done: impl FnOnce() + 'static) {
        // The writer may call back before `flush` returns. Defer that until
        // the controller is no longer borrowed.
        let state = rc::Rc::new(DeferredFlush::default());
        let callback_state = state.clone();
        let on_done: FlushCallback = boxed::Box::new(on_done);
        let callback: FlushCallback = boxed::Box::new(move || {
            if callback_state.in_flush.get() {
                callback_state.done.set(Some(on_done));
            } else {
                on_done();
            }
        });

        state.in_flush.set(true);
        self.controller.borrow_mut().flush(callback);
        state.in_flush.set(false);

        if let Some(on_done) = state.done.take() {
            on_done();
        }
    }

    fn open_readers(&self) -> Result<(vec::Vec<CpuReader>, DecodeConfig), FrozenFtraceError> {
        let mut tracefs = match &self.tracefs_root {
            Some(root) => Tracefs::with_root(root.clone())?,
            None => Tracefs::guess_mount_point()?,
        };

        if let Some(instance) = self.config.instance() {
            tracefs = tracefs.instance(instance)?;
        }

        let table = sync::Arc::new(TranslationTable::create(&tracefs)?);

        let cpus = tracefs.number_of_cpus();
        if cpus == 0 {
            return Err(FrozenFtraceError::NoCpus);
        }

        let mut readers = vec::Vec::with_capacity(cpus);
        for cpu in 0..cpus {
            let pipe = tracefs.open_pipe_for_cpu(cpu)?;
            readers.push(CpuReader::new(
                cpu,
                boxed::Box::new(pipe),
                table.clone(),
                FtraceClock::Unspecified,
            ));
        }

        let filter = EventFilter::from_names(&table, &self.config.ftrace_events);
        return Ok((readers, DecodeConfig::new(filter)));
    }
}

impl Drop for FrozenFtraceDataSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl core::fmt::Debug for FrozenFtraceDataSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        return f
            .debug_struct("FrozenFtraceDataSource")
            .field("session_id", &self.session_id)
            .field("config", &self.config)
            .field("started", &self.started)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive();
    }
}

#[derive(Default)]
struct DeferredFlush {
    in_flush: cell::Cell<bool>,
    done: cell::Cell<Option<FlushCallback>>,
}

fn post_drain_step(
    task_runner: &rc::Rc<dyn TaskRunner>,
    controller: rc::Weak<cell::RefCell<DrainController>>,
    cancel: CancellationToken,
) {
    let weak_runner = rc::Rc::downgrade(task_runner);
    task_runner.post_task(boxed::Box::new(move || {
        drain_step(weak_runner, controller, cancel);
    }));
}

fn drain_step(
    task_runner: rc::Weak<dyn TaskRunner>,
    controller: rc::Weak<cell::RefCell<DrainController>>,
    cancel: CancellationToken,
) {
    if cancel.is_cancelled() {
        return;
    }

    let Some(strong) = controller.upgrade() else {
        return;
    };

    let more = strong.borrow_mut().read_tick();
    drop(strong);
    if !more || cancel.is_cancelled() {
        return;
    }

    if let Some(task_runner) = task_runner.upgrade() {
        post_drain_step(&task_runner, controller, cancel);
    }
}
