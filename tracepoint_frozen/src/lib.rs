// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![warn(missing_docs)]
#![allow(clippy::needless_return)]

//! Bounded, read-only consumer for frozen Linux ftrace buffers.
//!
//! A [`FrozenFtraceDataSource`] drains the per-CPU ring buffers of a tracefs
//! instance that has stopped recording (for example a boot-time trace kept in
//! `instances/<name>`). Pages are read in small steps on a cooperative
//! [`TaskRunner`], decoded with a [`tracepoint_tracefs::TranslationTable`],
//! and written to a [`TraceWriter`] as one [`FtraceEventBundle`] per page.
//! Reading is capped by a per-CPU lifetime page quota, and nothing is ever
//! written to tracefs.
//!
//! ```
//! use std::rc::Rc;
//! use tracepoint_frozen::*;
//!
//! let runner = Rc::new(LocalTaskRunner::new());
//! let writer = MemoryTraceWriter::new();
//! let committed = writer.committed();
//!
//! let config = DataSourceConfig::new(
//!     FrozenFtraceDataSource::DESCRIPTOR.name,
//!     br#"{"instance_name": "boot", "ftrace_events": ["sched/*"]}"#.to_vec(),
//! );
//! let mut source = FrozenFtraceDataSource::new(runner.clone(), &config, 1, Box::new(writer))
//!     .with_tracefs_root("/nonexistent/tracefs");
//!
//! source.start(); // No tracefs here: the source stays inert.
//! runner.run_until_idle();
//! source.flush(0, || println!("flushed"));
//! assert!(committed.is_empty());
//! ```

pub use config::DataSourceConfig;
pub use config::FrozenFtraceConfig;
pub use config::DEFAULT_PAGES_PER_TICK;
pub use config::DEFAULT_PAGE_QUOTA;
pub use cpu_reader::CpuReader;
pub use cpu_reader::CpuReaderStats;
pub use cpu_reader::PageSource;
pub use data_source::DataSourceDescriptor;
pub use data_source::FrozenFtraceDataSource;
pub use decode_config::DecodeConfig;
pub use decode_config::EventFilter;
pub use drain::DrainController;
pub use drain::DrainStats;
pub use error::FrozenFtraceError;
pub use page::parse_page;
pub use page::PageParseError;
pub use quota::CpuReadState;
pub use quota::PageQuota;
pub use record::FieldValue;
pub use record::FtraceClock;
pub use record::FtraceEvent;
pub use record::FtraceEventBundle;
pub use record::FtraceField;
pub use scratch::ParsingScratch;
pub use task_runner::LocalTaskRunner;
pub use task_runner::Task;
pub use task_runner::TaskRunner;
pub use trace_writer::CommittedBundles;
pub use trace_writer::FlushCallback;
pub use trace_writer::JsonTraceWriter;
pub use trace_writer::MemoryTraceWriter;
pub use trace_writer::TraceWriter;
pub mod changelog;
pub mod page;

mod config;
mod cpu_reader;
mod data_source;
mod decode_config;
mod drain;
mod error;
mod quota;
mod record;
mod scratch;
mod task_runner;
mod trace_writer;
