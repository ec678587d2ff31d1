// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use thiserror::Error;
use tracepoint_tracefs::TracefsError;

/// Reasons a frozen ftrace data source could not be set up. These never reach
/// the host: `start` logs them and leaves the data source inert.
#[derive(Debug, Error)]
pub enum FrozenFtraceError {
    /// The raw config blob is not valid JSON for [`crate::FrozenFtraceConfig`].
    #[error("invalid frozen ftrace config: {0}")]
    Config(#[from] serde_json::Error),

    /// tracefs could not be found or read.
    #[error(transparent)]
    Tracefs(#[from] TracefsError),

    /// The tracefs instance has no `per_cpu/cpuN` buffers.
    #[error("tracefs instance has no per-CPU buffers")]
    NoCpus,
}
