// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Release history

#[allow(unused_imports)]
use crate::*; // For docs

/// # v0.1.0
/// - Initial release: [`FrozenFtraceDataSource`] with per-CPU page quota,
///   [`MemoryTraceWriter`] and [`JsonTraceWriter`] sinks, [`LocalTaskRunner`].
pub mod v0_1_0 {}
