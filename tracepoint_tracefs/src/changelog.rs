// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Release history

#[allow(unused_imports)]
use crate::*; // For docs

/// # v0.1.0
/// - Initial release: tracefs discovery, `format` file parsing, ring buffer
///   `header_page` parsing, [`TranslationTable`], read-only [`TracePipeRaw`].
pub mod v0_1_0 {}
