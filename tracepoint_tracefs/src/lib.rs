// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

#![warn(missing_docs)]
#![allow(clippy::needless_return)]

//! Read-only access to Linux tracefs: mount point discovery, event `format`
//! and ring buffer `header_page` parsing, and raw per-CPU buffer handles.
//!
//! Nothing in this crate writes to tracefs control files.

pub use byte_reader::TraceByteReader;
pub use event_format::TraceEventFormat;
pub use field_format::TraceFieldArray;
pub use field_format::TraceFieldFormat;
pub use field_format::TraceFieldKind;
pub use page_header::PageHeaderFormat;
pub use tracefs::system_page_size;
pub use tracefs::TracePipeRaw;
pub use tracefs::Tracefs;
pub use tracefs::TracefsError;
pub use translation_table::TranslationTable;
pub use translation_table::STATIC_COMMON_FIELDS;
pub mod changelog;

mod byte_reader;
mod event_format;
mod field_format;
mod page_header;
mod tracefs;
mod translation_table;
