// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::collections;
use std::sync;
use std::vec;

use crate::*;

/// Names of the "common_*" fields that every raw event record starts with,
/// in layout order. Each event's "format" file repeats them.
pub const STATIC_COMMON_FIELDS: [&str; 4] = [
    "common_type",
    "common_flags",
    "common_preempt_count",
    "common_pid",
];

/// Metadata needed to decode raw ring buffer pages: the page header layout,
/// the layout of the common fields, and the format of each event, indexed by
/// the event's ID (the value of its `common_type` field).
#[derive(Debug)]
pub struct TranslationTable {
    page_header: PageHeaderFormat,
    common_type: TraceFieldFormat,
    common_pid: TraceFieldFormat,
    events: vec::Vec<sync::Arc<TraceEventFormat>>,
    by_id: collections::HashMap<u32, usize>,
}

impl TranslationTable {
    /// Builds a table from already-parsed formats.
    ///
    /// The common field layout is taken from the first format whose common
    /// block declares every name in [`STATIC_COMMON_FIELDS`]. If none does,
    /// the error names the first one missing from the first format. Formats
    /// with a duplicate ID are ignored (first one wins).
    pub fn new(
        page_header: PageHeaderFormat,
        formats: vec::Vec<TraceEventFormat>,
    ) -> Result<Self, TracefsError> {
        if formats.is_empty() {
            return Err(TracefsError::NoEventFormats(Default::default()));
        }

        let mut common = Err(STATIC_COMMON_FIELDS[0]);
        for (index, format) in formats.iter().enumerate() {
            match common_fields(format) {
                Ok(found) => {
                    common = Ok(found);
                    break;
                }
                Err(missing) if index == 0 => common = Err(missing),
                Err(_) => {}
            }
        }

        let [common_type, _, _, common_pid] = common.map_err(TracefsError::MissingCommonField)?;

        let mut events = vec::Vec::with_capacity(formats.len());
        let mut by_id = collections::HashMap::with_capacity(formats.len());
        for format in formats {
            if by_id.contains_key(&format.id()) {
                tracing::debug!(
                    id = format.id(),
                    system = format.system_name(),
                    name = format.name(),
                    "duplicate event id ignored"
                );
                continue;
            }

            by_id.insert(format.id(), events.len());
            events.push(sync::Arc::new(format));
        }

        return Ok(Self {
            page_header,
            common_type,
            common_pid,
            events,
            by_id,
        });
    }

    /// Builds a table from the contents of a tracefs instance: `events/header_page`
    /// plus every readable `events/<system>/<event>/format`. Unparsable format
    /// files are skipped.
    pub fn create(tracefs: &Tracefs) -> Result<Self, TracefsError> {
        let header_page = tracefs.read_header_page()?;
        let page_header = PageHeaderFormat::parse(&header_page).ok_or_else(|| {
            TracefsError::BadHeaderPage(tracefs.root().join("events").join("header_page"))
        })?;

        let mut formats = vec::Vec::new();
        for (system, event) in tracefs.event_names()? {
            let parsed = tracefs
                .read_event_format(&system, &event)
                .ok()
                .and_then(|contents| TraceEventFormat::parse(&system, &contents));
            match parsed {
                Some(format) => formats.push(format),
                None => tracing::debug!(%system, %event, "skipping unusable event format"),
            }
        }

        if formats.is_empty() {
            return Err(TracefsError::NoEventFormats(tracefs.root().join("events")));
        }

        let table = Self::new(page_header, formats)?;
        tracing::debug!(
            root = %tracefs.root().display(),
            events = table.len(),
            "built translation table"
        );
        return Ok(table);
    }

    /// Returns the layout of the ring buffer page header.
    pub fn page_header(&self) -> &PageHeaderFormat {
        &self.page_header
    }

    /// Returns the layout of the `common_type` field, which holds the event ID.
    pub fn common_type_field(&self) -> &TraceFieldFormat {
        &self.common_type
    }

    /// Returns the layout of the `common_pid` field.
    pub fn common_pid_field(&self) -> &TraceFieldFormat {
        &self.common_pid
    }

    /// Returns the format of the event with the given ID.
    pub fn event_by_id(&self, id: u32) -> Option<&sync::Arc<TraceEventFormat>> {
        return self.by_id.get(&id).map(|&index| &self.events[index]);
    }

    /// Returns all known event formats.
    pub fn events(&self) -> &[sync::Arc<TraceEventFormat>] {
        &self.events
    }

    /// Returns the number of known event formats.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the table has no event formats. A table built by `new`
    /// or `create` is never empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Returns the fields of `format`'s common block in [`STATIC_COMMON_FIELDS`]
/// order, or the first name that is missing.
fn common_fields(format: &TraceEventFormat) -> Result<[TraceFieldFormat; 4], &'static str> {
    let common = &format.fields()[..format.common_field_count()];
    let find = |name: &'static str| {
        common
            .iter()
            .find(|field| field.name() == name)
            .cloned()
            .ok_or(name)
    };

    return Ok([
        find(STATIC_COMMON_FIELDS[0])?,
        find(STATIC_COMMON_FIELDS[1])?,
        find(STATIC_COMMON_FIELDS[2])?,
        find(STATIC_COMMON_FIELDS[3])?,
    ]);
}
