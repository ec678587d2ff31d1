// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::collections;

use tracepoint_tracefs::TranslationTable;

/// Set of event IDs to decode. Records of any other event are skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    enabled: collections::BTreeSet<u32>,
}

impl EventFilter {
    /// Creates a filter with nothing enabled.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Builds a filter from event names resolved against `table`.
    ///
    /// Accepted forms: `"system/event"`, `"system/*"` (every event of the
    /// system) and a bare `"event"` (that event in any system). Names that
    /// match nothing are logged and ignored.
    pub fn from_names<S: AsRef<str>>(table: &TranslationTable, names: &[S]) -> Self {
        let mut filter = Self::new();
        for name in names {
            let name = name.as_ref();
            let (system, event) = match name.split_once('/') {
                Some((system, event)) => (Some(system), event),
                None => (None, name),
            };

            let before = filter.len();
            for format in table.events() {
                let system_matches = system.map_or(true, |system| system == format.system_name());
                let event_matches = (event == "*" && system.is_some()) || event == format.name();
                if system_matches && event_matches {
                    filter.enable(format.id());
                }
            }

            if filter.len() == before {
                tracing::warn!(event = name, "ftrace event not found");
            }
        }

        return filter;
    }

    /// Enables decoding of event `id`.
    pub fn enable(&mut self, id: u32) {
        self.enabled.insert(id);
    }

    /// Disables decoding of event `id`.
    pub fn disable(&mut self, id: u32) {
        self.enabled.remove(&id);
    }

    /// Returns true if event `id` should be decoded.
    pub fn is_enabled(&self, id: u32) -> bool {
        self.enabled.contains(&id)
    }

    /// Returns the enabled IDs in ascending order.
    pub fn enabled_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.enabled.iter().copied()
    }

    /// Number of enabled events.
    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    /// Returns true if nothing is enabled.
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }
}

/// Per-session decoding settings shared by every CPU reader.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeConfig {
    event_filter: EventFilter,
}

impl DecodeConfig {
    /// Creates a config that decodes the events enabled in `event_filter`.
    pub fn new(event_filter: EventFilter) -> Self {
        return Self { event_filter };
    }

    /// Returns the event filter.
    pub fn event_filter(&self) -> &EventFilter {
        &self.event_filter
    }
}
