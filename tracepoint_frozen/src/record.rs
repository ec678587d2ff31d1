// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::string;
use std::vec;

use serde::Serialize;

use crate::PageParseError;

/// Clock the kernel used to timestamp ring buffer records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FtraceClock {
    /// Kernel default (`local`, or boot time where configured). No
    /// reconciliation with other clocks is attempted.
    #[default]
    Unspecified,

    /// `global` trace clock.
    Global,

    /// `local` trace clock.
    Local,

    /// `mono` trace clock.
    Mono,

    /// `mono_raw` trace clock.
    MonoRaw,

    /// `boot` trace clock.
    Boot,
}

impl FtraceClock {
    /// Returns true for [`FtraceClock::Unspecified`].
    pub fn is_unspecified(&self) -> bool {
        *self == FtraceClock::Unspecified
    }
}

/// Decoded value of one event field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Signed integer, sign-extended.
    Signed(i64),

    /// Unsigned integer or pointer, zero-extended.
    Unsigned(u64),

    /// 8-bit string up to the first NUL. Invalid UTF-8 is replaced.
    Str(string::String),

    /// Raw bytes.
    Bytes(vec::Vec<u8>),
}

/// One named field of a decoded event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FtraceField {
    /// Field name from the event's "format" file.
    pub name: string::String,

    /// Decoded value.
    pub value: FieldValue,
}

/// One decoded event record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FtraceEvent {
    /// Record timestamp in ring buffer clock units.
    pub timestamp: u64,

    /// Value of `common_pid`.
    pub pid: i32,

    /// Event ID (`common_type`).
    pub id: u32,

    /// Event system, e.g. `sched`.
    pub system: string::String,

    /// Event name, e.g. `sched_switch`.
    pub name: string::String,

    /// Non-common fields in layout order.
    pub fields: vec::Vec<FtraceField>,
}

impl FtraceEvent {
    /// Returns the value of the field named `name`.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        return self
            .fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value);
    }
}

/// The records decoded from one ring buffer page of one CPU.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FtraceEventBundle {
    /// CPU whose buffer the page came from.
    pub cpu: usize,

    /// Timestamp from the page header.
    pub page_timestamp: u64,

    /// Clock the timestamps are in.
    #[serde(skip_serializing_if = "FtraceClock::is_unspecified")]
    pub ftrace_clock: FtraceClock,

    /// true if the kernel dropped events before this page.
    pub lost_events: bool,

    /// Decoded events that passed the event filter.
    pub events: vec::Vec<FtraceEvent>,

    /// Problems found while decoding the page.
    #[serde(skip_serializing_if = "vec::Vec::is_empty")]
    pub parse_errors: vec::Vec<PageParseError>,
}
