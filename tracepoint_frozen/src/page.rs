// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Decoding of raw ring buffer pages.

use std::string;
use std::vec;

use serde::Serialize;
use thiserror::Error;
use tracepoint_tracefs::TraceByteReader;
use tracepoint_tracefs::TraceEventFormat;
use tracepoint_tracefs::TraceFieldArray;
use tracepoint_tracefs::TraceFieldFormat;
use tracepoint_tracefs::TraceFieldKind;
use tracepoint_tracefs::TranslationTable;

use crate::*;

/// Record header `type_len` of padding (or a discarded event).
pub const TYPE_PADDING: u32 = 29;

/// Record header `type_len` of a time extension.
pub const TYPE_TIME_EXTEND: u32 = 30;

/// Record header `type_len` of an absolute timestamp.
pub const TYPE_TIME_STAMP: u32 = 31;

/// Largest `type_len` that encodes a data record length directly.
pub const TYPE_DATA_MAX: u32 = 28;

/// Mask of the payload size bits of the page `commit` word.
pub const COMMIT_SIZE_MASK: u64 = 0xF_FFFF;

/// Bit of the page `commit` word set when events were lost before this page.
pub const MISSED_EVENTS_FLAG: u64 = 1 << 31;

const TIME_DELTA_SHIFT: u32 = 27;
const TIME_STAMP_MASK: u64 = (1 << 59) - 1;

/// A problem found while decoding a page. Errors are per page (or per event)
/// and never abort a read.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageParseError {
    /// The page is smaller than its header.
    #[error("page of {0} bytes is too short for its header")]
    ShortPage(usize),

    /// The header's payload size does not fit in the page.
    #[error("page payload size {size} exceeds capacity {capacity}")]
    CommitOverflow {
        /// Payload size from the `commit` word.
        size: usize,
        /// Largest payload the page can hold.
        capacity: usize,
    },

    /// A record header or body extends past the end of the payload.
    #[error("record at payload offset {0} is truncated")]
    TruncatedRecord(usize),

    /// A length-prefixed record has a length smaller than its prefix.
    #[error("record at payload offset {offset} has invalid length {length}")]
    BadRecordLength {
        /// Payload offset of the record header.
        offset: usize,
        /// The length value found.
        length: u32,
    },

    /// An event record is too short for one of the fields in its format.
    #[error("field {field} of event {event} is out of bounds")]
    FieldOutOfBounds {
        /// Event name, or empty if the event ID could not be read.
        event: string::String,
        /// Field name.
        field: string::String,
    },
}

/// Decodes one raw page from `cpu` into a bundle.
///
/// Events whose ID is not enabled in `config` are skipped. Decoding stops at
/// the first malformed record; events decoded up to that point are kept and
/// the error is recorded in the bundle.
pub fn parse_page(
    page: &[u8],
    cpu: usize,
    table: &TranslationTable,
    config: &DecodeConfig,
) -> FtraceEventBundle {
    let mut bundle = FtraceEventBundle {
        cpu,
        ..Default::default()
    };

    if let Err(error) = parse_page_into(page, table, config, &mut bundle) {
        bundle.parse_errors.push(error);
    }

    return bundle;
}

fn parse_page_into(
    page: &[u8],
    table: &TranslationTable,
    config: &DecodeConfig,
    bundle: &mut FtraceEventBundle,
) -> Result<(), PageParseError> {
    let reader = TraceByteReader::KEEP_ENDIAN;
    let header = table.page_header();

    let data_offset = header.data_offset();
    if page.len() < data_offset {
        return Err(PageParseError::ShortPage(page.len()));
    }

    let (Some(page_timestamp), Some(commit)) = (
        reader.read_u64(page, header.timestamp_offset()),
        reader.read_unsigned(page, header.commit_offset(), header.commit_size()),
    ) else {
        return Err(PageParseError::ShortPage(page.len()));
    };

    bundle.page_timestamp = page_timestamp;
    bundle.lost_events = commit & MISSED_EVENTS_FLAG != 0;

    let size = (commit & COMMIT_SIZE_MASK) as usize;
    let capacity = header.data_size().min(page.len() - data_offset);
    if size > capacity {
        return Err(PageParseError::CommitOverflow { size, capacity });
    }

    let payload = &page[data_offset..data_offset + size];
    let mut timestamp = page_timestamp;
    let mut pos = 0;

    while pos + 4 <= payload.len() {
        let record_offset = pos;
        let truncated = PageParseError::TruncatedRecord(record_offset);
        let record_header = reader.read_u32(payload, pos).ok_or(truncated.clone())?;
        pos += 4;

        let type_len = record_header & 0x1F;
        let time_delta = u64::from(record_header >> 5);

        let data_len = match type_len {
            TYPE_PADDING => {
                if time_delta == 0 {
                    // Rest of the page is unused.
                    break;
                }

                let length = reader.read_u32(payload, pos).ok_or(truncated.clone())?;
                if length < 4 {
                    return Err(PageParseError::BadRecordLength {
                        offset: record_offset,
                        length,
                    });
                }

                // Length includes the length word itself.
                pos = pos.checked_add(length as usize).ok_or(truncated.clone())?;
                if pos > payload.len() {
                    return Err(truncated);
                }
                continue;
            }
            TYPE_TIME_EXTEND => {
                let extend = reader.read_u32(payload, pos).ok_or(truncated)?;
                pos += 4;
                timestamp = timestamp
                    .wrapping_add(u64::from(extend) << TIME_DELTA_SHIFT)
                    .wrapping_add(time_delta);
                continue;
            }
            TYPE_TIME_STAMP => {
                let extend = reader.read_u32(payload, pos).ok_or(truncated)?;
                pos += 4;
                timestamp = (timestamp & !TIME_STAMP_MASK)
                    | (u64::from(extend) << TIME_DELTA_SHIFT | time_delta);
                continue;
            }
            0 => {
                let length = reader.read_u32(payload, pos).ok_or(truncated.clone())?;
                if length < 4 {
                    return Err(PageParseError::BadRecordLength {
                        offset: record_offset,
                        length,
                    });
                }
                pos += 4;
                length as usize - 4
            }
            _ => type_len as usize * 4,
        };

        let end = pos.checked_add(data_len).ok_or(truncated.clone())?;
        let data = payload.get(pos..end).ok_or(truncated)?;
        pos = end;
        timestamp = timestamp.wrapping_add(time_delta);

        match decode_event(data, timestamp, table, config) {
            Ok(Some(event)) => bundle.events.push(event),
            Ok(None) => {}
            // The record boundary is still known, so keep going.
            Err(error) => bundle.parse_errors.push(error),
        }
    }

    return Ok(());
}

fn decode_event(
    data: &[u8],
    timestamp: u64,
    table: &TranslationTable,
    config: &DecodeConfig,
) -> Result<Option<FtraceEvent>, PageParseError> {
    let reader = TraceByteReader::KEEP_ENDIAN;

    let common_type = table.common_type_field();
    let id = reader
        .read_unsigned(data, common_type.offset().into(), common_type.size().into())
        .ok_or_else(|| out_of_bounds("", common_type))?;
    let Ok(id) = u32::try_from(id) else {
        return Ok(None);
    };

    if !config.event_filter().is_enabled(id) {
        return Ok(None);
    }

    let Some(format) = table.event_by_id(id) else {
        return Ok(None);
    };

    let common_pid = table.common_pid_field();
    let pid = reader
        .read_signed(data, common_pid.offset().into(), common_pid.size().into())
        .ok_or_else(|| out_of_bounds(format.name(), common_pid))?;

    let mut fields = vec::Vec::with_capacity(format.user_fields().len());
    for field in format.user_fields() {
        let value = decode_field(data, field, reader).ok_or_else(|| out_of_bounds(format.name(), field))?;
        fields.push(FtraceField {
            name: string::String::from(field.name()),
            value,
        });
    }

    return Ok(Some(event_from_format(format, timestamp, pid as i32, fields)));
}

fn event_from_format(
    format: &TraceEventFormat,
    timestamp: u64,
    pid: i32,
    fields: vec::Vec<FtraceField>,
) -> FtraceEvent {
    return FtraceEvent {
        timestamp,
        pid,
        id: format.id(),
        system: string::String::from(format.system_name()),
        name: string::String::from(format.name()),
        fields,
    };
}

fn decode_field(data: &[u8], field: &TraceFieldFormat, reader: TraceByteReader) -> Option<FieldValue> {
    let offset = usize::from(field.offset());
    let size = usize::from(field.size());

    let bytes = match field.array() {
        TraceFieldArray::None => {
            match field.kind() {
                TraceFieldKind::SignedInt => {
                    return reader.read_signed(data, offset, size).map(FieldValue::Signed);
                }
                TraceFieldKind::UnsignedInt => {
                    return reader.read_unsigned(data, offset, size).map(FieldValue::Unsigned);
                }
                _ => data.get(offset..field.end())?,
            }
        }
        TraceFieldArray::Fixed => data.get(offset..field.end())?,
        TraceFieldArray::RestOfEvent => data.get(offset..)?,
        TraceFieldArray::DataLoc2 => {
            let start = usize::from(reader.read_u16(data, offset)?);
            until_nul(data.get(start..)?)
        }
        TraceFieldArray::RelLoc2 => {
            let start = field.end() + usize::from(reader.read_u16(data, offset)?);
            until_nul(data.get(start..)?)
        }
        TraceFieldArray::DataLoc4 => {
            let loc = reader.read_u32(data, offset)?;
            let start = (loc & 0xFFFF) as usize;
            data.get(start..start + (loc >> 16) as usize)?
        }
        TraceFieldArray::RelLoc4 => {
            let loc = reader.read_u32(data, offset)?;
            let start = field.end() + (loc & 0xFFFF) as usize;
            data.get(start..start + (loc >> 16) as usize)?
        }
    };

    return Some(match field.kind() {
        TraceFieldKind::String => {
            FieldValue::Str(string::String::from_utf8_lossy(until_nul(bytes)).into_owned())
        }
        _ => FieldValue::Bytes(bytes.to_vec()),
    });
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(len) => &bytes[..len],
        None => bytes,
    }
}

fn out_of_bounds(event: &str, field: &TraceFieldFormat) -> PageParseError {
    return PageParseError::FieldOutOfBounds {
        event: string::String::from(event),
        field: string::String::from(field.name()),
    };
}
