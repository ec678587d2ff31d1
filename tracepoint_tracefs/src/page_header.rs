// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use crate::field_format::ascii_to_u32;

/// Layout of the header at the start of each ring buffer page, parsed from
/// tracefs `events/header_page`.
///
/// A typical 64-bit `header_page` looks like:
///
/// ```text
/// 	field: u64 timestamp;	offset:0;	size:8;	signed:0;
/// 	field: local_t commit;	offset:8;	size:8;	signed:1;
/// 	field: int overwrite;	offset:8;	size:1;	signed:1;
/// 	field: char data;	offset:16;	size:4080;	signed:1;
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageHeaderFormat {
    timestamp_offset: u32,
    commit_offset: u32,
    commit_size: u32,
    data_offset: u32,
    data_size: u32,
}

impl PageHeaderFormat {
    /// Layout of 64-bit kernels with 4 KiB sub-buffers.
    pub const DEFAULT_64: Self = Self {
        timestamp_offset: 0,
        commit_offset: 8,
        commit_size: 8,
        data_offset: 16,
        data_size: 4080,
    };

    /// Layout of 32-bit kernels with 4 KiB sub-buffers.
    pub const DEFAULT_32: Self = Self {
        timestamp_offset: 0,
        commit_offset: 8,
        commit_size: 4,
        data_offset: 12,
        data_size: 4084,
    };

    /// Parses the contents of `events/header_page`. Returns `None` if any of the
    /// `timestamp`, `commit` or `data` fields is missing or has an unusable size.
    ///
    /// The `data` size follows the sub-buffer size (`buffer_subbuf_size_kb`), so
    /// it may be larger than the system page.
    pub fn parse(header_page_contents: &str) -> Option<Self> {
        let mut timestamp = None;
        let mut commit = None;
        let mut data = None;

        for line in header_page_contents.lines() {
            if let Some(field) = HeaderField::parse(line) {
                match field.name {
                    "timestamp" => timestamp = Some(field),
                    "commit" => commit = Some(field),
                    "data" => data = Some(field),
                    _ => {}
                }
            }
        }

        let (timestamp, commit, data) = (timestamp?, commit?, data?);
        if timestamp.size != 8 || !matches!(commit.size, 4 | 8) || data.size == 0 {
            return None;
        }

        return Some(Self {
            timestamp_offset: timestamp.offset,
            commit_offset: commit.offset,
            commit_size: commit.size,
            data_offset: data.offset,
            data_size: data.size,
        });
    }

    /// Offset of the u64 page timestamp.
    pub const fn timestamp_offset(&self) -> usize {
        self.timestamp_offset as usize
    }

    /// Offset of the `commit` word (payload size plus flag bits).
    pub const fn commit_offset(&self) -> usize {
        self.commit_offset as usize
    }

    /// Size of the `commit` word, 4 or 8 (`sizeof(long)` of the kernel).
    pub const fn commit_size(&self) -> usize {
        self.commit_size as usize
    }

    /// Offset of the first event record in the page.
    pub const fn data_offset(&self) -> usize {
        self.data_offset as usize
    }

    /// Maximum payload size of a page.
    pub const fn data_size(&self) -> usize {
        self.data_size as usize
    }

    /// Total size of a page, header included.
    pub const fn page_size(&self) -> usize {
        self.data_offset as usize + self.data_size as usize
    }
}

/// One `field: TYPE NAME; offset:N; size:N;` line of `header_page`.
struct HeaderField<'a> {
    name: &'a str,
    offset: u32,
    size: u32,
}

impl<'a> HeaderField<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let mut declaration = "";
        let mut offset = None;
        let mut size = None;
        for property in line.split(';') {
            let property = property.trim_start_matches([' ', '\t']);
            let Some((name, value)) = property.split_once(':') else {
                continue;
            };

            match name {
                "field" => declaration = value,
                "offset" => offset = ascii_to_u32(value.as_bytes()),
                "size" => size = ascii_to_u32(value.as_bytes()),
                _ => {}
            }
        }

        // The name is the last identifier of the declaration.
        let name = declaration
            .rsplit(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .find(|token| !token.is_empty())?;
        return Some(Self {
            name,
            offset: offset?,
            size: size?,
        });
    }
}

impl Default for PageHeaderFormat {
    fn default() -> Self {
        if cfg!(target_pointer_width = "32") {
            Self::DEFAULT_32
        } else {
            Self::DEFAULT_64
        }
    }
}
