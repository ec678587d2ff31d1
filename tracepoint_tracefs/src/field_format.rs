// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use core::ops;

use std::string;

/// Array-ness of a field, as declared in a tracefs "format" file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraceFieldArray {
    /// e.g. `int val; size:4;`.
    None,

    /// e.g. `char val[16]; size:16;`.
    Fixed,

    /// e.g. `char val[]; size:0;`.
    RestOfEvent,

    /// e.g. `__data_loc char val[]; size:2;`.
    /// Value contains offset. Length is determined via strlen.
    DataLoc2,

    /// e.g. `__data_loc char val[]; size:4;`.
    /// Value contains `(dataLen << 16) | offset`.
    DataLoc4,

    /// e.g. `__rel_loc char val[]; size:2;`.
    /// Value contains relativeOffset. Length is determined via strlen.
    RelLoc2,

    /// e.g. `__rel_loc char val[]; size:4;`.
    /// Value contains `(dataLen << 16) | relativeOffset`.
    RelLoc4,
}

/// How the bytes of a field should be turned into a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TraceFieldKind {
    /// Signed integer of 1, 2, 4 or 8 bytes.
    SignedInt,

    /// Unsigned integer of 1, 2, 4 or 8 bytes (includes pointers).
    UnsignedInt,

    /// NUL-terminated (or NUL-padded) 8-bit string.
    String,

    /// Anything else: structs, odd sizes, non-char arrays.
    Bytes,
}

/// Decoding information about a field, parsed from a line of a tracefs
/// "format" file.
#[derive(Clone, Debug)]
pub struct TraceFieldFormat {
    field: string::String,
    name_range: ops::Range<usize>,
    offset: u16,
    size: u16,
    signed: Option<bool>,
    array: TraceFieldArray,
    kind: TraceFieldKind,
}

impl TraceFieldFormat {
    /// Initializes a `TraceFieldFormat` from a `field` declaration plus pre-parsed
    /// values for the other properties. Normally you'll call `parse` instead.
    ///
    /// The signed parameter should be `None` if the "signed:" property is not
    /// present in the format line.
    pub fn new(field: &str, offset: u16, size: u16, signed: Option<bool>) -> Self {
        // Brackets may come before the name ("__data_loc char[] name") or after
        // it ("char comm[16]"). Blank them out so the name is the last identifier.
        // Blanking is byte-for-byte, so ranges into `declaration` are also valid
        // ranges into `field`.
        let found_array = field.contains('[');
        let mut declaration = field.as_bytes().to_vec();
        let mut depth = 0u32;
        for b in declaration.iter_mut() {
            match *b {
                b'[' => {
                    depth += 1;
                    *b = b' ';
                }
                b']' => {
                    depth = depth.saturating_sub(1);
                    *b = b' ';
                }
                _ if depth > 0 => *b = b' ',
                _ => {}
            }
        }

        let mut found_char = false;
        let mut found_unsigned = false;
        let mut found_signed = false;
        let mut found_struct = false;
        let mut found_data_loc = false;
        let mut found_rel_loc = false;
        let mut found_unsigned_alias = false;
        let found_pointer = declaration.contains(&b'*');

        // The name is the last identifier. Each identifier before it is part of the type.
        let mut name_range = 0..0;
        let mut pos = 0;
        while pos < declaration.len() {
            if !is_ident_char(declaration[pos]) {
                pos += 1;
                continue;
            }

            let token_start = pos;
            while pos < declaration.len() && is_ident_char(declaration[pos]) {
                pos += 1;
            }

            let previous = &field[name_range.clone()];
            match previous {
                "char" => found_char = true,
                "unsigned" => found_unsigned = true,
                "signed" => found_signed = true,
                "struct" => found_struct = true,
                "__data_loc" => found_data_loc = true,
                "__rel_loc" => found_rel_loc = true,
                _ => {
                    if is_unsigned_alias(previous) {
                        found_unsigned_alias = true;
                    }
                }
            }

            name_range = token_start..pos;
        }

        let array = if size == 0 {
            TraceFieldArray::RestOfEvent
        } else if size == 2 && found_rel_loc {
            TraceFieldArray::RelLoc2
        } else if size == 2 && found_data_loc {
            TraceFieldArray::DataLoc2
        } else if size == 4 && found_rel_loc {
            TraceFieldArray::RelLoc4
        } else if size == 4 && found_data_loc {
            TraceFieldArray::DataLoc4
        } else if found_array {
            TraceFieldArray::Fixed
        } else {
            TraceFieldArray::None
        };

        let is_text = found_char && !found_unsigned && !found_signed && !found_pointer;
        let kind = if array != TraceFieldArray::None {
            if is_text {
                TraceFieldKind::String
            } else {
                TraceFieldKind::Bytes
            }
        } else if found_struct || !matches!(size, 1 | 2 | 4 | 8) {
            TraceFieldKind::Bytes
        } else if found_pointer {
            TraceFieldKind::UnsignedInt
        } else {
            // If present, "signed:" overrides the declared type.
            let declared_signed = !(found_unsigned || found_unsigned_alias);
            if signed.unwrap_or(declared_signed) {
                TraceFieldKind::SignedInt
            } else {
                TraceFieldKind::UnsignedInt
            }
        };

        return Self {
            field: string::String::from(field),
            name_range,
            offset,
            size,
            signed,
            array,
            kind,
        };
    }

    /// Parses a line of the "format:" section of an event's "format" file. The
    /// line will generally look like
    /// `"\tfield:TYPE NAME;\toffset:N;\tsize:N;\tsigned:N;"`.
    ///
    /// If "field:" is non-empty and "offset:" and "size:" are valid unsigned
    /// integers, returns a usable value. Otherwise returns `None`.
    pub fn parse(format_line: &str) -> Option<Self> {
        let mut field = "";
        let mut offset = None;
        let mut size = None;
        let mut signed = None;

        // Search for " NAME: VALUE;"
        for property in format_line.split(';') {
            let property = property.trim_start_matches(is_space_or_tab_char);
            let Some((name, value)) = property.split_once(':') else {
                continue;
            };

            if name == "field" || name == "field special" {
                field = value;
            } else if name == "offset" {
                offset = ascii_to_u32(value.as_bytes()).and_then(|n| u16::try_from(n).ok());
            } else if name == "size" {
                size = ascii_to_u32(value.as_bytes()).and_then(|n| u16::try_from(n).ok());
            } else if name == "signed" {
                signed = ascii_to_u32(value.as_bytes()).map(|n| n != 0);
            }
        }

        match (offset, size) {
            (Some(offset), Some(size)) if !field.is_empty() => {
                return Some(Self::new(field, offset, size, signed));
            }
            _ => return None,
        }
    }

    /// Returns the field declaration, e.g. `"char comm[16]"`.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the field name, e.g. `"comm"`.
    pub fn name(&self) -> &str {
        &self.field[self.name_range.clone()]
    }

    /// Returns the value of the "offset:" property.
    pub fn offset(&self) -> u16 {
        self.offset
    }

    /// Returns the value of the "size:" property.
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Returns the value of the "signed:" property, or `None` if not present.
    pub fn signed(&self) -> Option<bool> {
        self.signed
    }

    /// Returns the array-ness of the field.
    pub fn array(&self) -> TraceFieldArray {
        self.array
    }

    /// Returns how the field's bytes should be decoded.
    pub fn kind(&self) -> TraceFieldKind {
        self.kind
    }

    /// Returns the end offset of the field, i.e. `offset + size`.
    pub fn end(&self) -> usize {
        self.offset as usize + self.size as usize
    }
}

/// Parses a decimal or "0x"-prefixed hex unsigned integer, ignoring leading
/// whitespace and any trailing non-digit characters.
pub(crate) fn ascii_to_u32(chars: &[u8]) -> Option<u32> {
    let mut pos = 0;
    while pos < chars.len() && is_space_or_tab(chars[pos]) {
        pos += 1;
    }

    let radix = if chars.len() - pos > 2
        && chars[pos] == b'0'
        && (chars[pos + 1] == b'x' || chars[pos + 1] == b'X')
    {
        pos += 2; // Skip "0x".
        16
    } else {
        10
    };

    let mut any_digits = false;
    let mut value = 0u32;
    while pos < chars.len() {
        match (chars[pos] as char).to_digit(radix) {
            Some(digit) => {
                value = value.checked_mul(radix)?.checked_add(digit)?;
            }
            None => {
                break;
            }
        }

        pos += 1;
        any_digits = true;
    }

    return if any_digits { Some(value) } else { None };
}

pub(crate) fn is_space_or_tab(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

fn is_space_or_tab_char(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

fn is_unsigned_alias(type_name: &str) -> bool {
    return type_name.starts_with('u')
        || type_name.starts_with("__u")
        || type_name == "size_t"
        || type_name == "gfp_t"
        || type_name == "dev_t";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_common_fields() {
        let f = TraceFieldFormat::parse(
            "\tfield:unsigned short common_type;\toffset:0;\tsize:2;\tsigned:0;",
        )
        .unwrap();
        assert_eq!(f.name(), "common_type");
        assert_eq!(f.offset(), 0);
        assert_eq!(f.size(), 2);
        assert_eq!(f.signed(), Some(false));
        assert_eq!(f.kind(), TraceFieldKind::UnsignedInt);
        assert_eq!(f.array(), TraceFieldArray::None);

        let f = TraceFieldFormat::parse("\tfield:int common_pid;\toffset:4;\tsize:4;\tsigned:1;")
            .unwrap();
        assert_eq!(f.name(), "common_pid");
        assert_eq!(f.kind(), TraceFieldKind::SignedInt);
        assert_eq!(f.end(), 8);
    }

    #[test]
    fn parse_arrays() {
        let f = TraceFieldFormat::parse("\tfield:char prev_comm[16];\toffset:8;\tsize:16;\tsigned:0;")
            .unwrap();
        assert_eq!(f.name(), "prev_comm");
        assert_eq!(f.array(), TraceFieldArray::Fixed);
        assert_eq!(f.kind(), TraceFieldKind::String);

        let f = TraceFieldFormat::parse("\tfield:__data_loc char[] name;\toffset:8;\tsize:4;\tsigned:0;")
            .unwrap();
        assert_eq!(f.name(), "name");
        assert_eq!(f.array(), TraceFieldArray::DataLoc4);
        assert_eq!(f.kind(), TraceFieldKind::String);

        let f = TraceFieldFormat::parse("\tfield:u8 buf[8];\toffset:8;\tsize:8;\tsigned:0;").unwrap();
        assert_eq!(f.kind(), TraceFieldKind::Bytes);
    }

    #[test]
    fn parse_pointer_and_alias() {
        let f = TraceFieldFormat::parse("\tfield:void * ptr;\toffset:8;\tsize:8;\tsigned:0;").unwrap();
        assert_eq!(f.name(), "ptr");
        assert_eq!(f.kind(), TraceFieldKind::UnsignedInt);

        // No "signed:" property: fall back to the declared type.
        let f = TraceFieldFormat::parse("\tfield:u32 flags;\toffset:8;\tsize:4;").unwrap();
        assert_eq!(f.signed(), None);
        assert_eq!(f.kind(), TraceFieldKind::UnsignedInt);

        let f = TraceFieldFormat::parse("\tfield:long delta;\toffset:8;\tsize:8;").unwrap();
        assert_eq!(f.kind(), TraceFieldKind::SignedInt);
    }

    #[test]
    fn parse_rejects_incomplete() {
        assert!(TraceFieldFormat::parse("\tfield:int x;\toffset:8;").is_none());
        assert!(TraceFieldFormat::parse("\toffset:8;\tsize:4;").is_none());
        assert!(TraceFieldFormat::parse("").is_none());
    }

    #[test]
    fn ascii_numbers() {
        assert_eq!(ascii_to_u32(b"42"), Some(42));
        assert_eq!(ascii_to_u32(b" 0x1f"), Some(31));
        assert_eq!(ascii_to_u32(b"12abc"), Some(12));
        assert_eq!(ascii_to_u32(b"abc"), None);
        assert_eq!(ascii_to_u32(b"99999999999"), None);
    }
}
