// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::string;
use std::vec;

use crate::field_format::ascii_to_u32;
use crate::*;

/// Event information parsed from a tracefs "format" file.
#[derive(Clone, Debug)]
pub struct TraceEventFormat {
    system_name: string::String,
    name: string::String,
    fields: vec::Vec<TraceFieldFormat>,
    id: u32,
    common_field_count: u16,
}

impl TraceEventFormat {
    /// Parses an event's "format" file.
    ///
    /// - `system_name`:
    ///   The name of the system, e.g. `"sched"` for `sched:sched_switch`.
    ///
    /// - `format_file_contents`:
    ///   The contents of the "format" file, typically
    ///   `/sys/kernel/tracing/events/sched/sched_switch/format`.
    ///
    /// If "ID:" is a valid unsigned and "name:" is not empty, returns a usable
    /// value. Otherwise returns `None`.
    pub fn parse(system_name: &str, format_file_contents: &str) -> Option<Self> {
        let mut name = "";
        let mut fields = vec::Vec::new();
        let mut id = None;
        let mut common_field_count = 0u16;

        let mut lines = format_file_contents.lines();
        while let Some(line) = lines.next() {
            // Search for lines like "NAME: VALUE..."
            let Some((prop_name, prop_value)) = line.split_once(':') else {
                continue;
            };
            let prop_value = prop_value.trim_start_matches([' ', '\t']);

            match prop_name {
                "name" => name = prop_value,
                "ID" => id = ascii_to_u32(prop_value.as_bytes()),
                "format" => {
                    // Lines like "\tfield:TYPE NAME;\toffset:N;\tsize:N;\tsigned:N;"
                    // Common fields come first, terminated by a blank line. A second
                    // blank line ends the format section.
                    let mut common = true;
                    fields.clear();
                    common_field_count = 0;

                    for field_line in lines.by_ref() {
                        if field_line.trim().is_empty() {
                            if common {
                                common = false;
                                continue;
                            } else {
                                break;
                            }
                        }

                        if let Some(field) = TraceFieldFormat::parse(field_line) {
                            fields.push(field);
                            if common {
                                common_field_count += 1;
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        match id {
            Some(id) if !name.is_empty() => {
                return Some(Self {
                    system_name: string::String::from(system_name),
                    name: string::String::from(name),
                    fields,
                    id,
                    common_field_count,
                });
            }
            _ => {
                return None;
            }
        }
    }

    /// Returns the value of the `system_name` parameter provided to `parse`,
    /// e.g. `"sched"`.
    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    /// Returns the value of the "name:" property, e.g. `"sched_switch"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fields from the "format:" property, common fields first.
    pub fn fields(&self) -> &[TraceFieldFormat] {
        &self.fields
    }

    /// Returns the fields that follow the "common_*" fields.
    pub fn user_fields(&self) -> &[TraceFieldFormat] {
        &self.fields[self.common_field_count as usize..]
    }

    /// Returns the value of the "ID:" property. This value is matched against
    /// the "common_type" field of each raw event.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the number of "common_*" fields at the start of the event.
    pub fn common_field_count(&self) -> usize {
        self.common_field_count as usize
    }
}
