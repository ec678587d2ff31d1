// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::string;
use std::vec;

use serde::Deserialize;
use serde::Serialize;

use crate::FrozenFtraceError;

/// Default per-CPU page ceiling for a single drain step.
pub const DEFAULT_PAGES_PER_TICK: usize = 32;

/// Default lifetime page quota per CPU.
pub const DEFAULT_PAGE_QUOTA: usize = 1024;

/// Generic data source configuration as handed over by the host. Only the
/// raw frozen ftrace blob is interpreted here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataSourceConfig {
    /// Name the host used to select the data source, e.g. `linux.frozen_ftrace`.
    pub name: string::String,

    /// JSON-encoded [`FrozenFtraceConfig`]. Empty means all defaults.
    pub frozen_ftrace_config_raw: vec::Vec<u8>,
}

impl DataSourceConfig {
    /// Creates a config carrying the given raw frozen ftrace blob.
    pub fn new(name: &str, frozen_ftrace_config_raw: impl Into<vec::Vec<u8>>) -> Self {
        return Self {
            name: string::String::from(name),
            frozen_ftrace_config_raw: frozen_ftrace_config_raw.into(),
        };
    }
}

/// Settings for draining a frozen tracefs instance. Every field is optional in
/// the JSON form.
///
/// ```
/// # use tracepoint_frozen::FrozenFtraceConfig;
/// let config = FrozenFtraceConfig::parse(br#"{
///     "instance_name": "boot_trace",
///     "ftrace_events": ["sched/sched_switch", "irq/*"]
/// }"#).unwrap();
/// assert_eq!(config.instance_name.as_deref(), Some("boot_trace"));
/// assert_eq!(config.pages_per_tick, 32);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FrozenFtraceConfig {
    /// tracefs instance to read (`instances/<name>`). `None` or empty means
    /// the top-level buffer.
    pub instance_name: Option<string::String>,

    /// Events to decode: `"system/event"`, `"system/*"` or a bare `"event"`
    /// (matches that event in any system). Empty decodes nothing.
    pub ftrace_events: vec::Vec<string::String>,

    /// Per-CPU page ceiling for one drain step.
    pub pages_per_tick: usize,

    /// Lifetime page quota per CPU.
    pub page_quota: usize,
}

impl FrozenFtraceConfig {
    /// Parses a JSON config blob. An empty blob yields the defaults.
    pub fn parse(raw: &[u8]) -> Result<Self, FrozenFtraceError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        return Ok(serde_json::from_slice(raw)?);
    }

    /// Returns the instance name, treating an empty name as none.
    pub fn instance(&self) -> Option<&str> {
        return self.instance_name.as_deref().filter(|name| !name.is_empty());
    }
}

impl Default for FrozenFtraceConfig {
    fn default() -> Self {
        Self {
            instance_name: None,
            ftrace_events: vec::Vec::new(),
            pages_per_tick: DEFAULT_PAGES_PER_TICK,
            page_quota: DEFAULT_PAGE_QUOTA,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_is_default() {
        assert_eq!(FrozenFtraceConfig::parse(b"").unwrap(), FrozenFtraceConfig::default());
        assert_eq!(FrozenFtraceConfig::parse(b" \n").unwrap(), FrozenFtraceConfig::default());
        assert_eq!(FrozenFtraceConfig::parse(b"{}").unwrap(), FrozenFtraceConfig::default());
    }

    #[test]
    fn partial_blob_keeps_defaults() {
        let config = FrozenFtraceConfig::parse(br#"{"page_quota": 8}"#).unwrap();
        assert_eq!(config.page_quota, 8);
        assert_eq!(config.pages_per_tick, DEFAULT_PAGES_PER_TICK);
        assert!(config.ftrace_events.is_empty());
        assert_eq!(config.instance(), None);

        let config = FrozenFtraceConfig::parse(br#"{"instance_name": ""}"#).unwrap();
        assert_eq!(config.instance(), None);
    }

    #[test]
    fn malformed_blob_is_an_error() {
        assert!(matches!(
            FrozenFtraceConfig::parse(b"{\"page_quota\": \"lots\"}"),
            Err(FrozenFtraceError::Config(_))
        ));
        assert!(FrozenFtraceConfig::parse(b"\x08\x01").is_err());
    }
}
