// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use std::fs;
use std::io;
use std::io::Read;
use std::path;
use std::string;
use std::vec;

use thiserror::Error;

/// Errors returned when locating or reading a tracefs instance.
#[derive(Debug, Error)]
pub enum TracefsError {
    /// No tracefs (or debugfs "tracing" directory) could be found.
    #[error("tracefs mount point not found")]
    NotFound,

    /// Instance names must be a single non-empty path component.
    #[error("invalid tracefs instance name {0:?}")]
    InvalidInstanceName(string::String),

    /// The named instance does not exist under `instances/`.
    #[error("tracefs instance {0:?} does not exist")]
    InstanceNotFound(string::String),

    /// The `events/header_page` file is missing or unusable.
    #[error("unusable ring buffer header_page in {0}")]
    BadHeaderPage(path::PathBuf),

    /// No event "format" file under `events/` could be parsed.
    #[error("no usable event formats under {0}")]
    NoEventFormats(path::PathBuf),

    /// The parsed formats do not describe the expected "common_*" fields.
    #[error("event formats are missing common field {0:?}")]
    MissingCommonField(&'static str),

    /// An I/O error on a specific tracefs path.
    #[error("{path}: {source}")]
    Io {
        /// The file or directory being accessed.
        path: path::PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

/// A tracefs mount point (or an instance directory within one).
///
/// Only read operations are provided: nothing here writes to control files,
/// enables events, or starts/stops tracing.
#[derive(Clone, Debug)]
pub struct Tracefs {
    root: path::PathBuf,
}

impl Tracefs {
    /// Usual locations of tracefs, tried in order before falling back to
    /// parsing `/proc/mounts`.
    pub const DEFAULT_MOUNT_POINTS: [&'static str; 2] =
        ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

    /// Uses `root` as the tracefs root. Fails if `root` does not look like a
    /// tracefs root (it must contain a `per_cpu` directory).
    pub fn with_root(root: impl Into<path::PathBuf>) -> Result<Self, TracefsError> {
        let root = root.into();
        if !looks_like_tracefs(&root) {
            return Err(TracefsError::NotFound);
        }

        return Ok(Self { root });
    }

    /// Finds the tracefs mount point: first the usual locations, then the
    /// `tracefs` or `debugfs` entries of `/proc/mounts` (preferring tracefs).
    pub fn guess_mount_point() -> Result<Self, TracefsError> {
        for candidate in Self::DEFAULT_MOUNT_POINTS {
            if let Ok(tracefs) = Self::with_root(candidate) {
                return Ok(tracefs);
            }
        }

        let mounts = fs::read_to_string("/proc/mounts").map_err(|source| TracefsError::Io {
            path: path::PathBuf::from("/proc/mounts"),
            source,
        })?;
        let root = Self::find_mount_point(&mounts).ok_or(TracefsError::NotFound)?;
        tracing::debug!(root = %root.display(), "tracefs found via /proc/mounts");
        return Self::with_root(root);
    }

    /// Given the contents of `/proc/mounts`, returns the tracefs root: the mount
    /// point of the first `tracefs` entry, or else `<mount point>/tracing` of the
    /// first `debugfs` entry.
    pub fn find_mount_point(mounts: &str) -> Option<path::PathBuf> {
        let mut debugfs_root = None;

        for line in mounts.lines() {
            // line is "device_name mount_point file_system other_stuff..."
            let mut parts = line.split([' ', '\t']).filter(|part| !part.is_empty());
            let (Some(_device), Some(mount_point), Some(file_system), Some(_options)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                // Ignore line if no whitespace after file_system.
                continue;
            };

            if file_system == "tracefs" {
                return Some(path::PathBuf::from(mount_point));
            } else if debugfs_root.is_none() && file_system == "debugfs" {
                // Keep looking in case we find a tracefs later.
                debugfs_root = Some(path::Path::new(mount_point).join("tracing"));
            }
        }

        return debugfs_root;
    }

    /// Returns the tracefs instance named `name`, i.e. `<root>/instances/<name>`.
    ///
    /// The name must be a single path component: empty names, `.`, `..`, and
    /// names containing `/` or NUL are rejected.
    pub fn instance(&self, name: &str) -> Result<Self, TracefsError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
            return Err(TracefsError::InvalidInstanceName(string::String::from(name)));
        }

        let root = self.root.join("instances").join(name);
        if !looks_like_tracefs(&root) {
            return Err(TracefsError::InstanceNotFound(string::String::from(name)));
        }

        return Ok(Self { root });
    }

    /// Returns the root directory of this tracefs instance.
    pub fn root(&self) -> &path::Path {
        &self.root
    }

    /// Returns the number of per-CPU buffers, i.e. the number of consecutive
    /// `per_cpu/cpuN` directories starting at `cpu0`.
    pub fn number_of_cpus(&self) -> usize {
        let per_cpu = self.root.join("per_cpu");
        let mut cpu = 0;
        while per_cpu.join(format!("cpu{}", cpu)).is_dir() {
            cpu += 1;
        }

        return cpu;
    }

    /// Opens `per_cpu/cpu<cpu>/trace_pipe_raw` for non-blocking reads.
    pub fn open_pipe_for_cpu(&self, cpu: usize) -> Result<TracePipeRaw, TracefsError> {
        let path = self
            .root
            .join("per_cpu")
            .join(format!("cpu{}", cpu))
            .join("trace_pipe_raw");
        return TracePipeRaw::open(cpu, &path).map_err(|source| TracefsError::Io { path, source });
    }

    /// Returns the contents of `events/header_page`.
    pub fn read_header_page(&self) -> Result<string::String, TracefsError> {
        return self.read_to_string(&self.root.join("events").join("header_page"));
    }

    /// Returns the contents of `events/<system>/<event>/format`.
    pub fn read_event_format(
        &self,
        system: &str,
        event: &str,
    ) -> Result<string::String, TracefsError> {
        return self.read_to_string(&self.root.join("events").join(system).join(event).join("format"));
    }

    /// Lists `(system, event)` pairs for every `events/<system>/<event>/format`
    /// file, sorted by system then event.
    pub fn event_names(
        &self,
    ) -> Result<vec::Vec<(string::String, string::String)>, TracefsError> {
        let events_dir = self.root.join("events");
        let mut names = vec::Vec::new();

        for system_dir in read_dir_sorted(&events_dir)? {
            if !system_dir.is_dir() {
                continue; // e.g. header_page, header_event, enable.
            }

            let Some(system) = file_name_string(&system_dir) else {
                continue;
            };

            for event_dir in read_dir_sorted(&system_dir)? {
                if event_dir.join("format").is_file() {
                    if let Some(event) = file_name_string(&event_dir) {
                        names.push((system.clone(), event));
                    }
                }
            }
        }

        return Ok(names);
    }

    fn read_to_string(&self, path: &path::Path) -> Result<string::String, TracefsError> {
        return fs::read_to_string(path).map_err(|source| TracefsError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
}

/// A read-only, non-blocking handle to one CPU's `trace_pipe_raw`.
///
/// Each successful read returns one ring buffer page and removes it from the
/// kernel buffer. An empty buffer returns 0 bytes or `WouldBlock`.
#[derive(Debug)]
pub struct TracePipeRaw {
    cpu: usize,
    file: fs::File,
}

impl TracePipeRaw {
    /// Opens `path` read-only (and non-blocking on unix).
    pub fn open(cpu: usize, path: &path::Path) -> io::Result<Self> {
        let mut options = fs::OpenOptions::new();
        options.read(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NONBLOCK);
        }

        return Ok(Self {
            cpu,
            file: options.open(path)?,
        });
    }

    /// Returns the CPU this pipe belongs to.
    pub fn cpu(&self) -> usize {
        self.cpu
    }

    /// Reads one page into `page`, returning the number of bytes read. Returns
    /// `Ok(0)` at end of data.
    pub fn read_page(&mut self, page: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.file.read(page) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }
}

/// Returns the system page size. Ring buffer sub-buffers are at least this
/// large; the exact size comes from `events/header_page`.
pub fn system_page_size() -> usize {
    #[cfg(unix)]
    {
        // Safety: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            return size as usize;
        }
    }

    return 4096;
}

fn looks_like_tracefs(root: &path::Path) -> bool {
    return root.join("per_cpu").is_dir();
}

fn read_dir_sorted(dir: &path::Path) -> Result<vec::Vec<path::PathBuf>, TracefsError> {
    let to_error = |source| TracefsError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = vec::Vec::new();
    for entry in fs::read_dir(dir).map_err(to_error)? {
        paths.push(entry.map_err(to_error)?.path());
    }

    paths.sort();
    return Ok(paths);
}

fn file_name_string(path: &path::Path) -> Option<string::String> {
    return path.file_name()?.to_str().map(string::String::from);
}
