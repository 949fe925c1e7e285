//! Flat, handle-based access to call-tree profilers.
//!
//! Callers that cannot hold native Rust objects (scripting hosts, other
//! languages behind a thin binding) address profilers through plain integer
//! [`Handle`]s. The [`HandleTable`] owns the profilers and translates each
//! handle back into a shared [`ProfilerHandle`].
//!
//! Integer arguments follow the conventions such callers expect:
//! a non-positive `level` deactivates, a negative `stop_print` or
//! `precision` means "not set".

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use calltree::{
    Gather, Profiler, ProfilerConfig, ProfilerError, ProfilerHandle, ProfilerResult, Reduction,
    ReportOptions, SortKey, DEFAULT_PRECISION,
};

static GLOBAL_TABLE: OnceLock<HandleTable> = OnceLock::new();

/// Opaque identifier of a profiler in a [`HandleTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// The raw value passed across the boundary.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from its raw value.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    profiler: ProfilerHandle,
    gather: Option<Arc<dyn Gather>>,
}

/// Table of profilers addressed by [`Handle`].
#[derive(Debug)]
pub struct HandleTable {
    entries: Mutex<HashMap<Handle, Entry>>,
    next_id: AtomicU64,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The process-wide table.
    pub fn global() -> &'static HandleTable {
        GLOBAL_TABLE.get_or_init(HandleTable::new)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Handle, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, profiler: Profiler, gather: Option<Arc<dyn Gather>>) -> Handle {
        let handle = Handle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().insert(
            handle,
            Entry {
                profiler: ProfilerHandle::new(profiler),
                gather,
            },
        );
        tracing::debug!(target: "calltree", %handle, "profiler handle created");
        handle
    }

    fn entry(&self, handle: Handle) -> ProfilerResult<Entry> {
        self.entries()
            .get(&handle)
            .cloned()
            .ok_or(ProfilerError::UnknownHandle(handle.0))
    }

    /// A purely local profiler described by `name`.
    pub fn new_serial(&self, name: &str) -> Handle {
        self.insert(Profiler::new(name), None)
    }

    /// A local profiler with a report sort code and an activity level.
    ///
    /// Sort codes are those of [`SortKey::from_code`].
    pub fn new_serial_with(&self, name: &str, sort: i32, level: i32) -> Handle {
        let report = ReportOptions::default().with_sort(SortKey::from_code(sort));
        let mut profiler = Profiler::with_config(ProfilerConfig::new(name).with_report(report));
        profiler.set_active(level_depth(level), None);
        self.insert(profiler, None)
    }

    /// A profiler whose reports merge every participant's tree through `gather`.
    pub fn new_with_gather(&self, name: &str, gather: Arc<dyn Gather>) -> Handle {
        self.insert(Profiler::new(name), Some(gather))
    }

    /// Drop the table's hold on `handle`.
    ///
    /// Returns whether the handle was known.
    pub fn release(&self, handle: Handle) -> bool {
        self.entries().remove(&handle).is_some()
    }

    /// Whether `handle` is known.
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries().contains_key(&handle)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Whether no handles are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shared profiler behind `handle`.
    pub fn profiler(&self, handle: Handle) -> ProfilerResult<ProfilerHandle> {
        Ok(self.entry(handle)?.profiler)
    }

    /// Discard the recorded tree, starting over with `name` as description.
    pub fn reset(&self, handle: Handle, name: &str) -> ProfilerResult<()> {
        self.entry(handle)?.profiler.with(|p| p.reset(name));
        Ok(())
    }

    /// See [`Profiler::set_active`].
    pub fn set_active(&self, handle: Handle, level: i32, stop_print: i32) -> ProfilerResult<()> {
        let stop_print = usize::try_from(stop_print).ok();
        self.entry(handle)?
            .profiler
            .with(|p| p.set_active(level_depth(level), stop_print));
        Ok(())
    }

    /// Enter the region `name` below the active one.
    pub fn start(&self, handle: Handle, name: &str) -> ProfilerResult<()> {
        self.entry(handle)?.profiler.start(name);
        Ok(())
    }

    /// Create the region `name` below the active one without starting it.
    ///
    /// Returns whether a node was created.
    pub fn declare(&self, handle: Handle, name: &str) -> ProfilerResult<bool> {
        Ok(self
            .entry(handle)?
            .profiler
            .with(|p| p.declare(name).is_some()))
    }

    /// Stop the innermost region. `name` is advisory.
    pub fn stop(&self, handle: Handle, name: &str, operations: u64) -> ProfilerResult<()> {
        self.entry(handle)?
            .profiler
            .with(|p| p.stop_named(name, operations))
    }

    /// Render the profiler's report.
    ///
    /// Profilers created with a gather render the merged tree on the
    /// reporting participant and an empty string elsewhere.
    pub fn render(
        &self,
        handle: Handle,
        verbosity: i32,
        cumulative: bool,
        precision: i32,
    ) -> ProfilerResult<String> {
        let entry = self.entry(handle)?;
        let profiler = entry.profiler.lock();
        let options = profiler
            .report_options()
            .clone()
            .with_verbosity(u8::try_from(verbosity.max(0)).unwrap_or(u8::MAX))
            .with_cumulative(cumulative)
            .with_precision(usize::try_from(precision).unwrap_or(DEFAULT_PRECISION));

        match &entry.gather {
            Some(gather) => Ok(profiler
                .report_global(gather.as_ref(), Reduction::Sum, &options)?
                .unwrap_or_default()),
            None => Ok(profiler.render(&options)),
        }
    }

    /// Render into a caller-owned buffer as a NUL-terminated string.
    ///
    /// At most `buffer.len() - 1` bytes of text are written, cut on a
    /// character boundary. Returns the number of text bytes written.
    pub fn render_into(
        &self,
        handle: Handle,
        buffer: &mut [u8],
        verbosity: i32,
        cumulative: bool,
        precision: i32,
    ) -> ProfilerResult<usize> {
        let report = self.render(handle, verbosity, cumulative, precision)?;
        let Some(capacity) = buffer.len().checked_sub(1) else {
            return Ok(0);
        };

        let mut len = report.len().min(capacity);
        while !report.is_char_boundary(len) {
            len -= 1;
        }
        if len < report.len() {
            tracing::warn!(
                target: "calltree",
                %handle,
                needed = report.len() + 1,
                available = buffer.len(),
                "report truncated to fit buffer"
            );
        }

        buffer[..len].copy_from_slice(&report.as_bytes()[..len]);
        buffer[len] = 0;
        Ok(len)
    }
}

fn level_depth(level: i32) -> usize {
    usize::try_from(level).unwrap_or(0)
}
