//! Named, shared profilers.
//!
//! A [`Registry`] maps names to shared [`ProfilerHandle`]s so that any code can
//! reach "the profiler for this job" without threading a reference through
//! every call. Each name maps to exactly one instance; the registry and every
//! caller share ownership of it, so dropping the registry's entry leaves
//! handles that callers still hold working.

use std::collections::HashMap;
use std::fmt;
use std::ops::AddAssign;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::config::ProfilerConfig;
use crate::error::ProfilerResult;
use crate::profiler::Profiler;
use crate::report::ReportOptions;

/// Process-wide registry.
static GLOBAL_REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Shared ownership of a [`Profiler`].
///
/// Clones refer to the same profiler. The profiler is dropped when the last
/// clone is.
#[derive(Debug, Clone)]
pub struct ProfilerHandle(Arc<Mutex<Profiler>>);

impl ProfilerHandle {
    /// Wrap a profiler for sharing.
    pub fn new(profiler: Profiler) -> Self {
        Self(Arc::new(Mutex::new(profiler)))
    }

    /// Lock the profiler.
    ///
    /// A panic while another holder had it locked does not make the profiler
    /// unusable; the lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, Profiler> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the profiler locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Profiler) -> R) -> R {
        f(&mut self.lock())
    }

    /// See [`Profiler::start`].
    pub fn start(&self, name: &str) {
        self.lock().start(name);
    }

    /// See [`Profiler::stop`].
    pub fn stop(&self, operations: u64) -> ProfilerResult<()> {
        self.lock().stop(operations)
    }

    /// See [`Profiler::stop_all`].
    pub fn stop_all(&self) {
        self.lock().stop_all();
    }

    /// Enter `name`; the returned region stops it when dropped.
    ///
    /// Unlike [`Profiler::push`] the region does not keep the profiler
    /// locked, so other code can use the handle inside the region.
    pub fn push(&self, name: &str) -> SharedRegion {
        self.start(name);
        SharedRegion {
            handle: self.clone(),
            operations: 0,
        }
    }

    /// Description of the profiler.
    pub fn description(&self) -> String {
        self.lock().description().to_string()
    }

    /// Render the profiler's tree.
    pub fn render(&self, options: &ReportOptions) -> String {
        self.lock().render(options)
    }

    /// Whether both handles refer to the same profiler.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of handles currently sharing the profiler.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Display for ProfilerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let profiler = self.lock();
        fmt::Display::fmt(&*profiler, f)
    }
}

/// Scoped region on a shared profiler, returned by [`ProfilerHandle::push`].
#[derive(Debug)]
pub struct SharedRegion {
    handle: ProfilerHandle,
    operations: u64,
}

impl SharedRegion {
    /// Operations credited to the region when it is stopped.
    pub fn add_operations(&mut self, operations: u64) {
        self.operations = self.operations.saturating_add(operations);
    }

    /// The profiler this region belongs to.
    pub fn handle(&self) -> &ProfilerHandle {
        &self.handle
    }
}

impl AddAssign<u64> for SharedRegion {
    fn add_assign(&mut self, operations: u64) {
        self.add_operations(operations);
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        let _ = self.handle.stop(self.operations);
    }
}

/// Key of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Default,
    Named(String),
}

#[derive(Debug, Default)]
struct RegistryState {
    profilers: HashMap<Slot, ProfilerHandle>,
    current: Option<Slot>,
}

/// Directory of shared profilers keyed by name, plus one default slot.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    /// Create an empty, independent registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        GLOBAL_REGISTRY.get_or_init(Registry::new)
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, slot: Slot, config: impl FnOnce() -> ProfilerConfig) -> ProfilerHandle {
        let mut state = self.state();
        state.current = Some(slot.clone());
        state
            .profilers
            .entry(slot)
            .or_insert_with(|| {
                let config = config();
                tracing::debug!(
                    target: "calltree",
                    description = %config.description,
                    "profiler created"
                );
                ProfilerHandle::new(Profiler::with_config(config))
            })
            .clone()
    }

    /// The profiler called `name`, created with `description` if absent.
    ///
    /// The description only matters on creation; later lookups return the
    /// existing profiler unchanged.
    pub fn instance(&self, name: &str, description: &str) -> ProfilerHandle {
        self.lookup(Slot::Named(name.to_string()), || ProfilerConfig::new(description))
    }

    /// Like [`Registry::instance`], creating from a full config if absent.
    pub fn instance_with_config(&self, name: &str, config: ProfilerConfig) -> ProfilerHandle {
        self.lookup(Slot::Named(name.to_string()), || config)
    }

    /// The profiler in the default slot, created with `description` if absent.
    pub fn default_instance(&self, description: &str) -> ProfilerHandle {
        self.lookup(Slot::Default, || ProfilerConfig::new(description))
    }

    /// The most recently requested profiler, if its entry still exists.
    pub fn current(&self) -> Option<ProfilerHandle> {
        let state = self.state();
        state
            .current
            .as_ref()
            .and_then(|slot| state.profilers.get(slot))
            .cloned()
    }

    fn release(&self, slot: &Slot) -> bool {
        let mut state = self.state();
        if state.current.as_ref() == Some(slot) {
            state.current = None;
        }
        state.profilers.remove(slot).is_some()
    }

    /// Drop the registry's hold on `name`.
    ///
    /// Handles obtained earlier keep the profiler alive; the next lookup of
    /// `name` creates a fresh one. Returns whether an entry existed.
    pub fn reset(&self, name: &str) -> bool {
        self.release(&Slot::Named(name.to_string()))
    }

    /// Drop the registry's hold on the default slot.
    pub fn reset_default(&self) -> bool {
        self.release(&Slot::Default)
    }

    /// Whether `name` has an entry.
    pub fn contains(&self, name: &str) -> bool {
        self.state().profilers.contains_key(&Slot::Named(name.to_string()))
    }

    /// Number of entries, the default slot included.
    pub fn len(&self) -> usize {
        self.state().profilers.len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the named entries, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state()
            .profilers
            .keys()
            .filter_map(|slot| match slot {
                Slot::Named(name) => Some(name.clone()),
                Slot::Default => None,
            })
            .collect();
        names.sort();
        names
    }
}
