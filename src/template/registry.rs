//! Shared name → compiled unit registry.
//!
//! One mutex guards the map. It is held only for the map access itself,
//! never while compiling, fetching, or executing a template, so readers see
//! either the previous or the new unit for a key but never a partial one.

use super::{CompileError, CompiledTemplate, Helpers, TemplateGroup, compile_sets};
use crate::asset::{AssetSource, MemorySource};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Registry of compiled units plus the declarations needed to (re)load them.
///
/// Built once at startup and shared with the HTTP layer by `Arc`; `load`
/// may be called again at any time to hot-reload every declared group.
pub struct Registry {
    templates: Mutex<FxHashMap<String, Arc<CompiledTemplate>>>,
    source: Arc<dyn AssetSource>,
    helpers: Helpers,
    groups: Vec<TemplateGroup>,
}

impl Registry {
    pub fn new(source: Arc<dyn AssetSource>, helpers: Helpers, groups: Vec<TemplateGroup>) -> Self {
        Self {
            templates: Mutex::new(FxHashMap::default()),
            source,
            helpers,
            groups,
        }
    }

    /// Registry with no declared groups; entries come only from `add`.
    pub fn empty() -> Self {
        Self::new(Arc::new(MemorySource::new()), Helpers::new(), Vec::new())
    }

    /// Get a unit by name, if it has been loaded or added.
    pub fn get(&self, name: &str) -> Option<Arc<CompiledTemplate>> {
        self.templates.lock().get(name).cloned()
    }

    /// Insert or replace a unit.
    pub fn add(&self, name: impl Into<String>, unit: Arc<CompiledTemplate>) {
        self.templates.lock().insert(name.into(), unit);
    }

    /// Remove a unit.
    pub fn delete(&self, name: &str) {
        self.templates.lock().remove(name);
    }

    /// Compile every declared group from scratch, replacing entries one at a time.
    pub fn load(&self) -> Result<(), CompileError> {
        self.load_with_progress(|| {})
    }

    /// [`Registry::load`] with a callback after each compiled set.
    pub fn load_with_progress(&self, on_progress: impl Fn() + Sync) -> Result<(), CompileError> {
        for group in &self.groups {
            compile_sets(
                &group.name,
                &group.sets,
                &group.layout,
                self.source.as_ref(),
                &self.helpers,
                self,
                &on_progress,
            )?;
        }
        Ok(())
    }

    /// Number of sets `load` compiles.
    pub fn declared_sets(&self) -> usize {
        self.groups.iter().map(|g| g.sets.len()).sum()
    }

    pub fn groups(&self) -> &[TemplateGroup] {
        &self.groups
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.templates.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.templates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.lock().is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("templates", &self.names())
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}
