//! Concurrent compilation of template sets.

use super::{CompileError, CompiledTemplate, Helpers, Registry, TemplateSet};
use crate::asset::AssetSource;
use rayon::prelude::*;
use std::sync::Arc;

/// Compile every set (each followed by `layout`) and register it under its
/// first fragment.
///
/// Sets compile in parallel and this call returns only once all of them are
/// done. The first failure stops scheduling further sets and is returned;
/// sets that already registered stay registered. `group` only labels errors.
///
/// Calls `on_progress` after each set is processed.
pub fn compile_sets(
    group: &str,
    sets: &[TemplateSet],
    layout: &[String],
    source: &dyn AssetSource,
    helpers: &Helpers,
    registry: &Registry,
    on_progress: impl Fn() + Sync,
) -> Result<(), CompileError> {
    sets.par_iter().try_for_each(|set| {
        let result = compile_set(group, set, layout, source, helpers, registry);
        on_progress();
        result
    })
}

fn compile_set(
    group: &str,
    set: &TemplateSet,
    layout: &[String],
    source: &dyn AssetSource,
    helpers: &Helpers,
    registry: &Registry,
) -> Result<(), CompileError> {
    let Some(key) = set.key() else {
        return Err(CompileError::EmptySet {
            group: group.to_owned(),
        });
    };

    let unit = CompiledTemplate::compile(set.with_layout(layout), source, helpers)?;
    registry.add(key, Arc::new(unit));
    Ok(())
}
