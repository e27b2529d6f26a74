//! Template sets, compilation, and the shared registry.
//!
//! # Flow
//!
//! ```text
//! TemplateGroup { sets, layout }
//!        │
//!        ▼
//! compile_sets() ── rayon fan-out, one task per set ──┐
//!        │                                           │
//!        ▼                                           ▼
//! fetch fragments ──► concatenate ──► parse ──► find ROOT
//!                                                    │
//!                                                    ▼
//!                                      Registry::add(first fragment, unit)
//! ```
//!
//! A set is keyed by its first fragment; the shared layout fragments are
//! appended after the set's own fragments.

pub mod compile;
mod helpers;
pub mod registry;
mod unit;

pub use compile::compile_sets;
pub use helpers::{HelperFn, Helpers};
pub use registry::Registry;
pub use unit::CompiledTemplate;

use crate::asset::AssetError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the macro every compiled unit must define and that rendering calls.
pub const ROOT_DEFINITION: &str = "ROOT";

// ============================================================================
// Sets and groups
// ============================================================================

/// Ordered fragment identifiers forming one logical page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateSet {
    fragments: Vec<String>,
}

impl TemplateSet {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
        }
    }

    /// Registry key: the first fragment identifier.
    pub fn key(&self) -> Option<&str> {
        self.fragments.first().map(String::as_str)
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Set fragments followed by the shared layout, in that order.
    pub fn with_layout(&self, layout: &[String]) -> Vec<String> {
        self.fragments.iter().chain(layout).cloned().collect()
    }
}

/// A family of sets sharing one layout (e.g. repository pages).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateGroup {
    pub name: String,

    #[serde(default)]
    pub sets: Vec<TemplateSet>,

    /// Fragments appended to every set in this group.
    #[serde(default)]
    pub layout: Vec<String>,
}

impl TemplateGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn set<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sets.push(TemplateSet::new(fragments));
        self
    }

    pub fn layout<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.layout = fragments.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Compilation failures. Every variant is fatal for a startup load.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("template set in group `{group}` has no fragments")]
    EmptySet { group: String },

    #[error("read template asset {fragment}")]
    Asset {
        fragment: String,
        #[source]
        source: AssetError,
    },

    #[error("template asset {fragment} is not valid UTF-8")]
    Encoding { fragment: String },

    #[error("template {set:?}: {}", describe_location(.fragment, .line))]
    Parse {
        set: Vec<String>,
        /// Fragment the error points into, when the template language reports a line.
        fragment: Option<String>,
        /// Line within `fragment`.
        line: Option<usize>,
        #[source]
        source: minijinja::Error,
    },

    #[error("ROOT template not found in {set:?}")]
    MissingRoot { set: Vec<String> },
}

fn describe_location(fragment: &Option<String>, line: &Option<usize>) -> String {
    match (fragment, line) {
        (Some(f), Some(l)) => format!("parse error in {f} line {l}"),
        (Some(f), None) => format!("parse error in {f}"),
        _ => "parse error".to_owned(),
    }
}
