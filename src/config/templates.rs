//! `[templates]` section configuration.

use super::defaults;
use crate::template::TemplateGroup;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[templates]` section in vellum.toml: where fragments live and how they
/// are grouped into sets.
///
/// # Example
/// ```toml
/// [templates]
/// root = "templates"
///
/// [[templates.groups]]
/// name = "repo"
/// layout = ["repo/common.html", "common.html"]
/// sets = [["repo/main.html"], ["repo/commits.html", "repo/commit_row.html"]]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct TemplatesConfig {
    /// Directory fragment identifiers are resolved against (relative to root).
    #[serde(default = "defaults::templates::root")]
    #[educe(Default = defaults::templates::root())]
    pub root: PathBuf,

    #[serde(default)]
    pub groups: Vec<TemplateGroup>,
}

impl TemplatesConfig {
    /// Registry keys of every declared set, in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups
            .iter()
            .flat_map(|g| &g.sets)
            .filter_map(|set| set.key())
    }
}
