//! `[serve]` section configuration.
//!
//! Contains the HTTP host settings and its routing table.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `[serve]` section in vellum.toml.
///
/// # Example
/// ```toml
/// [serve]
/// interface = "0.0.0.0"
/// port = 3000
/// watch = true                          # Reload templates on change
/// error_template = "error/error.html"
///
/// [[serve.routes]]
/// path = "/repos/:name"
/// name = "repo"
/// template = "repo/main.html"
/// data = { title = "Repository" }
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces
    #[serde(default = "defaults::serve::interface")]
    #[educe(Default = defaults::serve::interface())]
    pub interface: String,

    /// HTTP port number (default: 5277).
    #[serde(default = "defaults::serve::port")]
    #[educe(Default = defaults::serve::port())]
    pub port: u16,

    /// Recompile templates when files under the template root change.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub watch: bool,

    /// Template rendered for failed requests. Plain text is sent when unset.
    #[serde(default)]
    pub error_template: Option<String>,

    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// One `[[serve.routes]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Path pattern; `:var` segments capture route variables.
    pub path: String,

    /// Route name exposed as `current_route`.
    pub name: String,

    /// Registry key of the template to render.
    pub template: String,

    /// Static values merged into the page data.
    #[serde(default)]
    pub data: BTreeMap<String, toml::Value>,
}
