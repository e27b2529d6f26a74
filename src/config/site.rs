//! `[site]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[site]` section in vellum.toml: values copied into every page's common context.
///
/// # Example
/// ```toml
/// [site]
/// app_url = "https://src.example.com"
/// host_name = "web-1"
/// debug = false
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute base URL of the application. Falls back to the serve
    /// address when unset.
    #[serde(default)]
    pub app_url: Option<String>,

    /// Name of this host, shown on pages.
    #[serde(default = "defaults::site::host_name")]
    #[educe(Default = defaults::site::host_name())]
    pub host_name: String,

    /// Render debugging info on pages.
    #[serde(default = "defaults::r#false")]
    pub debug: bool,

    /// Hide links to external sites.
    #[serde(default = "defaults::r#false")]
    pub disable_external_links: bool,
}
