//! Application configuration for `vellum.toml`.
//!
//! # Sections
//!
//! | Section       | Purpose                                          |
//! |---------------|--------------------------------------------------|
//! | `[site]`      | Values copied into every page's common context   |
//! | `[templates]` | Template root and the groups of sets to compile  |
//! | `[serve]`     | HTTP host (port, interface, watch, routes)       |
//! | `[features]`  | Feature flags exposed to templates               |
//!
//! # Example
//!
//! ```toml
//! [site]
//! app_url = "https://src.example.com"
//!
//! [[templates.groups]]
//! name = "pages"
//! layout = ["layout/footer.html"]
//! sets = [["page/home.html"]]
//!
//! [[serve.routes]]
//! path = "/"
//! name = "home"
//! template = "page/home.html"
//!
//! [features]
//! search = true
//! ```

pub mod defaults;
mod error;
mod serve;
mod site;
mod templates;

pub use error::ConfigError;
pub use serve::{RouteConfig, ServeConfig};
pub use site::SiteConfig;
pub use templates::TemplatesConfig;

use crate::cli::{Cli, Commands};
use educe::Educe;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use url::Url;

/// Root configuration structure representing vellum.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub serve: ServeConfig,

    #[serde(default)]
    pub features: BTreeMap<String, bool>,
}

impl AppConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content).map_err(|err| err.at(path))
    }

    /// Resolve the template root against the project root and apply CLI overrides.
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = Self::normalize_path(cli.root.as_deref().unwrap_or(Path::new("./")));
        Self::update_option(&mut self.templates.root, cli.templates.as_ref());
        self.templates.root = Self::normalize_path(&root.join(&self.templates.root));

        if let Commands::Serve {
            interface,
            port,
            watch,
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.watch, watch.as_ref());
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Application base URL: `[site.app_url]`, or the serve address.
    pub fn app_url(&self) -> Result<Url, ConfigError> {
        let raw = match &self.site.app_url {
            Some(url) => url.clone(),
            None => format!("http://{}:{}/", self.serve.interface, self.serve.port),
        };
        let url = Url::parse(&raw).map_err(|err| {
            ConfigError::Validation(format!("[site.app_url] `{raw}` is not a valid URL: {err}"))
        })?;
        if url.cannot_be_a_base() || !url.has_host() {
            return Err(ConfigError::Validation(format!(
                "[site.app_url] `{raw}` must be an absolute http(s) URL"
            )));
        }
        Ok(url)
    }

    /// Check cross-field constraints the TOML schema cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.app_url()?;

        for group in &self.templates.groups {
            if group.sets.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "[templates.groups] `{}` declares no sets",
                    group.name
                )));
            }
            if group.sets.iter().any(|set| set.key().is_none()) {
                return Err(ConfigError::Validation(format!(
                    "[templates.groups] `{}` has an empty set",
                    group.name
                )));
            }
        }

        let mut keys = FxHashSet::default();
        if let Some(key) = self.templates.keys().find(|&key| !keys.insert(key)) {
            return Err(ConfigError::Validation(format!(
                "[templates.groups] template `{key}` is declared more than once"
            )));
        }

        let mut paths = FxHashSet::default();
        for route in &self.serve.routes {
            if !route.path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "[serve.routes] path `{}` must start with `/`",
                    route.path
                )));
            }
            if !paths.insert(route.path.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "[serve.routes] path `{}` is declared more than once",
                    route.path
                )));
            }
            if !keys.contains(route.template.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "[serve.routes] `{}` renders undeclared template `{}`",
                    route.name, route.template
                )));
            }
        }

        if let Some(name) = &self.serve.error_template
            && !keys.contains(name.as_str())
        {
            return Err(ConfigError::Validation(format!(
                "[serve.error_template] `{name}` is not a declared template"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const FULL: &str = r#"
        [site]
        app_url = "https://src.example.com"
        host_name = "web-1"

        [templates]
        root = "tmpl"

        [[templates.groups]]
        name = "pages"
        layout = ["layout/footer.html"]
        sets = [["page/home.html"], ["page/repo.html", "page/repo_row.html"]]

        [[templates.groups]]
        name = "errors"
        sets = [["error/error.html"]]

        [serve]
        port = 3000
        error_template = "error/error.html"

        [[serve.routes]]
        path = "/"
        name = "home"
        template = "page/home.html"

        [[serve.routes]]
        path = "/repos/:name"
        name = "repo"
        template = "page/repo.html"

        [features]
        search = true
    "#;

    fn full() -> AppConfig {
        AppConfig::from_str(FULL).unwrap()
    }

    fn validation_message(config: &AppConfig) -> String {
        match config.validate() {
            Err(ConfigError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_full_config() {
        let config = full();
        assert_eq!(config.site.host_name, "web-1");
        assert_eq!(config.templates.groups.len(), 2);
        assert_eq!(config.serve.routes.len(), 2);
        assert_eq!(config.features.get("search"), Some(&true));
        config.validate().unwrap();
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result = AppConfig::from_str("[site\napp_url = 1");
        assert!(matches!(result, Err(ConfigError::Parse { path: None, .. })));
    }

    #[test]
    fn test_unknown_top_level_field_rejection() {
        let result = AppConfig::from_str("[extra]\nfield = \"value\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vellum.toml");
        fs::write(&path, FULL).unwrap();

        let config = AppConfig::from_path(&path).unwrap();
        assert_eq!(config.serve.port, 3000);

        let missing = AppConfig::from_path(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::NotFound(_))));

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[serve]\nport = \"x\"\n").unwrap();
        match AppConfig::from_path(&broken) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path.as_deref(), Some(broken.as_path())),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_app_url_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.app_url().unwrap().as_str(), "http://127.0.0.1:5277/");
    }

    #[test]
    fn test_app_url_must_be_absolute() {
        let mut config = full();
        config.site.app_url = Some("/relative".into());
        assert!(validation_message(&config).contains("app_url"));

        config.site.app_url = Some("mailto:someone@example.com".into());
        assert!(validation_message(&config).contains("app_url"));
    }

    #[test]
    fn test_duplicate_set_key() {
        let mut config = full();
        config.templates.groups[1]
            .sets
            .push(crate::template::TemplateSet::new(["page/home.html"]));
        assert!(validation_message(&config).contains("more than once"));
    }

    #[test]
    fn test_empty_set() {
        let mut config = full();
        config.templates.groups[1]
            .sets
            .push(crate::template::TemplateSet::new(Vec::<String>::new()));
        assert!(validation_message(&config).contains("empty set"));
    }

    #[test]
    fn test_route_template_must_be_declared() {
        let mut config = full();
        config.serve.routes[0].template = "page/missing.html".into();
        assert!(validation_message(&config).contains("undeclared"));
    }

    #[test]
    fn test_route_path_must_be_absolute() {
        let mut config = full();
        config.serve.routes[0].path = "home".into();
        assert!(validation_message(&config).contains("must start with"));
    }

    #[test]
    fn test_error_template_must_be_declared() {
        let mut config = full();
        config.serve.error_template = Some("error/404.html".into());
        assert!(validation_message(&config).contains("error_template"));
    }

    #[test]
    fn test_update_with_cli() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["vellum", "--root", root, "serve", "-p", "9000", "-w", "false"])
            .unwrap();

        let mut config = full();
        config.update_with_cli(&cli);

        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.templates.root, root.join("tmpl"));
        assert_eq!(config.serve.port, 9000);
        assert!(!config.serve.watch);
        // Not overridden.
        assert_eq!(config.serve.interface, "127.0.0.1");
    }

    #[test]
    fn test_update_with_cli_templates_override() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["vellum", "-r", root, "-t", "other", "check"]).unwrap();

        let mut config = full();
        config.update_with_cli(&cli);
        assert!(config.templates.root.ends_with("other"));
        assert_eq!(config.serve.port, 3000);
    }
}
