//! Errors raised while loading `vellum.toml`.

use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: `{}`", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read `{}`", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// TOML syntax, a wrong type or an unknown key. `path` is unset for
    /// configs parsed from a string.
    #[error("invalid config{}", origin(.path))]
    Parse {
        path: Option<PathBuf>,
        #[source]
        source: toml::de::Error,
    },

    /// A cross-section rule, e.g. a route naming an undeclared template.
    #[error("invalid setting: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Attach the file a string-parsed config came from.
    pub(super) fn at(self, file: &std::path::Path) -> Self {
        match self {
            Self::Parse { path: None, source } => Self::Parse {
                path: Some(file.to_path_buf()),
                source,
            },
            other => other,
        }
    }
}

fn origin(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" `{}`", p.display()))
        .unwrap_or_default()
}

impl From<toml::de::Error> for ConfigError {
    fn from(source: toml::de::Error) -> Self {
        Self::Parse { path: None, source }
    }
}
