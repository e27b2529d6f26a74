//! Vellum - compile page templates and serve them.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use vellum::{
    DirSource, Registry,
    cli::{Cli, Commands},
    config::AppConfig,
    log,
    logger::ProgressBars,
    serve::serve_site,
    template::Helpers,
};

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    let config: &'static AppConfig = Box::leak(Box::new(load_config(cli)?));
    let registry = Arc::new(load_templates(config)?);

    match &cli.command {
        Commands::Check => {
            for name in registry.names() {
                log!("compile"; "{name}");
            }
            Ok(())
        }
        Commands::Serve { .. } => serve_site(config, registry),
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let root = cli.root.clone().unwrap_or_else(|| "./".into());
    let config_path = root.join(&cli.config);

    let mut config = AppConfig::from_path(&config_path)?;
    config.update_with_cli(cli);
    config.validate()?;
    Ok(config)
}

/// Compile every declared group. Any failure aborts startup.
fn load_templates(config: &AppConfig) -> Result<Registry> {
    let registry = Registry::new(
        Arc::new(DirSource::new(&config.templates.root)),
        Helpers::new(),
        config.templates.groups.clone(),
    );

    let total = registry.declared_sets();
    let progress = ProgressBars::new_filtered(&[("compile", total)]);
    let result = registry.load_with_progress(|| {
        if let Some(progress) = &progress {
            progress.inc(0);
        }
    });
    if let Some(progress) = &progress {
        progress.finish();
    }
    result.context("Failed to compile templates")?;

    log!("compile"; "{} of {} template sets registered", registry.len(), total);
    Ok(registry)
}
