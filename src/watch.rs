//! Template hot reload.
//!
//! Watches the template root and recompiles every declared group through
//! [`Registry::load`] once a burst of changes settles.
//!
//! ```text
//! notify events ──► Debouncer (300ms) ──► reload() ──► Registry::load
//!                                            │
//!                                            └── failure: log, keep serving old units
//! ```

use crate::{
    log,
    logger::WatchStatus,
    template::Registry,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{RecvTimeoutError, channel},
    time::{Duration, Instant},
};

const DEBOUNCE_MS: u64 = 300;
const RELOAD_COOLDOWN_MS: u64 = 800;

// =============================================================================
// Path Utilities
// =============================================================================

/// Editor swap and backup files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// `/proj/templates/page/home.html` → `page/home.html`
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events and enforces a cooldown after each reload.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_reload: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
            last_reload: None,
        }
    }

    fn in_cooldown(&self) -> bool {
        self.last_reload
            .is_some_and(|t| t.elapsed() < Duration::from_millis(RELOAD_COOLDOWN_MS))
    }

    fn add(&mut self, event: Event) {
        self.pending
            .extend(event.paths.into_iter().filter(|p| !is_temp_file(p)));
        self.last_event = Some(Instant::now());
    }

    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn mark_reload(&mut self) {
        self.last_reload = Some(Instant::now());
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_secs(60)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Reload
// =============================================================================

/// Recompile every declared group. Returns whether all of them compiled.
///
/// On failure the units compiled before the error are already replaced;
/// every other entry keeps its previous unit.
fn reload(registry: &Registry, changed: &[PathBuf], root: &Path, status: &mut WatchStatus) -> bool {
    let trigger = changed
        .iter()
        .map(|p| rel_path(p, root))
        .collect::<Vec<_>>()
        .join(", ");

    match registry.load() {
        Ok(()) => {
            status.success(&format!("reloaded {} templates ({trigger})", registry.declared_sets()));
            true
        }
        Err(err) => {
            status.error(&format!("reload failed ({trigger})"), &format!("{err:#}"));
            false
        }
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Block the current thread, reloading `registry` whenever files under `root` change.
pub fn watch_templates_blocking(root: &Path, registry: &Registry) -> Result<()> {
    let (tx, rx) = channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch templates: {}", root.display()))?;
    log!("watch"; "{}/", root.display());

    let mut debouncer = Debouncer::new();
    let mut status = WatchStatus::new();

    loop {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) && !debouncer.in_cooldown() => {
                debouncer.add(event);
            }
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                if reload(registry, &debouncer.take(), root, &mut status) {
                    debouncer.mark_reload();
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
            _ => {}
        }
    }

    Ok(())
}
