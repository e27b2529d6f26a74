//! Terminal output: prefixed log lines, compile progress and reload status.
//!
//! ```ignore
//! log!("compile"; "{} template sets", count);
//!
//! let progress = ProgressBars::new(&[("pages", 12), ("emails", 3)]);
//! progress.inc(0);
//! progress.finish();
//! ```

use colored::{ColoredString, Colorize};
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType, size},
};
use parking_lot::Mutex;
use std::{
    io::{Write, stdout},
    sync::{
        OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

static TERMINAL_WIDTH: OnceLock<u16> = OnceLock::new();

/// Rows currently reserved by live progress bars. `log` prints above them.
static LIVE_BARS: AtomicUsize = AtomicUsize::new(0);

// ============================================================================
// Layout
// ============================================================================
//
// "[pages] [████░░░░] 7/12"
//  ^-----^ ^-------^ ^--^
//  prefix  bar       count

/// `[` + `]` + trailing space around a module name.
const PREFIX_OVERHEAD: usize = 3;
/// ` []` around the bar itself.
const BAR_OVERHEAD: usize = 3;
const MIN_BAR_WIDTH: usize = 10;
const MAX_BAR_WIDTH: usize = 40;

#[inline]
const fn prefix_len(module: &str) -> usize {
    module.len() + PREFIX_OVERHEAD
}

fn terminal_width() -> usize {
    *TERMINAL_WIDTH.get_or_init(|| size().map_or(120, |(w, _)| w)) as usize
}

/// Width of the bar for a line whose prefix and counter take `overhead` columns.
fn bar_width(columns: usize, overhead: usize) -> usize {
    columns.saturating_sub(overhead).clamp(MIN_BAR_WIDTH, MAX_BAR_WIDTH)
}

// ============================================================================
// Log Macro
// ============================================================================

/// Print a message under a colored module prefix.
///
/// ```ignore
/// log!("serve"; "listening on http://{}", addr);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Backing function of [`log!`]. Single-line messages are cut to the
/// terminal width; multi-line ones are printed whole.
#[allow(clippy::cast_possible_truncation)]
pub fn log(module: &str, message: &str) {
    let prefix = colorize_prefix(module);
    let mut out = stdout().lock();

    let bars = LIVE_BARS.load(Ordering::SeqCst);
    if bars > 0 {
        execute!(out, cursor::MoveUp(bars as u16), Clear(ClearType::FromCursorDown)).ok();
    } else {
        execute!(out, Clear(ClearType::UntilNewLine)).ok();
    }

    let message = if message.contains('\n') {
        message
    } else {
        truncate_str(message, terminal_width().saturating_sub(prefix_len(module)))
    };
    writeln!(out, "{prefix} {message}").ok();

    for _ in 0..bars {
        writeln!(out).ok();
    }
    out.flush().ok();
}

fn colorize_prefix(module: &str) -> ColoredString {
    let prefix = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "serve" => prefix.bright_blue().bold(),
        "watch" => prefix.bright_green().bold(),
        "event" => prefix.bright_cyan().bold(),
        "error" => prefix.bright_red().bold(),
        _ => prefix.bright_yellow().bold(),
    }
}

/// Longest prefix of `s` within `max_len` bytes that ends on a char boundary.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================================
// Progress Bars
// ============================================================================

/// One progress bar per template group, each on its own terminal row.
///
/// `inc` may be called from any rayon worker; drawing is serialized.
pub struct ProgressBars {
    bars: Vec<Bar>,
    draw: Mutex<()>,
}

struct Bar {
    prefix: ColoredString,
    prefix_len: usize,
    total: usize,
    done: AtomicUsize,
}

impl ProgressBars {
    /// Reserve one row per `(name, total)` entry.
    pub fn new(groups: &[(&str, usize)]) -> Self {
        let mut out = stdout().lock();
        for _ in groups {
            writeln!(out).ok();
        }
        out.flush().ok();
        LIVE_BARS.store(groups.len(), Ordering::SeqCst);

        let bars = groups
            .iter()
            .map(|&(name, total)| Bar {
                prefix: colorize_prefix(name),
                prefix_len: prefix_len(name),
                total,
                done: AtomicUsize::new(0),
            })
            .collect();

        Self {
            bars,
            draw: Mutex::new(()),
        }
    }

    /// Like [`new`](Self::new) but skips empty groups, and returns `None`
    /// when there is at most one item overall.
    pub fn new_filtered(groups: &[(&str, usize)]) -> Option<Self> {
        let kept: Vec<_> = groups.iter().copied().filter(|&(_, n)| n > 0).collect();
        let total: usize = kept.iter().map(|&(_, n)| n).sum();
        (total > 1).then(|| Self::new(&kept))
    }

    /// Advance bar `index` by one.
    pub fn inc(&self, index: usize) {
        if let Some(bar) = self.bars.get(index) {
            let done = bar.done.fetch_add(1, Ordering::Relaxed) + 1;
            self.draw(index, bar, done);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw(&self, row: usize, bar: &Bar, done: usize) {
        let _guard = self.draw.lock();

        let count = format!("{done}/{}", bar.total);
        let width = bar_width(terminal_width(), bar.prefix_len + BAR_OVERHEAD + count.len());
        let filled = (done * width).checked_div(bar.total).unwrap_or(0).min(width);
        let gauge = "█".repeat(filled) + &"░".repeat(width - filled);

        let up = (self.bars.len() - row) as u16;
        let mut out = stdout().lock();
        execute!(out, cursor::MoveUp(up), Clear(ClearType::CurrentLine)).ok();
        write!(out, "{} [{gauge}] {count}", bar.prefix).ok();
        execute!(out, cursor::MoveDown(up)).ok();
        write!(out, "\r").ok();
        out.flush().ok();
    }

    /// Erase the bars and release their rows.
    #[allow(clippy::cast_possible_truncation)]
    pub fn finish(&self) {
        if LIVE_BARS.swap(0, Ordering::SeqCst) == 0 {
            return;
        }
        let _guard = self.draw.lock();

        let rows = self.bars.len() as u16;
        let mut out = stdout().lock();
        execute!(out, cursor::MoveUp(rows), Clear(ClearType::FromCursorDown)).ok();
        out.flush().ok();
    }
}

impl Drop for ProgressBars {
    fn drop(&mut self) {
        self.finish();
    }
}

// ============================================================================
// Reload Status
// ============================================================================

/// `HH:MM:SS` (UTC) for status lines.
fn clock() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    format!("{:02}:{:02}:{:02}", secs / 3600 % 24, secs / 60 % 60, secs % 60)
}

/// Rows a status message occupies.
fn rows(message: &str) -> usize {
    message.lines().count().max(1)
}

/// Status block for hot reloads; each message replaces the previous one.
#[derive(Debug, Default)]
pub struct WatchStatus {
    shown: usize,
}

impl WatchStatus {
    pub const fn new() -> Self {
        Self { shown: 0 }
    }

    pub fn success(&mut self, message: &str) {
        self.show(&"✓".green().to_string(), message);
    }

    pub fn error(&mut self, summary: &str, detail: &str) {
        let message = if detail.is_empty() {
            summary.to_owned()
        } else {
            format!("{summary}\n{detail}")
        };
        self.show(&"✗".red().to_string(), &message);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn show(&mut self, symbol: &str, message: &str) {
        let mut out = stdout().lock();
        if self.shown > 0 {
            execute!(out, cursor::MoveUp(self.shown as u16), Clear(ClearType::FromCursorDown)).ok();
        }
        writeln!(out, "{} {symbol} {message}", format!("[{}]", clock()).dimmed()).ok();
        out.flush().ok();
        self.shown = rows(message);
    }
}
