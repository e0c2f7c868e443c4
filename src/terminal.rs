//! Terminal concerns: tracing setup and the search progress bar.

use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};
use magneto_core::Progress;

/// Default level for the verbosity flags.
///
/// Priority: `RUST_LOG` > `--quiet` > `-v` count > `warn`.
pub(crate) fn default_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

pub(crate) fn init_tracing(verbose: u8, quiet: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level(verbose, quiet)));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color_env_requested())
        .with_env_filter(filter)
        .try_init();
}

fn no_color_env_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_show_progress(stderr_is_terminal: bool, quiet: bool, dumb_terminal: bool) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// Per-source progress bar; hidden when stderr is not an interactive terminal.
pub(crate) struct SearchProgress {
    bar: ProgressBar,
}

impl SearchProgress {
    pub(crate) fn new(quiet: bool) -> Self {
        let visible = should_show_progress(std::io::stderr().is_terminal(), quiet, is_dumb_terminal());
        let bar = if visible {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} sources {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    pub(crate) fn update(&self, progress: Progress<'_>) {
        self.bar.set_length(u64::try_from(progress.total).unwrap_or(u64::MAX));
        self.bar.set_position(u64::try_from(progress.completed).unwrap_or(u64::MAX));
        self.bar.set_message(format!(
            "{} ({} records)",
            progress.source_name, progress.records
        ));
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ladder() {
        assert_eq!(default_level(0, false), "warn");
        assert_eq!(default_level(1, false), "info");
        assert_eq!(default_level(2, false), "debug");
        assert_eq!(default_level(5, false), "trace");
        assert_eq!(default_level(3, true), "error");
    }

    #[test]
    fn test_progress_visibility() {
        assert!(should_show_progress(true, false, false));
        assert!(!should_show_progress(false, false, false));
        assert!(!should_show_progress(true, true, false));
        assert!(!should_show_progress(true, false, true));
    }

    #[test]
    fn test_hidden_progress_accepts_updates() {
        let progress = SearchProgress::new(true);
        progress.update(Progress {
            completed: 1,
            total: 2,
            source_name: "YTS",
            records: 4,
        });
        progress.finish();
    }
}
