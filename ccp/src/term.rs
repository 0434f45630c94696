//! Terminal progress reporter: renders the engine's progress events as an
//! animated bar on stderr and collects per-entry errors.

use std::sync::atomic::{AtomicU64, Ordering};

use common::progress::Progress;

pub struct TermProgress {
    bar: indicatif::ProgressBar,
    errors: AtomicU64,
}

impl TermProgress {
    pub fn new() -> Self {
        let bar = indicatif::ProgressBar::new(0);
        let style = indicatif::ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {wide_msg}",
        )
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("=> "));
        TermProgress {
            bar,
            errors: AtomicU64::new(0),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }
}

impl Default for TermProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for TermProgress {
    fn max(&self, total: u64) {
        self.bar.set_length(total);
    }

    fn progress(&self, n: u64) {
        self.bar.inc(n);
    }

    fn file_start(&self, src: &str, dst: &str) {
        self.bar.set_message(format!("{} -> {}", src, dst));
    }

    fn file_done(&self, _src: &str, err: Option<anyhow::Error>) {
        if let Some(err) = err {
            self.errors.fetch_add(1, Ordering::SeqCst);
            // Print through the bar so the line is not torn by a redraw.
            self.bar.suspend(|| eprintln!("ccp: {:#}", err));
        }
    }
}
