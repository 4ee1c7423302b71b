//! Progress Tracker for the translation pipeline
//!
//! Shows phase messages and a per-segment progress bar on stderr. Purely
//! observational: nothing here feeds back into control flow.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};

/// Tracks and displays progress while a document is translated
pub struct ProgressTracker {
    /// Bar for the segment currently being translated
    bar: Option<ProgressBar>,
    /// Number of segments completed
    processed_segments: usize,
    /// Current phase name
    current_phase: Option<String>,
    /// Whether to show output (false for tests/quiet mode)
    show_output: bool,
}

impl ProgressTracker {
    /// Create a new progress tracker
    pub fn new() -> Self {
        Self {
            bar: None,
            processed_segments: 0,
            current_phase: None,
            show_output: true,
        }
    }

    /// Create a quiet progress tracker (no output)
    pub fn quiet() -> Self {
        Self {
            show_output: false,
            ..Self::new()
        }
    }

    /// Whether anything is printed
    pub fn is_visible(&self) -> bool {
        self.show_output
    }

    /// Start a new phase of processing
    pub fn start_phase(&mut self, phase: &str) {
        self.current_phase = Some(phase.to_string());
        if self.show_output {
            eprint!("  {}... ", phase);
            let _ = io::stderr().flush();
        }
    }

    /// Finish the current phase
    pub fn finish_phase(&mut self) {
        if self.show_output && self.current_phase.is_some() {
            eprintln!("done");
        }
        self.current_phase = None;
    }

    /// Begin the per-segment bar for `total` segments
    pub fn start_segments(&mut self, total: usize) {
        self.processed_segments = 0;
        let bar = if self.show_output {
            let bar = ProgressBar::new(total as u64);
            let style = ProgressStyle::with_template(
                "  Translating [{bar:30.cyan/blue}] {pos}/{len} segments ({elapsed})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
            bar.set_style(style);
            bar
        } else {
            ProgressBar::hidden()
        };
        self.bar = Some(bar);
    }

    /// Mark one segment as translated
    pub fn segment_done(&mut self) {
        self.processed_segments += 1;
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    /// Close the per-segment bar
    pub fn finish_segments(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish();
        }
    }

    /// Drop the bar without completing it
    pub fn abandon_segments(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }

    /// Get the number of translated segments
    pub fn segments_processed(&self) -> usize {
        self.processed_segments
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
