use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;
use tracing::warn;

use crate::stream::StreamObserver;

const TICK_INTERVAL: Duration = Duration::from_millis(80);
const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Waiting,
    Streaming,
}

impl Phase {
    fn template(&self) -> &'static str {
        match self {
            Self::Waiting => "{spinner:.red.bold} {msg}",
            Self::Streaming => "{spinner:.yellow.bold} {msg}",
        }
    }
}

/// Transient spinner on stderr shown until the response is complete.
///
/// Nothing is drawn when stderr is not a terminal. The line is cleared on
/// [`StatusIndicator::clear`] and again on drop, so an early return or an
/// interrupt never leaves it behind.
#[derive(Debug)]
pub struct StatusIndicator {
    bar: Option<ProgressBar>,
    phase: Phase,
    received_chars: usize,
}

impl StatusIndicator {
    pub fn start() -> Self {
        if !std::io::stderr().is_terminal() {
            return Self::hidden();
        }
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        let mut indicator = Self {
            bar: Some(bar),
            phase: Phase::Waiting,
            received_chars: 0,
        };
        indicator.apply_phase();
        if let Some(bar) = &indicator.bar {
            bar.enable_steady_tick(TICK_INTERVAL);
        }
        indicator
    }

    pub fn hidden() -> Self {
        Self {
            bar: None,
            phase: Phase::Waiting,
            received_chars: 0,
        }
    }

    pub fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn apply_phase(&mut self) {
        let Some(bar) = &self.bar else {
            return;
        };
        if let Ok(style) = ProgressStyle::with_template(self.phase.template()) {
            bar.set_style(style.tick_chars(TICK_CHARS));
        }
        bar.set_message(self.message());
    }

    fn message(&self) -> String {
        match self.phase {
            Phase::Waiting => "Thinking...".to_string(),
            Phase::Streaming => format!("Receiving answer ({} chars)", self.received_chars),
        }
    }
}

impl StreamObserver for StatusIndicator {
    fn on_connected(&mut self) {
        self.phase = Phase::Streaming;
        self.apply_phase();
    }

    fn on_delta(&mut self, delta: &str) {
        self.received_chars += delta.chars().count();
        if let Some(bar) = &self.bar {
            bar.set_message(self.message());
        }
    }

    fn on_malformed(&mut self, payload: &str, reason: &str) {
        self.suspend(&mut || {
            warn!(payload = %payload, reason = %reason, "skipping malformed stream frame")
        });
        let notice = format!("[Warning: skipped malformed stream frame: {reason}]");
        match &self.bar {
            Some(bar) => bar.println(notice),
            None => eprintln!("{notice}"),
        }
    }

    fn suspend(&mut self, emit: &mut dyn FnMut()) {
        match &self.bar {
            Some(bar) => bar.suspend(emit),
            None => emit(),
        }
    }
}

impl Drop for StatusIndicator {
    fn drop(&mut self) {
        self.clear();
    }
}
