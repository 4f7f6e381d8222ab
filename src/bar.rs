//! Data collected for the debug toolbar during one request.

use core::time::Duration;
use std::time::Instant;

use crate::dedup::{DedupCounter, DedupKey};

/// One value dumped to the toolbar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BarDump {
    /// Optional heading.
    pub title: Option<String>,
    /// The rendered dump.
    pub html: String,
}

/// The toolbar's panels: warnings seen (with occurrence counts), dumped
/// values, and the time elapsed since the debugger was enabled.
#[derive(Clone, Debug, Default)]
pub struct DebugBar {
    errors: DedupCounter,
    dumps: Vec<BarDump>,
    started: Option<Instant>,
}

impl DebugBar {
    /// Starts the clock of the info panel.
    pub fn start(&mut self, at: Instant) {
        self.started = Some(at);
    }

    /// Time since [`start`](Self::start), if the clock runs.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started.map(|started| started.elapsed())
    }

    /// Records a warning; returns whether it is the first of its kind.
    pub fn record_error(&mut self, key: &DedupKey) -> bool {
        self.errors.should_act(key)
    }

    /// The errors panel.
    pub fn errors(&self) -> &DedupCounter {
        &self.errors
    }

    /// Total number of warnings seen, repeats included.
    pub fn error_total(&self) -> u64 {
        self.errors.iter().map(|(_, count)| count).sum()
    }

    /// Adds a dump to the dumps panel.
    pub fn add_dump(&mut self, title: Option<String>, html: String) {
        self.dumps.push(BarDump { title, html });
    }

    /// The dumps panel.
    pub fn dumps(&self) -> &[BarDump] {
        &self.dumps
    }

    /// Clears both panels and restarts a running clock.
    pub fn reset(&mut self) {
        self.errors.reset();
        self.dumps.clear();
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_starts_and_survives_reset() {
        let mut bar = DebugBar::default();
        assert_eq!(bar.elapsed(), None);

        bar.start(Instant::now() - Duration::from_secs(5));
        assert!(bar.elapsed().is_some_and(|elapsed| elapsed >= Duration::from_secs(5)));

        bar.add_dump(None, String::from("<pre>1</pre>"));
        bar.reset();
        assert!(bar.dumps().is_empty());
        assert!(bar.elapsed().is_some_and(|elapsed| elapsed < Duration::from_secs(5)));
    }
}
