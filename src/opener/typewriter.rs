//! Boot-text typewriter and caret blink.
//!
//! The typewriter runs on its own timer and is not coupled to the opener
//! phase; it may still be typing when the opener completes.

use std::time::Duration;

pub const BOOT_LINES: &[&str] = &[
    "> INITIALIZING KAT...",
    "> CONNECTING TO KALSHI API...",
    "> LOADING FINBERT MODEL...",
    "> SCANNING 30+ RSS FEEDS...",
    "> EMBEDDING MARKET INDEX...",
    "> SYSTEM READY.",
];

pub const START_DELAY: Duration = Duration::from_millis(500);
pub const FIRST_CHAR_DELAY: Duration = Duration::from_millis(200);
pub const CHAR_DELAY: Duration = Duration::from_millis(38);
pub const LINE_PAUSE: Duration = Duration::from_millis(320);
pub const CARET_BLINK: Duration = Duration::from_millis(530);

/// Types `lines` one at a time; each line replaces the previous one.
#[derive(Debug, Clone)]
pub struct Typewriter {
    lines: &'static [&'static str],
    line_idx: usize,
    char_idx: usize,
    text: String,
}

impl Default for Typewriter {
    fn default() -> Self {
        Self::new(BOOT_LINES)
    }
}

impl Typewriter {
    pub fn new(lines: &'static [&'static str]) -> Self {
        Self {
            lines,
            line_idx: 0,
            char_idx: 0,
            text: String::new(),
        }
    }

    /// Text currently on screen.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_finished(&self) -> bool {
        self.line_idx >= self.lines.len()
    }

    /// Perform one typing step and return the delay before the next one,
    /// or `None` once every line has been typed.
    pub fn step(&mut self) -> Option<Duration> {
        let line = self.lines.get(self.line_idx)?;
        let len = line.chars().count();
        if self.char_idx <= len {
            self.text = line.chars().take(self.char_idx).collect();
            self.char_idx += 1;
            Some(if self.char_idx == 1 {
                FIRST_CHAR_DELAY
            } else {
                CHAR_DELAY
            })
        } else {
            self.line_idx += 1;
            self.char_idx = 0;
            Some(LINE_PAUSE)
        }
    }
}
