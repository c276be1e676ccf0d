//! Interactive submission history
//!
//! This module handles:
//! - The append-only log of accepted submissions
//! - Cursor navigation (previous/next) with stashing of the in-progress buffer
//! - Resetting to the live edge whenever anything is submitted

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A retained submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub code: String,
    pub language: Option<String>,
}

impl HistoryEntry {
    /// Create a new history entry
    pub fn new(code: impl Into<String>, language: Option<String>) -> Self {
        Self {
            code: code.into(),
            language,
        }
    }
}

/// Ordered history plus a browsing cursor.
///
/// `cursor == len()` is the live edge: nothing historical is being shown.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    cursor: usize,
    stashed: Option<String>,
}

/// History shared between the session loop and the line editor
pub type SharedHistory = Arc<Mutex<HistoryStore>>;

impl HistoryStore {
    /// Create a new, empty history store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared handle to a new store
    pub fn shared() -> SharedHistory {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Record a submission.
    ///
    /// Appends when `code` is non-empty and differs from the last entry.
    /// The cursor goes back to the live edge either way and any stash is
    /// discarded. Returns whether an entry was appended.
    pub fn try_append(&mut self, code: &str, language: Option<&str>) -> bool {
        let appended = !code.is_empty()
            && self
                .entries
                .last()
                .map_or(true, |last| last.code != code);

        if appended {
            self.entries
                .push(HistoryEntry::new(code, language.map(str::to_string)));
        }

        self.cursor = self.entries.len();
        self.stashed = None;
        appended
    }

    /// Step back one entry.
    ///
    /// Leaving the live edge stashes `current_buffer`. Returns `None` at the
    /// oldest entry or when history is empty.
    pub fn move_previous(&mut self, current_buffer: &str) -> Option<String> {
        if self.cursor == 0 {
            return None;
        }

        if self.is_at_live_edge() {
            self.stashed = Some(current_buffer.to_string());
        }

        self.cursor -= 1;
        Some(self.entries[self.cursor].code.clone())
    }

    /// Step forward one entry.
    ///
    /// Reaching the live edge hands back (and clears) the stashed buffer.
    /// Returns `None` when already at the live edge.
    pub fn move_next(&mut self) -> Option<String> {
        if self.is_at_live_edge() {
            return None;
        }

        self.cursor += 1;
        if self.is_at_live_edge() {
            Some(self.stashed.take().unwrap_or_default())
        } else {
            Some(self.entries[self.cursor].code.clone())
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_at_live_edge(&self) -> bool {
        self.cursor == self.entries.len()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
