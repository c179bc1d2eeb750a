//! Transient operator-facing status line.

use serde::Serialize;

pub const MODEL_LOADING: &str = "AI Model is loading, please wait...";
pub const PROCESSING: &str = "Success! Processing records...";
pub const UPLOAD_FAILED: &str = "Upload failed. Check logs and server.";
pub const NO_NEW_RECORDS: &str = "No new attendance records added.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub text: String,
    pub tone: Tone,
}

/// Holds the current message. Each `set` bumps a generation so a delayed
/// clear only removes the message it was scheduled for.
#[derive(Debug, Default)]
pub struct StatusBoard {
    current: Option<StatusMessage>,
    generation: u64,
}

impl StatusBoard {
    pub fn set(&mut self, text: impl Into<String>, tone: Tone) -> u64 {
        let text = text.into();
        tracing::debug!(%text, ?tone, "status");
        self.current = Some(StatusMessage { text, tone });
        self.generation += 1;
        self.generation
    }

    /// Clear only if nothing newer has been posted since `generation`.
    pub fn clear_if_current(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.current.is_none() {
            return false;
        }
        self.current = None;
        true
    }

    /// Clear if the current message has exactly this text.
    pub fn clear_text(&mut self, text: &str) {
        if self.current.as_ref().is_some_and(|m| m.text == text) {
            self.current = None;
        }
    }

    pub fn current(&self) -> Option<&StatusMessage> {
        self.current.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

pub fn uploading(count: usize) -> String {
    format!("Uploading {count} images...")
}

pub fn marked_present(count: usize) -> String {
    format!("{count} student(s) marked present!")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_clear_ignored() {
        let mut board = StatusBoard::default();
        let first = board.set(uploading(2), Tone::Info);
        let second = board.set(NO_NEW_RECORDS, Tone::Success);
        assert!(!board.clear_if_current(first));
        assert_eq!(board.current().unwrap().text, NO_NEW_RECORDS);
        assert!(board.clear_if_current(second));
        assert!(board.current().is_none());
    }

    #[test]
    fn test_clear_text_only_matches_exact() {
        let mut board = StatusBoard::default();
        board.set(MODEL_LOADING, Tone::Info);
        board.clear_text(UPLOAD_FAILED);
        assert!(board.current().is_some());
        board.clear_text(MODEL_LOADING);
        assert!(board.current().is_none());
    }

    #[test]
    fn test_message_formats() {
        assert_eq!(uploading(3), "Uploading 3 images...");
        assert_eq!(marked_present(1), "1 student(s) marked present!");
    }
}
