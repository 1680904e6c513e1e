//! Content moderation: length limit plus a case-insensitive substring blocklist.

use parking_lot::RwLock;
use std::collections::HashSet;

/// Default maximum content length, in UTF-16 code units.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 108;

/// Whether `text` must be rejected.
///
/// Empty text is never invalid here; refusing to post nothing is the caller's
/// business. Length is measured in UTF-16 code units, so characters outside
/// the Basic Multilingual Plane (most emoji) count twice. Words match as
/// lower-cased substrings, not tokens.
pub fn is_invalid<S: AsRef<str>>(text: &str, wordlist: &[S], max_length: usize) -> bool {
    if text.is_empty() {
        return false;
    }
    if text.encode_utf16().count() > max_length {
        return true;
    }

    let lower = text.to_lowercase();
    wordlist
        .iter()
        .map(|word| word.as_ref().trim())
        .filter(|word| !word.is_empty())
        .any(|word| lower.contains(&word.to_lowercase()))
}

/// Validator over a default wordlist (loaded at startup) and a user wordlist
/// (editable at runtime).
pub struct ContentValidator {
    max_length: usize,
    default_words: RwLock<Vec<String>>,
    user_words: RwLock<Vec<String>>,
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENT_LENGTH)
    }
}

impl ContentValidator {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            default_words: RwLock::new(Vec::new()),
            user_words: RwLock::new(Vec::new()),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn set_default_words(&self, words: Vec<String>) {
        *self.default_words.write() = words;
    }

    pub fn set_user_words(&self, words: Vec<String>) {
        *self.user_words.write() = words;
    }

    /// Union of the default and user lists, first occurrence wins.
    pub fn wordlist(&self) -> Vec<String> {
        let default_words = self.default_words.read();
        let user_words = self.user_words.read();
        let mut seen = HashSet::new();
        default_words
            .iter()
            .chain(user_words.iter())
            .filter(|word| seen.insert(word.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_content_invalid(&self, text: &str) -> bool {
        is_invalid(text, &self.wordlist(), self.max_length)
    }
}
