//! Relay and NG word lists persisted as one JSON document.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use nostr_client::normalize_relay_url;
use serde::{Deserialize, Serialize};

/// `None` means the list was never saved, which is different from saved empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relays: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ng_words: Option<Vec<String>>,
}

impl Settings {
    /// Saved relays, or `defaults` when none were ever saved.
    pub fn relays_or(&self, defaults: &[String]) -> Vec<String> {
        self.relays.clone().unwrap_or_else(|| defaults.to_vec())
    }

    /// Add a `wss://` relay. Returns `false` when it is already listed.
    pub fn add_relay(&mut self, defaults: &[String], url: &str) -> Result<bool> {
        let url = url.trim();
        let normalized = match normalize_relay_url(url) {
            Ok(normalized) if normalized.starts_with("wss://") => normalized,
            _ => bail!("enter a valid wss:// URL: {url}"),
        };

        let mut relays = self.relays_or(defaults);
        let exists = relays
            .iter()
            .any(|relay| normalize_relay_url(relay).is_ok_and(|known| known == normalized));
        if exists {
            return Ok(false);
        }
        relays.push(normalized);
        self.relays = Some(relays);
        Ok(true)
    }

    /// Remove a relay, matching by normalized URL.
    pub fn remove_relay(&mut self, defaults: &[String], url: &str) -> bool {
        let target = normalize_relay_url(url).unwrap_or_else(|_| url.trim().to_string());
        let mut relays = self.relays_or(defaults);
        let before = relays.len();
        relays.retain(|relay| {
            normalize_relay_url(relay).unwrap_or_else(|_| relay.clone()) != target
        });
        let removed = relays.len() != before;
        if removed {
            self.relays = Some(relays);
        }
        removed
    }

    pub fn user_words(&self) -> Vec<String> {
        self.user_ng_words.clone().unwrap_or_default()
    }

    /// Initialize the user list from `defaults` if it was never saved.
    pub fn seed_user_words(&mut self, defaults: &[String]) -> bool {
        if self.user_ng_words.is_some() {
            return false;
        }
        self.user_ng_words = Some(defaults.to_vec());
        true
    }

    /// Add a word to the user list. Blank and duplicate words are ignored.
    pub fn add_word(&mut self, word: &str) -> bool {
        let word = word.trim();
        if word.is_empty() {
            return false;
        }
        let words = self.user_ng_words.get_or_insert_with(Vec::new);
        if words.iter().any(|known| known == word) {
            return false;
        }
        words.push(word.to_string());
        true
    }

    pub fn remove_word(&mut self, word: &str) -> bool {
        let word = word.trim();
        let Some(words) = self.user_ng_words.as_mut() else {
            return false;
        };
        let before = words.len();
        words.retain(|known| known != word);
        words.len() != before
    }
}

/// File-backed [`Settings`].
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings file. A missing file yields empty settings.
    pub fn load(&self) -> Result<Settings> {
        if !self.path.exists() {
            return Ok(Settings::default());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("read settings {}", self.path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parse settings {}", self.path.display()))
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create settings dir {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, text)
            .with_context(|| format!("write settings {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> {
        vec!["wss://yabu.me".to_string(), "wss://r.kojira.io".to_string()]
    }

    #[test]
    fn missing_file_loads_defaults_and_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));

        let mut settings = store.load()?;
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.relays_or(&defaults()), defaults());

        assert!(settings.add_word("spam"));
        store.save(&settings)?;
        assert_eq!(store.load()?, settings);
        Ok(())
    }

    #[test]
    fn malformed_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, "{broken")?;
        assert!(SettingsStore::new(path).load().is_err());
        Ok(())
    }

    #[test]
    fn add_relay_requires_wss_and_skips_duplicates() -> Result<()> {
        let mut settings = Settings::default();
        assert!(settings.add_relay(&defaults(), "ws://insecure.test").is_err());
        assert!(settings.add_relay(&defaults(), "https://web.test").is_err());
        assert!(settings.add_relay(&defaults(), "not a url").is_err());
        assert_eq!(settings.relays, None);

        assert!(!settings.add_relay(&defaults(), "wss://yabu.me/")?);
        assert!(settings.add_relay(&defaults(), " wss://new.test ")?);
        assert_eq!(
            settings.relays,
            Some(vec![
                "wss://yabu.me".to_string(),
                "wss://r.kojira.io".to_string(),
                "wss://new.test".to_string(),
            ])
        );
        Ok(())
    }

    #[test]
    fn removing_every_relay_is_remembered() {
        let mut settings = Settings::default();
        assert!(settings.remove_relay(&defaults(), "wss://yabu.me"));
        assert!(settings.remove_relay(&defaults(), "wss://r.kojira.io/"));
        assert!(!settings.remove_relay(&defaults(), "wss://unknown.test"));
        assert_eq!(settings.relays_or(&defaults()), Vec::<String>::new());
    }

    #[test]
    fn user_words_are_seeded_once() {
        let mut settings = Settings::default();
        assert!(settings.seed_user_words(&["spam".to_string()]));
        assert!(!settings.seed_user_words(&["other".to_string()]));
        assert_eq!(settings.user_words(), vec!["spam".to_string()]);

        settings.user_ng_words = Some(Vec::new());
        assert!(!settings.seed_user_words(&["spam".to_string()]));
        assert!(settings.user_words().is_empty());
    }

    #[test]
    fn word_edits_trim_and_dedupe() {
        let mut settings = Settings::default();
        assert!(settings.add_word("  casino "));
        assert!(!settings.add_word("casino"));
        assert!(!settings.add_word("   "));
        assert!(!settings.remove_word("missing"));
        assert!(settings.remove_word("casino"));
        assert_eq!(settings.user_ng_words, Some(Vec::new()));
    }
}
