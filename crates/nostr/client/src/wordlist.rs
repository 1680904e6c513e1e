//! Loading the default moderation wordlist (a JSON array of strings).

use crate::error::{ClientError, Result};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};
use url::Url;

/// Load a wordlist from an `http(s)://` URL or a local file path.
pub async fn load_wordlist(source: &str) -> Result<Vec<String>> {
    let words: Vec<String> = if source.starts_with("http://") || source.starts_with("https://") {
        fetch_wordlist(source).await?
    } else {
        let text = tokio::fs::read_to_string(source).await?;
        serde_json::from_str(&text)?
    };
    Ok(words
        .into_iter()
        .map(|word| word.trim().to_string())
        .filter(|word| !word.is_empty())
        .collect())
}

/// Load a wordlist, falling back to an empty list on any failure.
pub async fn load_wordlist_or_default(source: &str) -> Vec<String> {
    match load_wordlist(source).await {
        Ok(words) => {
            info!(source, count = words.len(), "loaded moderation wordlist");
            words
        }
        Err(error) => {
            warn!(source, %error, "failed to load moderation wordlist, using empty list");
            Vec::new()
        }
    }
}

async fn fetch_wordlist(source: &str) -> Result<Vec<String>> {
    let mut url = Url::parse(source)?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| ClientError::Internal(error.to_string()))?
        .as_millis();
    url.query_pairs_mut().append_pair("t", &stamp.to_string());

    let words = reqwest::get(url)
        .await?
        .error_for_status()?
        .json::<Vec<String>>()
        .await?;
    Ok(words)
}
