#![allow(clippy::print_stdout)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};
use nostr::Event;
use nostr_client::{
    ClientConfig, ContentValidator, RelayStatus, TimelineClient, load_wordlist_or_default,
};
use tracing::{debug, info};

pub mod settings;

use settings::{Settings, SettingsStore};

#[derive(Parser)]
#[command(name = "nostr-timeline")]
#[command(about = "Multi-relay Nostr timeline")]
pub struct TimelineCli {
    /// Settings file holding the relay and NG word lists
    #[arg(long, global = true, default_value = "nostr-timeline.json")]
    pub settings: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream text notes from every relay until Ctrl-C
    Watch,
    /// Connect and show whether each relay is open
    Status(StatusArgs),
    /// Manage relays
    Relays {
        #[command(subcommand)]
        command: RelaysCommand,
    },
    /// Manage the user NG word list
    NgWords {
        #[command(subcommand)]
        command: NgWordsCommand,
    },
    /// Check text against the length limit and NG words
    Check { text: String },
}

#[derive(Args)]
pub struct StatusArgs {
    /// Seconds to wait for connections before reporting
    #[arg(long, default_value_t = 3)]
    pub wait_secs: u64,
}

#[derive(Subcommand)]
pub enum RelaysCommand {
    List,
    Add { url: String },
    Remove { url: String },
}

#[derive(Subcommand)]
pub enum NgWordsCommand {
    List,
    Add { word: String },
    Remove { word: String },
}

pub async fn run(cli: TimelineCli) -> Result<()> {
    let config = ClientConfig::from_env().context("load configuration from environment")?;
    let store = SettingsStore::new(cli.settings);
    debug!(settings = %store.path().display(), "using settings file");
    match cli.command {
        Commands::Watch => watch(config, &store).await,
        Commands::Status(args) => status(config, &store, args).await,
        Commands::Relays { command } => relays(&config, &store, command),
        Commands::NgWords { command } => ng_words(&config, &store, command).await,
        Commands::Check { text } => check(&config, &store, &text).await,
    }
}

async fn watch(config: ClientConfig, store: &SettingsStore) -> Result<()> {
    let mut settings = store.load()?;
    let client = TimelineClient::builder(config)
        .on_event(Arc::new(|event: Event| {
            println!("{}", format_event(&event));
            Ok(())
        }))
        .on_status(Arc::new(|status: RelayStatus| {
            info!(relay = %status.url, open = status.open, "relay status changed");
        }))
        .build();

    let default_words = client.load_default_wordlist().await;
    if settings.seed_user_words(&default_words) {
        store.save(&settings)?;
    }
    client.validator().set_user_words(settings.user_words());

    let relays = settings.relays_or(&client.config().relays);
    client.set_endpoints(relays.as_slice()).await;
    let subscription = client.start_default().await;
    info!(
        subscription = %subscription,
        relays = relays.len(),
        "watching timeline, Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await.context("wait for Ctrl-C")?;
    client.shutdown().await;
    Ok(())
}

async fn status(config: ClientConfig, store: &SettingsStore, args: StatusArgs) -> Result<()> {
    let settings = store.load()?;
    let relays = settings.relays_or(&config.relays);
    let client = TimelineClient::builder(config).build();

    client.set_endpoints(relays.as_slice()).await;
    tokio::time::sleep(Duration::from_secs(args.wait_secs)).await;
    for status in client.statuses().await {
        println!("{:<8} {}", if status.open { "open" } else { "closed" }, status.url);
    }
    client.shutdown().await;
    Ok(())
}

fn relays(config: &ClientConfig, store: &SettingsStore, command: RelaysCommand) -> Result<()> {
    let mut settings = store.load()?;
    match command {
        RelaysCommand::List => {}
        RelaysCommand::Add { url } => {
            if settings.add_relay(&config.relays, &url)? {
                store.save(&settings)?;
            } else {
                println!("already listed: {}", url.trim());
            }
        }
        RelaysCommand::Remove { url } => {
            if settings.remove_relay(&config.relays, &url) {
                store.save(&settings)?;
            } else {
                println!("not listed: {}", url.trim());
            }
        }
    }
    for relay in settings.relays_or(&config.relays) {
        println!("{relay}");
    }
    Ok(())
}

async fn ng_words(
    config: &ClientConfig,
    store: &SettingsStore,
    command: NgWordsCommand,
) -> Result<()> {
    let (mut settings, _) = load_seeded(config, store).await?;
    let changed = match command {
        NgWordsCommand::List => false,
        NgWordsCommand::Add { word } => settings.add_word(&word),
        NgWordsCommand::Remove { word } => settings.remove_word(&word),
    };
    if changed {
        store.save(&settings)?;
    }
    for word in settings.user_words() {
        println!("{word}");
    }
    Ok(())
}

async fn check(config: &ClientConfig, store: &SettingsStore, text: &str) -> Result<()> {
    let (settings, default_words) = load_seeded(config, store).await?;
    let validator = ContentValidator::new(config.max_content_length);
    validator.set_default_words(default_words);
    validator.set_user_words(settings.user_words());

    if validator.is_content_invalid(text) {
        println!("rejected");
    } else {
        println!("ok");
    }
    Ok(())
}

/// Load settings, seeding the user NG word list from the default list the
/// first time, and return them with the default list.
async fn load_seeded(
    config: &ClientConfig,
    store: &SettingsStore,
) -> Result<(Settings, Vec<String>)> {
    let mut settings = store.load()?;
    let default_words = match &config.wordlist_source {
        Some(source) => load_wordlist_or_default(source).await,
        None => Vec::new(),
    };
    if settings.seed_user_words(&default_words) {
        store.save(&settings)?;
    }
    Ok((settings, default_words))
}

/// One timeline line: local time, author prefix, content.
pub fn format_event(event: &Event) -> String {
    let time = i64::try_from(event.created_at)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|time| {
            time.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| "-".to_string());
    let author: String = event.pubkey.chars().take(8).collect();
    format!("{time}  {author}...  {}", event.content)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn cli_requires_subcommand() -> Result<()> {
        let Err(error) = TimelineCli::try_parse_from(["nostr-timeline"]) else {
            anyhow::bail!("expected missing subcommand parse error");
        };
        assert_eq!(
            error.kind(),
            ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
        Ok(())
    }

    #[test]
    fn cli_parses_nested_commands() -> Result<()> {
        let cli = TimelineCli::try_parse_from([
            "nostr-timeline",
            "--settings",
            "custom.json",
            "relays",
            "add",
            "wss://relay.test",
        ])?;
        assert_eq!(cli.settings, PathBuf::from("custom.json"));
        assert!(matches!(
            cli.command,
            Commands::Relays {
                command: RelaysCommand::Add { ref url }
            } if url == "wss://relay.test"
        ));

        let cli = TimelineCli::try_parse_from(["nostr-timeline", "status", "--wait-secs", "7"])?;
        assert!(matches!(cli.command, Commands::Status(StatusArgs { wait_secs: 7 })));
        assert_eq!(cli.settings, PathBuf::from("nostr-timeline.json"));
        Ok(())
    }

    #[test]
    fn format_event_shows_author_prefix_and_content() {
        let event = Event {
            id: "id".to_string(),
            pubkey: "0123456789abcdef".to_string(),
            created_at: 1_700_000_000,
            kind: nostr::KIND_TEXT_NOTE,
            tags: vec![],
            content: "おはよう".to_string(),
            sig: None,
        };
        let line = format_event(&event);
        assert!(line.contains("  01234567...  "));
        assert!(line.ends_with("おはよう"));
        assert!(!line.starts_with('-'));
    }
}
