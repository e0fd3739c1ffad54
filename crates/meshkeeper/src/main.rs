//! `meshkeep` - CLI for meshkeeper
//!
//! This binary tests and manages message filter words, switches between
//! per-radio node databases and stores incoming messages.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;

use meshkeeper::cli::{
    Cli, Command, ConfigCommand, DbCommand, FilterCommand, IngestCommand, SendCommand,
};
use meshkeeper::filter::{FilterOutcome, FilterPattern};
use meshkeeper::storage::LOCAL_SENDER;
use meshkeeper::{homoglyph, init_logging, Config, DatabaseManager, MessageFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config_path = cli.config.clone().unwrap_or_else(Config::default_config_path);

    // Validation reports problems instead of failing on them.
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        handle_validate(file.clone().unwrap_or(config_path));
        return Ok(());
    }

    let config = Config::load_from(Some(config_path.clone()))
        .with_context(|| format!("loading {}", config_path.display()))?;

    match cli.command {
        Command::Filter(cmd) => handle_filter(config, &config_path, cmd),
        Command::Db(cmd) => handle_db(&config, cmd).await,
        Command::Ingest(cmd) => handle_ingest(&config, cmd).await,
        Command::Send(cmd) => handle_send(&config, cmd).await,
        Command::Encode(cmd) => {
            handle_encode(&config, &cmd.text);
            Ok(())
        }
        Command::Config(cmd) => handle_config(&config, &config_path, cmd),
    }
}

fn handle_filter(mut config: Config, config_path: &Path, cmd: FilterCommand) -> Result<()> {
    let mutating = cmd.is_mutating();
    let filter = &mut config.filter;

    match cmd {
        FilterCommand::Check { message, contact } => {
            let engine = MessageFilter::from_config(&*filter);
            let outcome = match contact.as_deref() {
                Some(key) => engine.check_for(&message, key),
                None => engine.check(&message, false),
            };
            match outcome {
                FilterOutcome::Filtered { word } => println!("filtered (matched {word:?})"),
                FilterOutcome::Passed => println!("passed"),
                FilterOutcome::Skipped(reason) => println!("passed ({reason})"),
            }
        }
        FilterCommand::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&*filter)?);
            } else {
                println!("Filtering: {}", on_off(filter.enabled));
                println!();
                println!("Words ({}):", filter.words.len());
                for word in &filter.words {
                    match FilterPattern::compile(word) {
                        Ok(pattern) => println!("  {:<6} {word}", pattern.kind().to_string()),
                        Err(e) => println!("  {:<6} {word}  [ignored: {e}]", "-"),
                    }
                }
                if !filter.disabled_conversations.is_empty() {
                    println!();
                    println!("Exempt conversations:");
                    for key in &filter.disabled_conversations {
                        println!("  {key}");
                    }
                }
            }
        }
        FilterCommand::Add { word, regex } => {
            if !filter.add_word(&word, regex) {
                bail!("filter word is blank or already present");
            }
            println!("Added {:?}", word.trim());
        }
        FilterCommand::Remove { word } => {
            if !filter.remove_word(&word) {
                bail!("no filter word {word:?}");
            }
            println!("Removed {word:?}");
        }
        FilterCommand::ToggleRegex { word } => match filter.toggle_regex(&word) {
            Some(toggled) => println!("Now {toggled:?}"),
            None => bail!("no filter word {word:?}"),
        },
        FilterCommand::Enable => {
            filter.enabled = true;
            println!("Filtering enabled");
        }
        FilterCommand::Disable => {
            filter.enabled = false;
            println!("Filtering disabled");
        }
        FilterCommand::Exempt { key } => {
            filter.exempt(&key);
            println!("Filtering off for {key}");
        }
        FilterCommand::Unexempt { key } => {
            filter.unexempt(&key);
            println!("Filtering on for {key}");
        }
    }

    if mutating {
        config.save_to(config_path)?;
    }
    Ok(())
}

async fn handle_db(config: &Config, cmd: DbCommand) -> Result<()> {
    let manager = DatabaseManager::from_config(config)?;

    match cmd {
        DbCommand::Switch { address } => {
            let name = manager.switch_active_database(address.as_deref()).await?;
            manager.wait_for_housekeeping().await;
            println!("{name}");
        }
        DbCommand::List { json } => {
            let databases = manager.list_databases()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&databases)?);
            } else {
                println!("Data directory: {}", config.data_dir().display());
                println!("Cache limit:    {}", manager.cache_limit());
                println!();
                for info in &databases {
                    let note = if info.reserved { " (reserved)" } else { "" };
                    println!("  {:<32} {:>15}{note}", info.name, info.last_used_ms);
                }
                if databases.is_empty() {
                    println!("  (none)");
                }
            }
        }
        DbCommand::Messages {
            device,
            contact,
            limit,
            all,
            json,
        } => {
            manager.switch_active_database(device.as_deref()).await?;
            let messages = manager
                .with_db(|db| db.recent_messages(&contact, limit, all))
                .await?;
            manager.wait_for_housekeeping().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                for message in messages.iter().rev() {
                    let hidden = if message.filtered { "  [hidden]" } else { "" };
                    println!(
                        "{:>15}  {:<12} {}{hidden}",
                        message.received_at, message.sender, message.body
                    );
                }
                if messages.is_empty() {
                    println!("  (no messages)");
                }
            }
        }
    }
    Ok(())
}

async fn handle_ingest(config: &Config, cmd: IngestCommand) -> Result<()> {
    let manager = DatabaseManager::from_config(config)?;
    let filter = MessageFilter::from_config(&config.filter);

    manager.switch_active_database(cmd.device.as_deref()).await?;

    let outcome = filter.check_for(&cmd.message, &cmd.contact);
    let filtered = outcome.is_filtered();
    let now = Utc::now();
    let id = manager
        .with_db(|db| {
            db.record_heard(&cmd.from, now.timestamp())?;
            db.insert_message(
                &cmd.contact,
                &cmd.from,
                &cmd.message,
                now.timestamp_millis(),
                filtered,
            )
        })
        .await?;
    manager.wait_for_housekeeping().await;

    match outcome {
        FilterOutcome::Filtered { word } => {
            println!("Stored message {id} (hidden, matched {word:?})");
        }
        _ => println!("Stored message {id}"),
    }
    Ok(())
}

async fn handle_send(config: &Config, cmd: SendCommand) -> Result<()> {
    let manager = DatabaseManager::from_config(config)?;
    manager.switch_active_database(cmd.device.as_deref()).await?;

    let text = config.messages.prepare_outgoing(&cmd.message);
    let sent_at = Utc::now().timestamp_millis();
    let id = manager
        .with_db(|db| db.insert_message(&cmd.contact, LOCAL_SENDER, &text, sent_at, false))
        .await?;
    manager.wait_for_housekeeping().await;

    println!("Stored message {id}: {text}");
    Ok(())
}

fn handle_encode(config: &Config, text: &str) {
    let encoded = homoglyph::encode(text);
    println!("{encoded}");
    println!();
    println!(
        "Saves {} of {} bytes (encoding is {} for outgoing messages)",
        homoglyph::byte_savings(text),
        text.len(),
        on_off(config.messages.homoglyph_encoding)
    );
}

fn handle_config(config: &Config, config_path: &Path, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Data directory:     {}", config.data_dir().display());
                println!("  Cache limit:        {}", config.storage.cache_limit);
                println!();
                println!("[Filter]");
                println!("  Enabled:            {}", config.filter.enabled);
                println!("  Words:              {}", config.filter.words.len());
                println!(
                    "  Exempt:             {}",
                    config.filter.disabled_conversations.len()
                );
                println!();
                println!("[Messages]");
                println!(
                    "  Homoglyph encoding: {}",
                    config.messages.homoglyph_encoding
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", config_path.display());
        }
        ConfigCommand::Validate { .. } => {}
    }
    Ok(())
}

fn handle_validate(path: PathBuf) {
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(config) => {
            let invalid = config.filter.invalid_words();
            if invalid.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration is valid; these filter words will be ignored:");
                for (word, err) in invalid {
                    println!("  {word}: {err}");
                }
            }
        }
        Err(e) => println!("Configuration error: {e}"),
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
