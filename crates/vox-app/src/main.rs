//! Vox application binary - composition root.
//!
//! Ties together all Vox crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Open the JSON-backed transcription store
//! 3. Build the transcription engine (capture -> client -> store)
//! 4. Dispatch the requested subcommand

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use vox_audio::MockBackend;
use vox_client::TranscriptionClient;
use vox_core::config::VoxConfig;
use vox_core::types::{AudioSettingsUpdate, ConfirmFn, TranscriptionRecord};
use vox_engine::TranscriptionEngine;
use vox_storage::TranscriptionStore;

#[derive(Parser)]
#[command(name = "vox", version, about = "Voice transcription pipeline")]
struct Cli {
    /// Path to the configuration file (default: ~/.vox/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe an audio file and add the result to history.
    Transcribe {
        /// Audio file to upload (wav, mp3, m4a, ogg, flac).
        file: PathBuf,
        /// Run spell check on the result before printing it.
        #[arg(long)]
        spell_check: bool,
    },
    /// Print the transcription history, newest first.
    History,
    /// Search the history for matching text.
    Search { query: String },
    /// Attach an edited version of a record's text.
    Edit { id: String, text: String },
    /// Delete a record and its audio asset.
    Delete { id: String },
    /// Run spell check over a record's text.
    SpellCheck { id: String },
    /// Play a record's audio asset.
    Play { id: String },
    /// Delete the entire history and stored audio.
    Clear,
    /// Show or update audio settings.
    Settings {
        /// Delete audio assets after playback finishes.
        #[arg(long)]
        auto_delete: Option<bool>,
        /// Ask for confirmation before deletions.
        #[arg(long)]
        confirm_delete: Option<bool>,
        /// Move recordings into permanent storage.
        #[arg(long)]
        permanent_storage: Option<bool>,
    },
}

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Resolve the config file path (VOX_CONFIG env, or ~/.vox/config.toml).
fn config_path() -> PathBuf {
    if let Ok(p) = std::env::var("VOX_CONFIG") {
        return PathBuf::from(p);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".vox").join("config.toml");
    }
    PathBuf::from("config.toml")
}

/// Confirmation hook backed by a terminal y/N prompt.
fn terminal_confirm() -> ConfirmFn {
    Box::new(|title, message| {
        use std::io::Write;
        eprint!("{}: {} [y/N] ", title, message);
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes")
    })
}

fn print_record(record: &TranscriptionRecord) {
    let when = chrono::DateTime::from_timestamp_millis(record.timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| record.timestamp.to_string());
    let mut flags = Vec::new();
    if record.is_edited {
        flags.push("edited");
    }
    if record.is_spell_checked {
        flags.push("spell-checked");
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    println!("{}  {}{}", record.id, when, flags);
    println!("  {}", record.display_text());
    if let Some(ref corrected) = record.corrected_text {
        println!("  corrected: {}", corrected);
    }
    if !record.audio_uri.is_empty() {
        println!("  audio: {} ({:.1}s)", record.audio_uri, record.duration);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Config.
    let config_file = cli.config.clone().unwrap_or_else(config_path);
    let config = VoxConfig::load_or_default(&config_file);

    // Storage.
    let data_dir = resolve_data_dir(&config.storage.data_dir);
    let store = TranscriptionStore::new(&data_dir, Default::default())
        .with_confirm(terminal_confirm());

    // Engine. The CLI has no live microphone; recording flows are exercised
    // through file transcription, so a mock recording backend suffices.
    let client = TranscriptionClient::new(config.api.clone())?;
    let engine = TranscriptionEngine::new(MockBackend::new(), client, store, &config)
        .with_confirm(terminal_confirm());
    engine.init().await?;

    match cli.command {
        Command::Transcribe { file, spell_check } => {
            let record = engine.transcribe_file(&file).await?;
            let record = if spell_check {
                engine.spell_check_transcription(&record.id).await?
            } else {
                record
            };
            print_record(&record);
        }
        Command::History => {
            let history = engine.state().history;
            if history.is_empty() {
                println!("No transcriptions yet.");
            }
            for record in &history {
                print_record(record);
            }
        }
        Command::Search { query } => {
            let hits = engine.search_history(&query);
            if hits.is_empty() {
                println!("No matches.");
            }
            for record in &hits {
                print_record(record);
            }
        }
        Command::Edit { id, text } => {
            engine.edit_transcription(&id, &text).await?;
        }
        Command::Delete { id } => {
            engine.delete_transcription(&id).await?;
        }
        Command::SpellCheck { id } => {
            let record = engine.spell_check_transcription(&id).await?;
            print_record(&record);
        }
        Command::Play { id } => {
            let record = engine
                .state()
                .history
                .into_iter()
                .find(|r| r.id == id)
                .ok_or(vox_core::error::VoxError::NotFound(id))?;
            engine.play_record(&record.audio_uri).await?;
        }
        Command::Clear => {
            engine.clear_all_transcriptions().await?;
            println!("History cleared.");
        }
        Command::Settings {
            auto_delete,
            confirm_delete,
            permanent_storage,
        } => {
            let update = AudioSettingsUpdate {
                auto_delete_after_playback: auto_delete,
                confirm_before_delete: confirm_delete,
                use_permanent_storage: permanent_storage,
            };
            let settings = if update == AudioSettingsUpdate::default() {
                engine.state().audio_settings
            } else {
                engine.update_audio_settings(update).await?
            };
            println!(
                "autoDeleteAfterPlayback = {}",
                settings.auto_delete_after_playback
            );
            println!("confirmBeforeDelete = {}", settings.confirm_before_delete);
            println!("usePermanentStorage = {}", settings.use_permanent_storage);
        }
    }

    engine.cleanup().await;
    Ok(())
}
