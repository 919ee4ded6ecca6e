//! Command-line interface for witness.
//!
//! Provides commands for sealing artifacts, attaching statements,
//! inspecting records, verifying copies, and serving the HTTP API.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config;
use crate::config::AnchorSettings;
use crate::core::fingerprint::{fingerprint_file, Fingerprint};
use crate::core::record_store::{FileRecordStore, RecordStore};
use crate::core::verify::{verify, verify_record, Verdict};
use crate::core::Orchestrator;
use crate::domain::{EvidenceRecord, RecordId};

pub mod ledger;

/// witness - Tamper-evident evidence sealing
#[derive(Parser, Debug)]
#[command(name = "witness")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Seal an artifact: fingerprint, anchor, and create a record
    Submit {
        /// Artifact file
        file: PathBuf,
    },

    /// Attach a narrated statement to a record
    Narrate {
        /// Record ID
        record_id: String,

        /// Statement text (reads --input or stdin if not provided)
        #[arg(short, long)]
        text: Option<String>,

        /// File containing the statement
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Write the audio to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Attach a structured analysis of a statement to a record
    Analyze {
        /// Record ID
        record_id: String,

        /// Statement text (reads --input or stdin if not provided)
        #[arg(short, long)]
        text: Option<String>,

        /// File containing the statement
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show a record
    Show {
        /// Record ID
        record_id: String,

        /// Print the full JSON document
        #[arg(long)]
        json: bool,
    },

    /// List recently sealed records
    Records {
        /// Maximum number of records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Print the fingerprint of a file
    Hash {
        file: PathBuf,
    },

    /// Check a local copy of an artifact against a published fingerprint
    Verify {
        /// Local artifact
        file: PathBuf,

        /// Published fingerprint (64 hex characters)
        #[arg(long, conflicts_with = "record", required_unless_present = "record")]
        fingerprint: Option<String>,

        /// Record whose fingerprint to check against
        #[arg(long)]
        record: Option<String>,
    },

    /// Inspect the local journal ledger
    Ledger {
        #[command(subcommand)]
        command: ledger::LedgerCommands,
    },

    /// Show resolved configuration (debug)
    Config,

    /// Start the HTTP API
    Serve {
        /// Address to bind to (defaults to the configured server.bind)
        #[arg(short, long, env = "WITNESS_BIND")]
        address: Option<String>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Submit { file } => submit(&file).await,
            Commands::Narrate {
                record_id,
                text,
                input,
                out,
            } => narrate(&record_id, text, input, out).await,
            Commands::Analyze {
                record_id,
                text,
                input,
            } => analyze(&record_id, text, input).await,
            Commands::Show { record_id, json } => show_record(&record_id, json).await,
            Commands::Records { limit } => list_records(limit).await,
            Commands::Hash { file } => hash_file(&file).await,
            Commands::Verify {
                file,
                fingerprint,
                record,
            } => verify_file(&file, fingerprint, record).await,
            Commands::Ledger { command } => ledger::execute(command).await,
            Commands::Config => show_config(),
            Commands::Serve { address } => serve(address).await,
        }
    }
}

async fn orchestrator() -> Result<Orchestrator> {
    Orchestrator::from_config(config::config()?).await
}

fn parse_record_id(raw: &str) -> Result<RecordId> {
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid record ID: {}", raw))
}

/// Statement text from --text, --input, or piped stdin
fn read_statement(text: Option<String>, input: Option<PathBuf>) -> Result<String> {
    if let Some(text) = text {
        return Ok(text);
    }

    if let Some(path) = input {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read statement file: {}", path.display()));
    }

    if io::stdin().is_terminal() {
        anyhow::bail!("No statement provided. Use --text, --input <file>, or pipe to stdin");
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

/// Seal an artifact file
async fn submit(file: &Path) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read artifact: {}", file.display()))?;

    let orchestrator = orchestrator().await?;
    let record = orchestrator
        .submit(&bytes)
        .await
        .with_context(|| format!("Failed to seal {}", file.display()))?;

    println!("Sealed via {} ledger", orchestrator.anchor_backend());
    println!("Record ID:        {}", record.id);
    println!("Fingerprint:      {}", record.fingerprint);
    println!("Anchor reference: {}", record.anchor_reference);
    println!("Sealed at:        {}", record.sealed_at);

    Ok(())
}

/// Attach narration to a record
async fn narrate(
    record_id: &str,
    text: Option<String>,
    input: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<()> {
    let id = parse_record_id(record_id)?;
    let statement = read_statement(text, input)?;

    let record = orchestrator()
        .await?
        .attach_narration(id, &statement)
        .await
        .with_context(|| format!("Narration failed for record {}", id))?;

    let audio = record.narration_audio.unwrap_or_default();
    match out {
        Some(path) => {
            tokio::fs::write(&path, &audio)
                .await
                .with_context(|| format!("Failed to write audio: {}", path.display()))?;
            println!("Narration stored; audio written to {}", path.display());
        }
        None => println!("Narration stored ({} bytes of audio)", audio.len()),
    }

    Ok(())
}

/// Attach analysis to a record
async fn analyze(record_id: &str, text: Option<String>, input: Option<PathBuf>) -> Result<()> {
    let id = parse_record_id(record_id)?;
    let statement = read_statement(text, input)?;

    let record = orchestrator()
        .await?
        .attach_analysis(id, &statement)
        .await
        .with_context(|| format!("Analysis failed for record {}", id))?;

    if let Some(analysis) = &record.analysis {
        println!("Category: {}", analysis.category);
        println!("Urgency:  {}/5", analysis.urgency_score);
        if !analysis.entities.is_empty() {
            println!("Entities: {}", analysis.entities.join(", "));
        }
        println!("\n{}", analysis.report);
    }

    Ok(())
}

async fn load_record(record_id: &str) -> Result<EvidenceRecord> {
    let id = parse_record_id(record_id)?;
    let store = FileRecordStore::open_default().await?;
    store
        .get(id)
        .await?
        .with_context(|| format!("Evidence not found: {}", id))
}

/// Show a record
async fn show_record(record_id: &str, json: bool) -> Result<()> {
    let record = load_record(record_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let stages: Vec<String> = record
        .stages()
        .iter()
        .map(|s| format!("{:?}", s).to_lowercase())
        .collect();

    println!("Record ID:        {}", record.id);
    println!("Stages:           {}", stages.join(" -> "));
    println!("Fingerprint:      {}", record.fingerprint);
    println!("Anchor reference: {}", record.anchor_reference);
    println!("Sealed at:        {}", record.sealed_at);

    if let Some(text) = &record.statement_text {
        println!("\nStatement:");
        println!("  {}", text);
    }
    if let (Some(audio), Some(at)) = (&record.narration_audio, record.narrated_at) {
        println!("\nNarration: {} bytes (at {})", audio.len(), at);
    }
    if let Some(analysis) = &record.analysis {
        println!("\nAnalysis:");
        println!("  Category: {}", analysis.category);
        println!("  Urgency:  {}/5", analysis.urgency_score);
        println!("  Entities: {}", analysis.entities.join(", "));
        println!("\n{}", analysis.report);
    }

    Ok(())
}

/// List recent records
async fn list_records(limit: usize) -> Result<()> {
    let store = FileRecordStore::open_default().await?;
    let records = store.list(limit).await?;

    if records.is_empty() {
        println!("No records found");
        return Ok(());
    }

    println!("{:<38} {:<18} {:<26} {:<10}", "RECORD ID", "FINGERPRINT", "SEALED", "STAGE");
    println!("{}", "-".repeat(94));

    for record in records {
        let stage = record
            .stages()
            .last()
            .map(|s| format!("{:?}", s).to_lowercase())
            .unwrap_or_default();
        println!(
            "{:<38} {:<18} {:<26} {:<10}",
            record.id,
            record.fingerprint.short(),
            record.sealed_at.format("%Y-%m-%d %H:%M:%S UTC"),
            stage
        );
    }

    Ok(())
}

/// Print the fingerprint of a file
async fn hash_file(file: &Path) -> Result<()> {
    let fp = fingerprint_file(file)
        .await
        .with_context(|| format!("Failed to fingerprint {}", file.display()))?;
    println!("{}  {}", fp, file.display());
    Ok(())
}

/// Verify a local copy; exits with status 1 on mismatch
async fn verify_file(file: &Path, published: Option<String>, record: Option<String>) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read artifact: {}", file.display()))?;

    let verdict = match (published, record) {
        (Some(hex), _) => {
            let published: Fingerprint = hex
                .parse()
                .with_context(|| format!("Invalid fingerprint: {}", hex))?;
            verify(&bytes, &published)
        }
        (None, Some(record_id)) => {
            let record = load_record(&record_id).await?;
            let report = verify_record(&bytes, &record)?;

            println!("Expected:         {}", report.expected);
            if let Some(computed) = &report.computed {
                println!("Computed:         {}", computed);
            }
            println!("Anchor reference: {}", report.anchor_reference);

            if report.verdict.is_match() {
                ledger::confirm_anchor(&report.expected, &report.anchor_reference).await?;
            }
            report.verdict
        }
        (None, None) => anyhow::bail!("Provide --fingerprint or --record"),
    };

    println!("{}", verdict);
    if verdict == Verdict::Mismatch {
        std::process::exit(1);
    }
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("═══════════════════════════════════════════════════════════════");
    println!("  Witness Configuration");
    println!("═══════════════════════════════════════════════════════════════\n");

    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:    {}", cfg.home.display());
    println!("  Records: {}", cfg.records.display());
    println!("  Events:  {}", cfg.events_path().display());
    println!();
    println!("Anchor:");
    match &cfg.anchor {
        AnchorSettings::Journal { path, memo_prefix } => {
            println!("  Backend: journal");
            println!("  Path:    {}", path.display());
            println!("  Memo:    {}", memo_prefix);
        }
        AnchorSettings::Http {
            endpoint,
            token_env,
            poll_interval_ms,
            memo_prefix,
        } => {
            println!("  Backend:  http");
            println!("  Endpoint: {}", endpoint);
            println!("  Token:    {}", token_env.as_deref().unwrap_or("(none)"));
            println!("  Poll:     {}ms", poll_interval_ms);
            println!("  Memo:     {}", memo_prefix);
        }
    }
    println!();
    println!(
        "Narration: {} (voice {}, model {}, key ${})",
        cfg.narration.endpoint,
        cfg.narration.voice_id,
        cfg.narration.model_id,
        cfg.narration.api_key_env
    );
    println!(
        "Analysis:  {} (model {}, key ${})",
        cfg.analysis.endpoint,
        cfg.analysis.model,
        cfg.analysis.api_key_env
    );
    println!();
    println!("Limits:");
    println!("  Max artifact:  {} bytes", cfg.limits.max_artifact_bytes);
    println!("  Max statement: {} bytes", cfg.limits.max_statement_bytes);
    println!(
        "  Timeouts:      anchor {}s, narration {}s, analysis {}s",
        cfg.limits.anchor_timeout_seconds,
        cfg.limits.narration_timeout_seconds,
        cfg.limits.analysis_timeout_seconds
    );
    println!();
    println!("Server bind: {}", cfg.bind);

    Ok(())
}

/// Start the HTTP API
async fn serve(address: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let address = address.unwrap_or_else(|| cfg.bind.clone());
    let orchestrator = Arc::new(Orchestrator::from_config(cfg).await?);
    crate::server::serve(orchestrator, &address).await
}
