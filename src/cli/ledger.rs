//! Ledger CLI subcommands for the local journal backend.
//!
//! Provides commands to:
//! - `check`: Recompute every entry hash and back-link
//! - `show`: Display the entry behind an anchor reference

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::adapters::JournalLedger;
use crate::config::{self, AnchorSettings};
use crate::core::fingerprint::Fingerprint;

/// Ledger-related subcommands
#[derive(Subcommand, Debug)]
pub enum LedgerCommands {
    /// Verify the integrity of the whole journal
    Check,

    /// Show the entry for an anchor reference
    Show {
        /// Anchor reference (entry hash)
        reference: String,
    },
}

pub async fn execute(command: LedgerCommands) -> Result<()> {
    match command {
        LedgerCommands::Check => execute_check().await,
        LedgerCommands::Show { reference } => execute_show(&reference).await,
    }
}

/// The configured journal, if the journal backend is in use
fn configured_journal() -> Result<Option<JournalLedger>> {
    match &config::config()?.anchor {
        AnchorSettings::Journal { path, memo_prefix } => Ok(Some(
            JournalLedger::new(path.clone()).with_memo_prefix(memo_prefix.clone()),
        )),
        AnchorSettings::Http { .. } => Ok(None),
    }
}

fn require_journal() -> Result<JournalLedger> {
    configured_journal()?.context(
        "The configured anchor backend is a remote ledger; use its own explorer to inspect entries",
    )
}

async fn execute_check() -> Result<()> {
    let journal = require_journal()?;
    let count = journal
        .verify_chain()
        .await
        .with_context(|| format!("Journal check failed: {}", journal.path().display()))?;

    println!("Journal intact: {} entries ({})", count, journal.path().display());
    Ok(())
}

async fn execute_show(reference: &str) -> Result<()> {
    let journal = require_journal()?;
    let entry = journal
        .lookup(reference)
        .await?
        .with_context(|| format!("No journal entry for reference: {}", reference))?;

    println!("Sequence:    {}", entry.sequence);
    println!("Fingerprint: {}", entry.fingerprint);
    println!("Memo:        {}", entry.memo);
    println!("Recorded at: {}", entry.recorded_at);
    println!("Previous:    {}", entry.previous.as_deref().unwrap_or("(genesis)"));
    println!("Reference:   {}", entry.reference);
    Ok(())
}

/// Second half of verification: the ledger holds this fingerprint under
/// this reference
pub async fn confirm_anchor(fingerprint: &Fingerprint, reference: &str) -> Result<()> {
    let Some(journal) = configured_journal()? else {
        println!("Ledger: confirm reference {} with the ledger gateway", reference);
        return Ok(());
    };

    let entry = journal
        .lookup(reference)
        .await?
        .with_context(|| format!("Anchor reference {} is not in the journal", reference))?;

    if entry.fingerprint != *fingerprint {
        anyhow::bail!(
            "Journal entry {} holds fingerprint {}, not {}",
            entry.sequence,
            entry.fingerprint,
            fingerprint
        );
    }
    if entry.computed_reference() != entry.reference {
        anyhow::bail!("Journal entry {} has been altered", entry.sequence);
    }

    println!(
        "Ledger: entry #{} recorded at {}",
        entry.sequence, entry.recorded_at
    );
    Ok(())
}
