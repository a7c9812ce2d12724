//! Non-interactive subcommands. Each returns the lines to print.

use anyhow::Context;
use chrono::NaiveDateTime;
use plib_core::{Side, StatusStore};
use plib_data::{load_resolved_config, open_status, JsonStatusFile, Library, STATUS_FILE};
use std::path::Path;

pub fn status(dir: &Path, now: NaiveDateTime) -> anyhow::Result<Vec<String>> {
    let config = load_resolved_config(dir)?;
    let store = JsonStatusFile::new(dir.join(STATUS_FILE));
    let status = open_status(&store, config.status, now)?;
    Ok(status.describe(now))
}

pub fn check_in(dir: &Path, now: NaiveDateTime) -> anyhow::Result<Vec<String>> {
    let config = load_resolved_config(dir)?;
    let store = JsonStatusFile::new(dir.join(STATUS_FILE));
    let mut status = open_status(&store, config.status, now)?;
    let message = status.apply_daily_decay(now.date());
    store
        .save(status.record())
        .with_context(|| format!("save {}", store.path().display()))?;
    let mut lines: Vec<String> = message.into_iter().collect();
    lines.push(status.position_line());
    Ok(lines)
}

/// Missed-day decay is applied before the claim is resolved.
pub fn claim(dir: &Path, claimant: Side, now: NaiveDateTime) -> anyhow::Result<Vec<String>> {
    let config = load_resolved_config(dir)?;
    let store = JsonStatusFile::new(dir.join(STATUS_FILE));
    let mut status = open_status(&store, config.status, now)?;
    let mut lines: Vec<String> = status.apply_daily_decay(now.date()).into_iter().collect();
    let outcome = status.resolve_claim(claimant, now, now.date());
    store
        .save(status.record())
        .with_context(|| format!("save {}", store.path().display()))?;
    lines.push(outcome.message());
    lines.push(status.position_line());
    Ok(lines)
}

pub fn allocate(dir: &Path) -> anyhow::Result<Vec<String>> {
    let config = load_resolved_config(dir)?;
    let library = Library::load(dir)?;
    let allocation = config
        .permission
        .allocate(library.collection())
        .context("allocate draws")?;
    Ok(vec![
        format!(
            "You draw {}, we may draw up to {}",
            allocation.your_draws, allocation.our_draws
        ),
        format!(
            "Chance you win: {:.1}%",
            allocation.you_win_probability * 100.0
        ),
    ])
}

pub fn reconcile(dir: &Path, staging: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let mut library = Library::load(dir)?;
    let report = library.reconcile(staging)?;
    library.save()?;
    let mut lines = Vec::new();
    for id in &report.removed {
        lines.push(format!("removed #{id}: file missing"));
    }
    for path in &report.strays {
        lines.push(format!("not in index: {}", path.display()));
    }
    for path in &report.moved {
        lines.push(format!("moved to {}", path.display()));
    }
    if lines.is_empty() {
        lines.push("library is consistent".to_string());
    }
    Ok(lines)
}

pub fn purge(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut library = Library::load(dir)?;
    let purged = library.purge_marked()?;
    library.save()?;
    Ok(vec![format!("purged {} item(s)", purged.len())])
}
