//! Utility functions for CLI

use anyhow::{Context, Result};
use console::{style, Term};
use ragstash_core::{IngestionTask, RagConfig, ScoredDocument, TaskStatus};
use std::io::Write;
use std::path::Path;

/// Read a RAG configuration given inline as JSON or as a `.json`/`.toml` file.
pub fn load_rag_config(source: &str) -> Result<RagConfig> {
    if source.trim_start().starts_with('{') {
        return Ok(RagConfig::from_json(source)?);
    }

    let path = Path::new(source);
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    let config = if is_toml {
        RagConfig::from_toml(&raw)?
    } else {
        RagConfig::from_json(&raw)?
    };
    Ok(config)
}

/// Display an ingestion outcome
pub fn print_task(term: &mut Term, label: &str, task: &IngestionTask) -> Result<()> {
    let status = match task.status {
        TaskStatus::Done => style(task.status.to_string()).green(),
        TaskStatus::Error => style(task.status.to_string()).red(),
        TaskStatus::Pending => style(task.status.to_string()).yellow(),
    };

    write!(
        term,
        "{:<6} {} -> {} ({} chunks)",
        status,
        label,
        style(&task.index).cyan(),
        task.chunks
    )?;
    if let Some(detail) = &task.detail {
        write!(term, " {}", style(detail).dim())?;
    }
    writeln!(term)?;
    Ok(())
}

/// Display ranked hits for one query
pub fn print_hits(term: &mut Term, query: &str, hits: &[ScoredDocument]) -> Result<()> {
    writeln!(term, "{} {}", style("Query:").bold(), query)?;
    if hits.is_empty() {
        writeln!(term, "  {}", style("No results.").dim())?;
        return Ok(());
    }

    let width = get_terminal_width().saturating_sub(16).max(20);
    for (rank, hit) in hits.iter().enumerate() {
        writeln!(
            term,
            "  {:>2}. {} {}",
            rank + 1,
            style(format!("{:.4}", hit.score)).yellow(),
            truncate_text(&single_line(&hit.text), width)
        )?;
    }
    Ok(())
}

/// Get terminal width for formatting
pub fn get_terminal_width() -> usize {
    match Term::stdout().size_checked() {
        Some((_, cols)) => cols as usize,
        None => 80,
    }
}

/// Collapse runs of whitespace, newlines included, to single spaces.
pub fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate text to fit within a given width
pub fn truncate_text(text: &str, max_width: usize) -> String {
    if text.chars().count() <= max_width {
        text.to_string()
    } else if max_width <= 3 {
        "...".to_string()
    } else {
        let kept: String = text.chars().take(max_width - 3).collect();
        format!("{}...", kept)
    }
}
