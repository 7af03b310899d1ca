//! Create a RAG, ingest files and query it in one process

use crate::utils::{load_rag_config, print_hits, print_task};
use anyhow::{Context, Result};
use clap::Args;
use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use ragstash_core::{content_type_for_path, Document, RagService, ScoredDocument};
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;

#[derive(Args)]
pub struct RunCommand {
    /// RAG configuration: inline JSON or a .json/.toml file
    #[arg(short, long)]
    pub config: String,

    /// Files to ingest
    pub files: Vec<PathBuf>,

    /// Query to run after ingestion (repeatable)
    #[arg(short, long = "query")]
    pub queries: Vec<String>,

    /// Index to ingest into and query [default: the configured index]
    #[arg(short, long)]
    pub index: Option<String>,

    /// Content type for every file [default: guessed from the extension]
    #[arg(long)]
    pub content_type: Option<String>,

    /// Output format: table, json
    #[arg(long, default_value = "table")]
    pub format: String,
}

impl RunCommand {
    pub async fn execute(self, service: &RagService) -> Result<()> {
        if !matches!(self.format.as_str(), "table" | "json") {
            anyhow::bail!("Unknown format '{}'. Use: table, json", self.format);
        }

        let config = load_rag_config(&self.config)?;
        let id = service.make_rag(config).await?;
        let rag = service.describe(&id).await?;
        let index = self.index.clone().unwrap_or_else(|| rag.default_index.clone());

        let progress = ProgressBar::new(self.files.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );

        let mut tasks = Vec::with_capacity(self.files.len());
        for path in &self.files {
            let label = path.display().to_string();
            progress.set_message(label.clone());

            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let content_type = self
                .content_type
                .clone()
                .unwrap_or_else(|| content_type_for_path(path).to_string());

            let mut document = Document::new(bytes, content_type);
            if let Some(name) = path.file_name() {
                document = document.with_file_name(name.to_string_lossy());
            }
            document = document.with_index(index.clone());

            let task = service.ingest_file(&id, &document).await?;
            tasks.push((label, task));
            progress.inc(1);
        }
        progress.finish_and_clear();

        let mut results: Vec<(String, Vec<ScoredDocument>)> = Vec::with_capacity(self.queries.len());
        for query in &self.queries {
            let hits = service.retrieve_query(&id, &index, query).await?;
            results.push((query.clone(), hits));
        }

        if self.format == "json" {
            let report = json!({
                "id": id,
                "provider": rag.provider,
                "index": index,
                "tasks": tasks
                    .iter()
                    .map(|(file, task)| json!({ "file": file, "task": task }))
                    .collect::<Vec<_>>(),
                "results": results
                    .iter()
                    .map(|(query, hits)| json!({ "query": query, "hits": hits }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        let mut term = Term::stdout();
        writeln!(
            term,
            "Created RAG {} ({}, index '{}')",
            style(&id).green(),
            rag.provider,
            index
        )?;
        for (label, task) in &tasks {
            print_task(&mut term, label, task)?;
        }
        for (query, hits) in &results {
            print_hits(&mut term, query, hits)?;
        }
        Ok(())
    }
}
