//! List providers command

use anyhow::Result;
use clap::Args;
use console::style;
use ragstash_core::Provider;
use serde_json::json;

#[derive(Args)]
pub struct ProvidersCommand {
    /// Output format: table, json
    #[arg(long, default_value = "table")]
    pub format: String,
}

impl ProvidersCommand {
    pub fn execute(self) -> Result<()> {
        match self.format.as_str() {
            "json" => {
                let list: Vec<_> = Provider::ALL
                    .iter()
                    .map(|p| json!({ "provider": p.tag(), "kind": p.kind() }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&list)?);
            }
            "table" => {
                println!(
                    "{:<10} {}",
                    style("Provider").bold().cyan(),
                    style("Kind").bold().cyan()
                );
                for provider in Provider::ALL {
                    println!("{:<10} {}", style(provider.tag()).green(), provider.kind());
                }
            }
            other => anyhow::bail!("Unknown format '{}'. Use: table, json", other),
        }
        Ok(())
    }
}
