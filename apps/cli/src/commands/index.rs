//! Index command implementation.

use super::connect;
use crate::config::TandemConfig;
use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use tandem_abstraction::IndexId;
use tandem_orchestrator::IndexProvisioner;

#[derive(Subcommand, Debug)]
pub enum IndexCommand {
    /// Upload every visible file of a directory into a new index
    Create {
        /// Directory to upload (defaults to `data`)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Index name
        #[arg(long)]
        name: Option<String>,
    },

    /// List indexes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete an index
    Delete {
        /// Index ID
        id: String,
    },
}

/// Execute the index command.
pub async fn execute(command: IndexCommand, config: &TandemConfig) -> Result<()> {
    let client = connect()?;
    let provisioner = IndexProvisioner::new(client)
        .with_name(config.index_name())
        .with_chunking(config.chunking_policy());

    match command {
        IndexCommand::Create { data_dir, name } => {
            let provisioner = match name {
                Some(name) => provisioner.with_name(name),
                None => provisioner,
            };
            let data_dir = data_dir.unwrap_or_else(|| config.data_dir());
            let index = provisioner
                .provision_index(&data_dir)
                .await
                .with_context(|| format!("Failed to index {}", data_dir.display()))?;

            println!("{} {}", "Index created:".green().bold(), index.id.as_str().bold());
            println!("  files: {}", index.file_count);
            println!("  reuse it with: tandem run --index-id {} <prompt>", index.id);
        }
        IndexCommand::List { json } => {
            let indexes = provisioner.list().await.context("Failed to list indexes")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&indexes)?);
            } else if indexes.is_empty() {
                println!("{}", "No indexes found.".yellow());
            } else {
                for index in &indexes {
                    println!(
                        "{}  {}  {} file(s)",
                        index.id.as_str().cyan(),
                        index.name.as_deref().unwrap_or("-"),
                        index.file_count
                    );
                }
            }
        }
        IndexCommand::Delete { id } => {
            provisioner.teardown(&IndexId::new(id.as_str())).await.context("Failed to delete index")?;
            println!("{} {}", "Index deleted:".green(), id);
        }
    }

    Ok(())
}
