//! Run command implementation.

use super::connect;
use crate::config::TandemConfig;
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use tandem_abstraction::{IndexId, IndexReference, Role, RunStep, StepDetails, ToolCall};
use tandem_orchestrator::{
    AgentRegistry, IndexProvisioner, PipelineOrchestrator, PipelineResult, PipelineTrace,
    configure_agent, load_instructions,
};
use tracing::warn;

const SNIPPET_CHARS: usize = 200;

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Prompt handed to the planner
    pub prompt: String,

    /// Directory to index when no index ID is given
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Reuse an existing index instead of provisioning one
    #[arg(long)]
    pub index_id: Option<String>,

    /// Leave both agents on the service after the run
    #[arg(long)]
    pub keep_agents: bool,

    /// Print the steps each agent took
    #[arg(long)]
    pub show_steps: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the run command.
pub async fn execute(args: RunArgs, mut config: TandemConfig) -> Result<()> {
    config.merge(&TandemConfig {
        data_dir: args.data_dir.clone(),
        index_id: args.index_id.clone(),
        ..TandemConfig::default()
    });

    let client = connect()?;

    let planner_path = config.planner_instructions();
    let planner_instructions = load_instructions(&planner_path)
        .with_context(|| format!("Failed to load planner instructions from {}", planner_path.display()))?;
    let coder_path = config.coder_instructions();
    let coder_instructions = load_instructions(&coder_path)
        .with_context(|| format!("Failed to load coder instructions from {}", coder_path.display()))?;

    let provisioner = IndexProvisioner::new(client.clone())
        .with_name(config.index_name())
        .with_chunking(config.chunking_policy());
    let index = match config.index_id.as_deref() {
        Some(id) => provisioner.attach_existing(&IndexId::new(id)).await?,
        None => {
            let index = provisioner.provision_index(&config.data_dir()).await?;
            if !args.json {
                announce_index(&index);
            }
            index
        }
    };

    let model = config.model_settings();
    let planner = configure_agent(Role::Planner, planner_instructions, Some(index.clone()))
        .with_model(model.clone())
        .with_max_search_results(config.planner_max_search_results());
    let coder = configure_agent(Role::Coder, coder_instructions, Some(index.clone()))
        .with_model(model)
        .with_max_search_results(config.coder_max_search_results());
    let registry = AgentRegistry::create(client.as_ref(), planner, coder).await?;

    let orchestrator = PipelineOrchestrator::new(client.clone(), config.poller_config());
    let outcome = async {
        let result = orchestrator.run(&args.prompt, &registry).await?;
        let trace =
            if args.show_steps { Some(orchestrator.inspect(&result).await?) } else { None };
        Ok::<_, tandem_orchestrator::PipelineError>((result, trace))
    }
    .await;

    if args.keep_agents {
        if !args.json {
            println!(
                "Agents kept: planner {}, coder {}",
                registry.planner().id,
                registry.coder().id
            );
        }
    } else if let Err(e) = registry.clone().delete_all(client.as_ref()).await {
        warn!(error = %e, "Failed to clean up agents");
    }

    let (result, trace) = outcome.context("Pipeline failed")?;

    if args.json {
        let output = json!({
            "index_id": index.id,
            "planner_agent": registry.planner().id,
            "coder_agent": registry.coder().id,
            "result": result,
            "steps": trace,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_result(&result);
        if let Some(trace) = trace {
            print_trace(&trace);
        }
    }

    Ok(())
}

fn announce_index(index: &IndexReference) {
    println!(
        "{} {} ({} file(s))",
        "Using new index".bold(),
        index.id.as_str().cyan().bold(),
        index.file_count
    );
    println!("  reuse it with --index-id {}", index.id);
}

fn print_result(result: &PipelineResult) {
    println!();
    println!("{}", "--- Planner Output ---".bold().cyan());
    println!();
    println!("{}", result.planner_output);
    println!();
    println!("{}", "--- Coder Output ---".bold().green());
    println!();
    println!("{}", result.coder_output);
}

fn print_trace(trace: &PipelineTrace) {
    print_steps("Steps taken by the planner agent", &trace.planner_steps);
    print_steps("Steps taken by the coder agent", &trace.coder_steps);
}

fn print_steps(title: &str, steps: &[RunStep]) {
    println!();
    println!("{}", format!("=== {} ===", title).bold());

    for (i, step) in steps.iter().enumerate() {
        println!();
        println!("{}", format!("--- Step {} ({}) ---", i, step.id).dimmed());
        let calls = match &step.details {
            StepDetails::MessageCreation => {
                println!("  Wrote a message.");
                continue;
            }
            StepDetails::ToolCalls(calls) => calls,
        };

        for call in calls {
            match call {
                ToolCall::FileSearch { results } if results.is_empty() => {
                    println!("  File search returned nothing.");
                }
                ToolCall::FileSearch { results } => {
                    for (r, hit) in results.iter().enumerate() {
                        println!("  Result {}:", r);
                        println!(
                            "    Document: {}",
                            hit.file_name.as_deref().unwrap_or("Unknown Filename")
                        );
                        if let Some(score) = hit.score {
                            println!("    Score: {:.3}", score);
                        }
                        println!("    Snippet: {}", truncate(hit.snippet.as_deref().unwrap_or("[no text]")));
                    }
                }
                ToolCall::CodeInterpreter { input } => {
                    println!("  Ran code:");
                    for line in input.lines() {
                        println!("    {}", line);
                    }
                }
                ToolCall::Other { kind } => println!("  Tool call: {}", kind),
            }
        }
    }
}

fn truncate(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(SNIPPET_CHARS).collect();
    if chars.next().is_some() { format!("{}...", head) } else { head }
}
