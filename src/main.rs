use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use trellis_analysis::{check_with, export, infer, DiagnosticLevel, Diagnostics, ExportOptions, GraphFormat};
use trellis_backend::{compile_checked, Backend, DryRunBackend, MockBackend};
use trellis_core::{ExecutionConfig, KeySet, Node, VisibilityPolicy};

#[derive(Parser)]
#[command(name = "trellis", version, about = "Check, inspect and dry-run agent workflow graphs")]
struct Cli {
    /// Execution config (TOML). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the contract checker over a JSON IR file
    Check {
        file: PathBuf,
        /// Keys assumed present before the first step
        #[arg(long = "seed", value_name = "KEY")]
        seeds: Vec<String>,
        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the inferred visibility of every node
    Visibility {
        file: PathBuf,
        /// Override the configured policy
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,
    },
    /// Render the workflow as a Mermaid or DOT graph
    Graph {
        file: PathBuf,
        #[arg(long, value_enum, default_value = "mermaid")]
        format: FormatArg,
        /// Annotate nodes with their reads and writes
        #[arg(long)]
        details: bool,
        #[arg(long)]
        title: Option<String>,
    },
    /// Show the execution plan a runtime would receive
    Plan { file: PathBuf },
    /// Replay the workflow against canned responses
    MockRun {
        file: PathBuf,
        /// JSON object mapping node names to a reply string or state object
        #[arg(long)]
        responses: Option<PathBuf>,
        /// Input message for the invocation
        #[arg(long, default_value = "")]
        input: String,
        /// Print events as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Transparent,
    Filtered,
    Annotate,
}

impl From<PolicyArg> for VisibilityPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Transparent => VisibilityPolicy::Transparent,
            PolicyArg::Filtered => VisibilityPolicy::Filtered,
            PolicyArg::Annotate => VisibilityPolicy::Annotate,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Mermaid,
    Dot,
}

impl From<FormatArg> for GraphFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Mermaid => GraphFormat::Mermaid,
            FormatArg::Dot => GraphFormat::Dot,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trellis=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "trellis", &mut std::io::stdout());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => {
            let config = ExecutionConfig::load(path)?;
            info!(path = %path.display(), app = %config.app_name, "Loaded config");
            config
        }
        None => ExecutionConfig::default(),
    };

    match cli.command {
        Commands::Check { file, seeds, json } => {
            let node = load_tree(&file)?;
            let diagnostics = check_with(&node, seeds.into_iter().collect::<KeySet>());
            if json {
                println!("{}", serde_json::to_string_pretty(&diagnostics)?);
            } else {
                for d in &diagnostics {
                    println!("{d}");
                }
                let count = |level: DiagnosticLevel| diagnostics.iter().filter(|d| d.level == level).count();
                println!(
                    "{} error(s), {} warning(s), {} info",
                    count(DiagnosticLevel::Error),
                    count(DiagnosticLevel::Warning),
                    count(DiagnosticLevel::Info)
                );
            }
            if diagnostics.has_errors() {
                anyhow::bail!("{} contract error(s) in {}", diagnostics.errors().len(), file.display());
            }
        }
        Commands::Visibility { file, policy } => {
            let node = load_tree(&file)?;
            let policy = policy.map(Into::into).unwrap_or(config.visibility);
            let map = infer(&node, policy);
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        Commands::Graph {
            file,
            format,
            details,
            title,
        } => {
            let node = load_tree(&file)?;
            let options = ExportOptions {
                format: format.into(),
                include_details: details,
                title,
            };
            print!("{}", export(&node, &options));
        }
        Commands::Plan { file } => {
            let node = load_tree(&file)?;
            let compiled = compile_checked(&DryRunBackend, &node, &config)?;
            println!("{}", serde_json::to_string_pretty(&compiled.artifact)?);
        }
        Commands::MockRun {
            file,
            responses,
            input,
            json,
        } => {
            let node = load_tree(&file)?;
            let backend = match responses {
                Some(path) => MockBackend::from_json(&read_json(&path)?)?,
                None => MockBackend::new(),
            };
            let compiled = compile_checked(&backend, &node, &config)?;
            let events = backend.run(&compiled.artifact, &input).await?;
            let shown = compiled.event_filter(&config).apply_all(events);
            debug!(events = shown.len(), policy = %config.visibility, "Mock run finished");

            if json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                for event in &shown {
                    if let Some(failure) = &event.failure {
                        println!("[{}] failed: {}", event.author, failure.message);
                    } else if let Some(text) = &event.content {
                        println!("[{}] {}", event.author, text);
                    } else if !event.actions.state_delta.is_empty() {
                        println!(
                            "[{}] state {}",
                            event.author,
                            serde_json::Value::Object(event.actions.state_delta.clone())
                        );
                    }
                }
            }
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn load_tree(path: &Path) -> anyhow::Result<Node> {
    let value = read_json(path)?;
    let node: Node = serde_json::from_value(value)
        .with_context(|| format!("{} is not a workflow IR document", path.display()))?;
    debug!(root = node.name(), nodes = node.count(), "Loaded workflow");
    Ok(node)
}
