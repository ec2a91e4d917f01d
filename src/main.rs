use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use switchyard_actions::{ActionRegistry, ActionServices};
use switchyard_core::config::AppConfig;
use switchyard_core::types::ActionConfig;
use switchyard_core::{EventBus, ExecutionContext, InboundMessage};
use switchyard_graph::{GraphDefinition, GraphExecutor, LoadedGraph};
use switchyard_providers::{HttpEmbeddingProvider, OpenAiCompatClient};

#[derive(Parser)]
#[command(
    name = "switchyard",
    version,
    about = "Rule-driven action orchestration for conversational agents"
)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "switchyard.toml", env = "SWITCHYARD_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a graph definition and print its topology
    Validate {
        /// Graph file (.json or .toml)
        graph: PathBuf,
    },
    /// Dispatch a single action and print the result
    Dispatch {
        /// Action config as inline JSON or a path to a JSON file
        action: String,
        /// Execution context (JSON file)
        #[arg(long)]
        context: Option<PathBuf>,
        /// Inbound message content, overriding the context's message
        #[arg(long, short)]
        message: Option<String>,
    },
    /// Load a graph and run one execution to the end
    Run {
        /// Graph file (.json or .toml)
        graph: PathBuf,
        /// Execution context (JSON file)
        #[arg(long)]
        context: Option<PathBuf>,
        /// Inbound message content, overriding the context's message
        #[arg(long, short)]
        message: Option<String>,
        /// Queue a message before running: node.port=<json>
        #[arg(long = "inject", value_parser = parse_injection)]
        inject: Vec<Injection>,
    },
    /// List registered action types
    Actions,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Injection {
    node: String,
    port: String,
    value: Value,
}

/// Parse `node.port=<json>`. The port defaults to `in`; a value that is not
/// valid JSON is taken as a string.
fn parse_injection(raw: &str) -> Result<Injection, String> {
    let (target, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected node.port=<json>, got '{}'", raw))?;
    let (node, port) = match target.split_once('.') {
        Some((node, port)) => (node, port),
        None => (target, switchyard_graph::definition::DEFAULT_TARGET_PORT),
    };
    if node.is_empty() || port.is_empty() {
        return Err(format!("invalid injection target '{}'", target));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok(Injection {
        node: node.to_string(),
        port: port.to_string(),
        value,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("switchyard=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "switchyard", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Validate { graph } => {
            let definition = GraphDefinition::load(&graph)
                .with_context(|| format!("reading {}", graph.display()))?;
            let loaded = LoadedGraph::new(definition)?;
            info!(
                graph = %loaded.definition.name,
                nodes = loaded.topology.sorted.len(),
                "Graph is valid"
            );
            print_json(&serde_json::to_value(&loaded.topology)?)?;
        }
        Commands::Dispatch {
            action,
            context,
            message,
        } => {
            let action: ActionConfig = parse_action(&action)?;
            let mut ctx = load_context(context.as_deref(), message)?;
            let registry = build_registry(&config);
            let result = registry.dispatch(&action, &mut ctx).await?;
            if !result.success {
                warn!(
                    action_type = %result.action_type,
                    error = result.error.as_deref().unwrap_or("unknown error"),
                    "Action failed"
                );
            }
            print_json(&serde_json::json!({
                "result": result,
                "context": ctx.context,
                "conversationState": ctx.conversation_state,
            }))?;
        }
        Commands::Run {
            graph,
            context,
            message,
            inject,
        } => {
            let definition = GraphDefinition::load(&graph)
                .with_context(|| format!("reading {}", graph.display()))?;
            let ctx = load_context(context.as_deref(), message)?;

            let events = Arc::new(EventBus::new(config.events.capacity));
            let mut listener = events.listen();
            tokio::spawn(async move {
                while let Some(event) = listener.next().await {
                    debug!(?event, "Engine event");
                }
            });

            let executor = GraphExecutor::new(Arc::new(build_registry(&config)), config.executor.clone())
                .with_events(events);
            let graph_id = executor.load_graph(definition).await?;
            let execution_id = executor.start_execution(&graph_id, ctx).await?;
            for injection in inject {
                executor
                    .inject_message(&execution_id, &injection.node, &injection.port, injection.value)
                    .await?;
            }

            let report = executor.run_execution(&execution_id).await?;
            print_json(&serde_json::to_value(&report)?)?;
            if let Some(error) = report.error {
                anyhow::bail!(error);
            }
        }
        Commands::Actions => {
            let registry = build_registry(&config);
            for (action_type, description) in registry.descriptions() {
                println!("{:<18} {}", action_type, description);
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

/// Load the config file if present, otherwise run on defaults.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        let config = AppConfig::load(path)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    } else {
        debug!(path = %path.display(), "No config file, using defaults");
        Ok(AppConfig::default())
    }
}

fn build_registry(config: &AppConfig) -> ActionRegistry {
    let mut services = ActionServices::new();
    if let Some(model) = &config.model {
        services = services.with_llm(Arc::new(OpenAiCompatClient::from_config(model)));
    }
    if let Some(embedding) = &config.embedding {
        services = services.with_embeddings(Arc::new(HttpEmbeddingProvider::from_config(embedding)));
    }
    ActionRegistry::with_builtins(config, services)
}

fn parse_action(raw: &str) -> anyhow::Result<ActionConfig> {
    let text = if raw.trim_start().starts_with('{') {
        raw.to_string()
    } else {
        std::fs::read_to_string(raw).with_context(|| format!("reading action file {}", raw))?
    };
    serde_json::from_str(&text).context("parsing action config")
}

fn load_context(path: Option<&Path>, message: Option<String>) -> anyhow::Result<ExecutionContext> {
    let mut ctx = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading context file {}", path.display()))?;
            serde_json::from_str(&text).context("parsing execution context")?
        }
        None => ExecutionContext::new("local"),
    };
    if let Some(content) = message {
        ctx.message = Some(InboundMessage::new(content));
    }
    Ok(ctx)
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_injection() {
        let inj = parse_injection("router.query={\"text\":\"hi\"}").unwrap();
        assert_eq!(inj.node, "router");
        assert_eq!(inj.port, "query");
        assert_eq!(inj.value, json!({"text": "hi"}));

        let inj = parse_injection("router=hello there").unwrap();
        assert_eq!(inj.port, "in");
        assert_eq!(inj.value, json!("hello there"));

        assert!(parse_injection("router").is_err());
        assert!(parse_injection(".in=1").is_err());
    }

    #[test]
    fn test_parse_inline_action() {
        let action = parse_action(r#"{"type": "wait", "params": {"duration": 1}}"#).unwrap();
        assert_eq!(action.action_type, "wait");
    }

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from([
            "switchyard",
            "run",
            "graph.json",
            "--inject",
            "a.in=1",
            "--inject",
            "b=2",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { inject, .. } => assert_eq!(inject.len(), 2),
            _ => panic!("expected run"),
        }
    }
}
