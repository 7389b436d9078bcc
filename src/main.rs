use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atlas::config::Config;
use atlas::llm::{self, LlmClient};
use atlas::planning::{AdaptiveExecutor, HierarchicalPlanManager, PlanContext, PlanEvent};
use atlas::tools::{DryRunExecutor, EmailStrategyManager, ToolRegistry, ToolResolver};

#[derive(Parser)]
#[command(name = "atlas")]
#[command(about = "Hierarchical task planning for a desktop assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose a goal into a task tree
    Plan {
        /// Natural-language goal
        goal: String,
        /// Extra planning context as key=value (repeatable)
        #[arg(short, long, value_parser = parse_context_pair)]
        context: Vec<(String, String)>,
        /// Print the plan as JSON instead of a tree
        #[arg(long)]
        json: bool,
    },
    /// Plan a goal and execute it with the dry-run tool executor
    Run {
        /// Natural-language goal
        goal: String,
        /// Extra planning context as key=value (repeatable)
        #[arg(short, long, value_parser = parse_context_pair)]
        context: Vec<(String, String)>,
    },
    /// List the registered tools
    Tools,
    /// Configure atlas
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
        /// Set API key
        #[arg(long)]
        api_key: Option<String>,
        /// Set model
        #[arg(long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atlas=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            goal,
            context,
            json,
        } => {
            plan_goal(&goal, context.into_iter().collect(), json).await?;
        }
        Commands::Run { goal, context } => {
            run_goal(&goal, context.into_iter().collect()).await?;
        }
        Commands::Tools => {
            list_tools()?;
        }
        Commands::Config {
            show,
            api_key,
            model,
        } => {
            handle_config(show, api_key, model)?;
        }
    }

    Ok(())
}

fn parse_context_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn build_registry(config: &Config) -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::new().with_extra(&config.tools.extra))
}

fn build_manager(config: &Config) -> Result<Arc<HierarchicalPlanManager>> {
    let client: Arc<dyn LlmClient> =
        Arc::from(llm::create_client(config).context("Failed to create LLM client")?);
    let resolver = ToolResolver::new(build_registry(config))
        .with_email_strategy(Arc::new(EmailStrategyManager::from_config(&config.email)));
    Ok(Arc::new(HierarchicalPlanManager::new(
        client,
        Arc::new(resolver),
        &config.planning,
    )))
}

async fn plan_goal(goal: &str, context: PlanContext, json: bool) -> Result<()> {
    let config = Config::load()?;
    let manager = build_manager(&config)?;
    let plan = manager.create_hierarchical_plan(goal, &context).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let assessment = &plan.complexity_assessment;
    println!(
        "Complexity: {} ({} x {} x {} = {} processes)",
        assessment.level,
        assessment.phases,
        assessment.tasks_per_phase,
        assessment.actions_per_task,
        assessment.total_processes
    );
    if !assessment.reasoning.is_empty() {
        println!("Reasoning: {}", assessment.reasoning);
    }
    println!();
    print!("{}", plan.render_tree());
    Ok(())
}

async fn run_goal(goal: &str, context: PlanContext) -> Result<()> {
    let config = Config::load()?;
    let manager = build_manager(&config)?;
    let mut plan = manager.create_hierarchical_plan(goal, &context).await;
    print!("{}", plan.render_tree());
    println!();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                PlanEvent::TaskStarted { title, tool, .. } => {
                    println!("▶ {} [{}]", title, tool);
                }
                PlanEvent::TaskCompleted {
                    success, output, error, ..
                } => {
                    if success {
                        println!("  ✓ {}", output.unwrap_or_default());
                    } else {
                        println!("  ✗ {}", error.unwrap_or_default());
                    }
                }
                PlanEvent::TaskReplanned { replacement_id, .. } => {
                    println!("  ↻ replanned as {}", replacement_id);
                }
                PlanEvent::PlanCompleted { summary, .. } => {
                    println!("\n{}", summary);
                }
            }
        }
    });

    let executor = AdaptiveExecutor::new(manager, Arc::new(DryRunExecutor))
        .with_events(event_tx)
        .with_context(context);
    let summary = executor.execute(&mut plan).await?;
    drop(executor);
    printer.await?;

    println!(
        "{} completed, {} failed, {} cancelled, {} replans",
        summary.completed, summary.failed, summary.cancelled, summary.replans
    );
    Ok(())
}

fn list_tools() -> Result<()> {
    let config = Config::load()?;
    let registry = build_registry(&config);
    for tool in registry.tools() {
        let keywords: Vec<&str> = tool.keywords.iter().map(String::as_str).collect();
        println!(
            "{:<20} {:<12} p{:<3} {:<10} {}",
            tool.name,
            tool.category,
            tool.priority,
            tool.plugin.as_deref().unwrap_or("-"),
            keywords.join(", ")
        );
    }
    Ok(())
}

fn handle_config(show: bool, api_key: Option<String>, model: Option<String>) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let mut changed = false;

    if let Some(key) = api_key {
        config.llm.api_key = Some(key);
        changed = true;
        println!("API key updated");
    }

    if let Some(m) = model {
        config.llm.model = m;
        changed = true;
        println!("Model updated");
    }

    if changed {
        config.save()?;
        println!("Configuration saved to: {:?}", Config::config_path()?);
    } else {
        println!("No changes made. Use --show to view current configuration.");
    }

    Ok(())
}
