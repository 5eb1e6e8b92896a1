use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use querygraph_ai::{
    GenerationConfig, LLMProvider, LlmDirectTranslator, LlmSchemaQaChain, OpenAICompatibleConfig,
    OpenAICompatibleProvider,
};
use querygraph_cache::MetricsSnapshot;
use querygraph_core::{
    ConfigManager, GraphExecutor, LoggingConfig, ProcessOptions, QueryGraphConfig, QueryResult,
    Record, Stage, Strategy,
};
use querygraph_engine::{QueryAnalysis, QueryOrchestrator};
use querygraph_graph::Neo4jHttpExecutor;
use serde::Serialize;
use serde_json::Value;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "querygraph")]
#[command(about = "Answer natural-language questions over a property graph", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "pretty")]
    output: OutputFormat,

    /// Explicit config file instead of the usual search path
    #[arg(short, long, global = true, env = "QUERYGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question
    Ask {
        question: String,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show complexity, strategy, intent and matching template without querying the graph
    Analyze { question: String },

    /// Answer several questions (arguments, or one per line on stdin) and report pipeline metrics
    Metrics {
        questions: Vec<String>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Write a default configuration file
    InitConfig {
        #[arg(default_value = ".querygraph.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Clone, Debug, Default)]
struct PipelineArgs {
    /// Force a strategy instead of choosing one by complexity
    #[arg(short, long, value_enum)]
    strategy: Option<StrategyArg>,

    #[arg(long)]
    skip_cache: bool,

    #[arg(long)]
    skip_templates: bool,

    #[arg(long)]
    skip_nlp: bool,

    #[arg(long)]
    skip_direct_translate: bool,

    #[arg(long)]
    skip_schema_qa: bool,

    /// Retry hint passed to the schema QA chain
    #[arg(long)]
    max_retries: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum StrategyArg {
    TemplateFirst,
    Progressive,
    HybridParallel,
    DirectExternal,
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::TemplateFirst => Strategy::TemplateFirst,
            StrategyArg::Progressive => Strategy::Progressive,
            StrategyArg::HybridParallel => Strategy::HybridParallel,
            StrategyArg::DirectExternal => Strategy::DirectExternal,
        }
    }
}

impl From<&PipelineArgs> for ProcessOptions {
    fn from(args: &PipelineArgs) -> Self {
        ProcessOptions {
            skip_cache: args.skip_cache,
            skip_templates: args.skip_templates,
            skip_nlp: args.skip_nlp,
            skip_direct_translate: args.skip_direct_translate,
            skip_schema_qa: args.skip_schema_qa,
            force_strategy: args
                .strategy
                .map(|s| Strategy::from(s).as_str().to_string()),
            max_retries: args.max_retries,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path, force } = &cli.command {
        return init_config(path, *force);
    }

    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;
    let config = manager.config().clone();
    init_tracing(&config.logging, cli.verbose);
    match manager.config_path() {
        Some(path) => debug!("Using config file {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    let orchestrator = build_orchestrator(&config)?;

    match execute_command(&cli, &orchestrator).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    // stdout carries command output, so logs go to stderr
    match logging.format.as_str() {
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok(),
        "compact" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .ok(),
    };
}

fn build_orchestrator(config: &QueryGraphConfig) -> Result<QueryOrchestrator> {
    let graph: Arc<dyn GraphExecutor> = Arc::new(
        Neo4jHttpExecutor::from_config(&config.graph)
            .context("Failed to create graph executor")?,
    );
    let mut builder = QueryOrchestrator::builder(graph.clone()).config(config.clone());

    if config.llm.enabled {
        let provider: Arc<dyn LLMProvider> = Arc::new(
            OpenAICompatibleProvider::new(OpenAICompatibleConfig::from_llm_config(&config.llm))
                .context("Failed to create LLM provider")?,
        );
        let generation = GenerationConfig::from(&config.llm);

        builder = builder
            .translator(Arc::new(
                LlmDirectTranslator::new(provider.clone())
                    .with_generation_config(generation.clone()),
            ))
            .schema_qa(Arc::new(
                LlmSchemaQaChain::new(provider, graph)
                    .with_generation_config(generation)
                    .with_retry_delay(Duration::from_millis(config.llm.retry_delay_ms))
                    .with_default_max_retries(config.pipeline.default_max_retries),
            ));
    }

    builder
        .build()
        .context("Failed to build query orchestrator")
}

/// Returns whether every question was answered
async fn execute_command(cli: &Cli, orchestrator: &QueryOrchestrator) -> Result<bool> {
    match &cli.command {
        Commands::Ask { question, pipeline } => {
            let result = orchestrator
                .process_query(question, ProcessOptions::from(pipeline))
                .await;
            emit(cli.output, &result, print_result)?;
            Ok(result.success)
        }
        Commands::Analyze { question } => {
            let analysis = orchestrator.analyze(question);
            emit(cli.output, &analysis, print_analysis)?;
            Ok(true)
        }
        Commands::Metrics {
            questions,
            pipeline,
        } => {
            let questions = if questions.is_empty() {
                read_questions(std::io::stdin().lock())?
            } else {
                questions.clone()
            };
            let options = ProcessOptions::from(pipeline);
            for question in &questions {
                let result = orchestrator.process_query(question, options.clone()).await;
                if cli.output == OutputFormat::Pretty {
                    print_outcome_line(&result);
                }
            }
            let metrics = orchestrator.get_metrics();
            emit(cli.output, &metrics, print_metrics)?;
            Ok(metrics.total_successes == metrics.total_queries)
        }
        Commands::InitConfig { path, force } => init_config(path, *force).map(|_| true),
    }
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    ConfigManager::create_default_config(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!(
        "{} Wrote default configuration to {}",
        "✓".green().bold(),
        path.display()
    );
    Ok(())
}

fn read_questions(reader: impl BufRead) -> Result<Vec<String>> {
    let mut questions = Vec::new();
    for line in reader.lines() {
        let line = line.context("Failed to read questions from stdin")?;
        let line = line.trim();
        if !line.is_empty() && !line.starts_with('#') {
            questions.push(line.to_string());
        }
    }
    Ok(questions)
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, pretty: fn(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Pretty => pretty(value),
    }
    Ok(())
}

fn print_result(result: &QueryResult) {
    if !result.success {
        println!(
            "{} {}",
            "✗".red().bold(),
            result.error.as_deref().unwrap_or("The question could not be answered")
        );
        if !result.suggestions.is_empty() {
            println!("\n{}", "Suggestions:".bold());
            for suggestion in &result.suggestions {
                println!("  • {}", suggestion);
            }
        }
        return;
    }

    print_outcome_line(result);
    if let Some(query) = &result.translated_query {
        println!("{} {}", "Query:".bold(), query.dimmed());
    }
    if let Some(answer) = &result.answer {
        println!("\n{}", answer);
    }
    if let Some(rows) = &result.rows {
        if rows.is_empty() {
            println!("{}", "No rows.".yellow());
        }
        for row in rows {
            println!("  {}", format_row(row));
        }
    }
}

fn print_outcome_line(result: &QueryResult) {
    let cached = if result.from_cache { " (cached)" } else { "" };
    if result.success {
        println!(
            "{} {} via {} in {} ms{}",
            "✓".green().bold(),
            result.query,
            describe_stage(result.stage).cyan(),
            result.processing_time_ms,
            cached
        );
    } else {
        println!(
            "{} {} ({})",
            "✗".red().bold(),
            result.query,
            result.error.as_deref().unwrap_or("failed").dimmed()
        );
    }
}

fn describe_stage(stage: Stage) -> String {
    format!("stage {} {}", stage.number(), stage.method())
}

fn format_row(row: &Record) -> String {
    row.iter()
        .map(|(column, value)| format!("{}={}", column.dimmed(), display_value(value)))
        .collect::<Vec<_>>()
        .join("  ")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_analysis(analysis: &QueryAnalysis) {
    println!("{} {}", "Question:".bold(), analysis.query);
    println!(
        "{} {:.2} {}",
        "Complexity:".bold(),
        analysis.complexity.score,
        format!("{:?}", analysis.complexity.indicators).dimmed()
    );
    println!("{} {}", "Strategy:".bold(), analysis.strategy.to_string().cyan());
    println!(
        "{} {} ({:.2}), overall confidence {:.2}",
        "Intent:".bold(),
        analysis.nlp.intent.intent,
        analysis.nlp.intent.confidence,
        analysis.nlp.confidence
    );
    for (bucket, values) in &analysis.nlp.entities {
        println!("  {:?}: {}", bucket, values.join(", "));
    }
    if !analysis.nlp.keywords.is_empty() {
        println!("{} {}", "Keywords:".bold(), analysis.nlp.keywords.join(", "));
    }
    match &analysis.matched_template {
        Some(template) => println!(
            "{} {} [{}] {}",
            "Template:".bold(),
            template.rule.green(),
            template.domain,
            template.description.dimmed()
        ),
        None => println!("{} {}", "Template:".bold(), "none".yellow()),
    }
    if !analysis.suggestions.is_empty() {
        println!("\n{}", "Suggestions:".bold());
        for suggestion in &analysis.suggestions {
            println!("  • {}", suggestion);
        }
    }
}

fn print_metrics(metrics: &MetricsSnapshot) {
    println!("\n{}", "Pipeline metrics".bold().underline());
    println!(
        "  queries {}  successes {}  cache hits {}",
        metrics.total_queries, metrics.total_successes, metrics.cache_hits
    );
    println!(
        "  success rate {:.1}%  cache hit rate {:.1}%  avg response {:.1} ms",
        metrics.success_rate * 100.0,
        metrics.cache_hit_rate * 100.0,
        metrics.avg_response_time_ms
    );
    for stage in Stage::ORDERED {
        let n = stage.number();
        println!(
            "  {:<22} successes {:>4}  errors {:>4}  avg {:>8.1} ms",
            describe_stage(stage),
            metrics.success_by_stage.get(&n).copied().unwrap_or_default(),
            metrics.error_counts_by_stage.get(&n).copied().unwrap_or_default(),
            metrics
                .average_latency_by_stage
                .get(&n)
                .copied()
                .unwrap_or_default()
        );
    }
}
