//! Run a prompt-variant matrix described by a JSON request file.
//!
//! API keys come from `models.api_keys` in the request; when no key covers
//! a model, the `OPENROUTER_KEY` environment variable is used.
//!
//! # Examples
//!
//! ```sh
//! # Run every cell and write the results
//! promptgrid --request run.json --out results.json
//!
//! # Inspect the assembled prompts without calling any model
//! promptgrid --request run.json --plan-only
//!
//! # Register extra output types and keep per-cell files
//! promptgrid --request run.json --specs specs.json --store-dir runs/
//!
//! # Discover output types / the request schema
//! promptgrid --list-types
//! promptgrid --print-schema
//! ```

use clap::Parser;
use promptgrid::config::{EngineConfig, RunRequest};
use promptgrid::model::{DEFAULT_KEY, OpenRouterCaller};
use promptgrid::run::{LoggingHandler, MatrixRunner};
use promptgrid::spec::{PromptSpecRegistry, builtin_builder};
use promptgrid::store::{JsonFileStore, NoopStore, Store};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Run a prompt-variant matrix (tone x length x format) and collect the
/// results.
#[derive(Parser)]
#[command(name = "promptgrid", version)]
struct Cli {
    /// Path to the JSON run request
    #[arg(long, required_unless_present_any = ["list_types", "print_schema"])]
    request: Option<PathBuf>,

    /// JSON file with additional output-type specs (object or array)
    #[arg(long)]
    specs: Option<PathBuf>,

    /// Write the final run state as JSON here instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,

    /// Persist the run (manifest + one file per cell) under this directory
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Print the assembled prompts for every cell; no model is called
    #[arg(long)]
    plan_only: bool,

    /// List registered output types and exit
    #[arg(long)]
    list_types: bool,

    /// Print the JSON Schema of the run request and exit
    #[arg(long)]
    print_schema: bool,

    /// Seconds allowed for each persistence write
    #[arg(long, default_value_t = 5)]
    store_timeout: u64,
}

fn load_registry(cli: &Cli) -> Result<PromptSpecRegistry, String> {
    let mut builder = builtin_builder();
    if let Some(path) = &cli.specs {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read specs file '{}': {e}", path.display()))?;
        builder = builder.extend_from_json(&json).map_err(|e| e.to_string())?;
    }
    builder.build().map_err(|e| e.to_string())
}

fn load_request(path: &PathBuf) -> Result<RunRequest, String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read request '{}': {e}", path.display()))?;
    let mut request = RunRequest::from_json(&json)
        .map_err(|e| format!("failed to parse request '{}': {e}", path.display()))?;

    // Fall back to OPENROUTER_KEY for models no request key covers.
    let uncovered = !request.models.models_without_key().is_empty();
    if uncovered && let Ok(key) = std::env::var("OPENROUTER_KEY") {
        request.models.api_keys.insert(DEFAULT_KEY.to_string(), key);
    }
    Ok(request)
}

fn print_plan(runner: &MatrixRunner<'_>, request: &RunRequest) -> Result<(), String> {
    let plans = runner.plan(request).map_err(|e| e.to_string())?;
    let total = plans.len();
    for (i, (cell, plan)) in plans.into_iter().enumerate() {
        println!("=== cell {}/{total}: {} ===", i + 1, cell.label());
        match plan {
            Ok(plan) => {
                println!("--- system ---\n{}\n", plan.system_prompt);
                println!("--- user ---\n{}\n", plan.user_prompt);
            }
            Err(e) => println!("(assembly failed: {e})\n"),
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), String> {
    if cli.print_schema {
        let schema = serde_json::to_string_pretty(&RunRequest::json_schema())
            .map_err(|e| format!("failed to render schema: {e}"))?;
        println!("{schema}");
        return Ok(());
    }

    let registry = load_registry(&cli)?;
    if cli.list_types {
        for spec in registry.specs() {
            println!("{:<12} {} (v{})", spec.id, spec.metadata.label, spec.version);
        }
        return Ok(());
    }

    let Some(request_path) = &cli.request else {
        return Err("--request is required".to_string());
    };
    let request = load_request(request_path)?;

    let caller = OpenRouterCaller::new().map_err(|e| e.to_string())?;
    let file_store = match &cli.store_dir {
        Some(dir) => Some(
            JsonFileStore::new(dir)
                .map_err(|e| format!("failed to create store dir '{}': {e}", dir.display()))?,
        ),
        None => None,
    };
    let store: &dyn Store = match &file_store {
        Some(s) => s,
        None => &NoopStore,
    };

    let config = EngineConfig::default().with_store_timeout(Duration::from_secs(cli.store_timeout));
    let runner = MatrixRunner::new(&registry, &caller)
        .with_config(config)
        .with_progress_handler(&LoggingHandler)
        .with_store(store);

    if cli.plan_only {
        return print_plan(&runner, &request);
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received; cancelling remaining cells");
            signal_token.cancel();
        }
    });

    let state = runner.run(&request, &cancel).await.map_err(|e| e.to_string())?;
    let json = serde_json::to_string_pretty(&state)
        .map_err(|e| format!("failed to serialize results: {e}"))?;
    match &cli.out {
        Some(path) => {
            std::fs::write(path, json)
                .map_err(|e| format!("failed to write '{}': {e}", path.display()))?;
            info!("Results written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
