//! Minimal matrix example: two tones by two formats against OpenRouter.
//!
//! Prints one line per finished cell, then the blueprint of each
//! successful cell.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example basic_matrix
//! ```

use promptgrid::prelude::*;
use std::collections::BTreeMap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;

    let registry = builtin_registry()?;
    let caller = OpenRouterCaller::new()?;

    let request = RunRequest {
        inputs: GlobalInputs {
            brief: "Write a launch email for a habit-tracking app aimed at students.".into(),
            output_type: "copy".into(),
            ..Default::default()
        },
        axes: AxisSelection::new(["casual", "professional"], ["short"], ["paragraph", "bullets"]),
        models: RunModels {
            execution_model_id: "anthropic/claude-sonnet-4".into(),
            api_keys: BTreeMap::from([("default".to_string(), api_key)]),
            ..Default::default()
        },
        ..Default::default()
    };

    let progress = FnProgress::new(|done, total, result| {
        println!("[{done}/{total}] {} -> {:?}", result.config.label(), result.status);
    });

    let state = MatrixRunner::new(&registry, &caller)
        .with_progress_handler(&progress)
        .run(&request, &CancellationToken::new())
        .await?;

    for result in state.results().iter().filter(|r| r.is_success()) {
        println!("\n=== {} ===\n{}", result.config.label(), result.blueprint_result);
    }
    println!(
        "\n{} succeeded, {} failed",
        state.experiment.success_count, state.experiment.error_count
    );
    Ok(())
}
