//! Local script execution command.

use std::path::Path;

use anyhow::{Context, Result};
use autocd_config::{AppConfig, load_config};
use autocd_core::classify::LineLevel;
use autocd_executor::{EnvVars, ExecutionResult, ScriptExecutor};

/// Run `script` once and report the result. Returns the process exit code.
pub async fn run(
    script: &str,
    config_path: Option<&Path>,
    env: EnvVars,
    json: bool,
) -> Result<i32> {
    let config = match config_path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => AppConfig::default(),
    };

    let executor = ScriptExecutor::new(config.executor_config());
    let script_path = executor.resolve_script(script)?;
    if !json {
        println!("Running {}", script_path.display());
    }

    let result = executor
        .execute(script, env)
        .await
        .with_context(|| format!("Failed to run script: {}", script))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(result.exit_code)
}

fn print_result(result: &ExecutionResult) {
    for line in &result.logs {
        let marker = match line.level {
            LineLevel::Info => " ",
            LineLevel::Error => "!",
        };
        println!(
            "{} {} [{}] {}",
            line.timestamp.format("%H:%M:%S%.3f"),
            marker,
            line.stream,
            line.content
        );
    }

    let elapsed = result.finished_at - result.started_at;
    println!();
    println!("Run:      {}", result.run_id);
    println!("Outcome:  {:?}", result.outcome);
    println!("Exit:     {}", result.exit_code);
    println!("Duration: {}ms", elapsed.num_milliseconds());
    if let Some(error) = &result.error {
        println!("Error:    {}", error);
    }
}
