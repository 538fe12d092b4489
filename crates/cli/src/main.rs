//! `formula-runner` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the HTTP server.
//! - `run`      — execute a formula JSON file once.
//! - `run-js`   — run a single script through the sandbox.
//! - `validate` — check a formula JSON file without running it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{ExecutorConfig, Formula, FormulaExecutor};
use nodes::{ReqwestClient, StepRunner};
use queue::{IsolateRunner, PoolConfig, SandboxPool};
use sandbox::{Bindings, SandboxLimits};

#[derive(Parser)]
#[command(
    name = "formula-runner",
    about = "Run formulas of HTTP and sandboxed script steps",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve {
        #[arg(long, env = "FORMULA_BIND", default_value = "0.0.0.0:8000")]
        bind: String,
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Execute a formula file and print the final step result.
    Run {
        /// Path to the formula JSON file.
        path: PathBuf,
        /// JSON passed to scripts as `input`; overrides the file's own.
        #[arg(long)]
        input: Option<String>,
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Run one script and print its execution result.
    RunJs {
        /// Script source. Read from `--file` when omitted.
        #[arg(conflicts_with = "file", required_unless_present = "file")]
        code: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Validate a formula file without running it.
    Validate {
        /// Path to the formula JSON file.
        path: PathBuf,
    },
}

/// Pool, sandbox and executor limits shared by every running command.
#[derive(Args, Debug, Clone)]
struct RuntimeArgs {
    /// Isolates allowed to run at once.
    #[arg(long, env = "FORMULA_MAX_WORKERS", default_value_t = queue::DEFAULT_MAX_WORKERS)]
    max_workers: usize,
    /// Per-script wall-clock limit.
    #[arg(long, env = "FORMULA_TIMEOUT_MS", default_value_t = 1000)]
    timeout_ms: u64,
    /// Per-script heap limit.
    #[arg(long, env = "FORMULA_MEMORY_MB", default_value_t = 100)]
    memory_mb: usize,
    /// Step visits allowed in one formula run.
    #[arg(long, env = "FORMULA_MAX_STEPS", default_value_t = 1000)]
    max_steps: usize,
    /// Timeout for outbound HTTP steps.
    #[arg(long, env = "FORMULA_HTTP_TIMEOUT_MS", default_value_t = 30_000)]
    http_timeout_ms: u64,
}

impl RuntimeArgs {
    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_workers: self.max_workers,
            limits: SandboxLimits::new(
                Duration::from_millis(self.timeout_ms),
                self.memory_mb * 1024 * 1024,
            ),
        }
    }

    fn executor(&self) -> Result<FormulaExecutor> {
        let pool = Arc::new(SandboxPool::new(self.pool_config(), Arc::new(IsolateRunner)));
        let http = ReqwestClient::new(Duration::from_millis(self.http_timeout_ms))
            .context("failed to build HTTP client")?;
        Ok(FormulaExecutor::new(
            StepRunner::new(Arc::new(http), pool),
            ExecutorConfig {
                max_steps: self.max_steps,
            },
        ))
    }
}

fn read_formula(path: &Path) -> Result<Formula> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid formula in {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, runtime } => {
            info!(max_workers = runtime.max_workers, "starting formula server on {bind}");
            let executor = Arc::new(runtime.executor()?);
            api::serve(&bind, api::AppState::new(executor)).await?;
        }
        Command::Run {
            path,
            input,
            runtime,
        } => {
            let formula = read_formula(&path)?;
            let input: Value = match input {
                Some(raw) => serde_json::from_str(&raw).context("--input is not valid JSON")?,
                None => formula.input.clone(),
            };
            let executor = runtime.executor()?;
            let result = executor.run(&formula, &input).await;
            executor.runner().pool().shutdown().await;

            let result = result?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Command::RunJs {
            code,
            file,
            runtime,
        } => {
            let code = match (code, file) {
                (Some(code), _) => code,
                (None, Some(file)) => std::fs::read_to_string(&file)
                    .with_context(|| format!("cannot read file {}", file.display()))?,
                (None, None) => bail!("either a script or --file is required"),
            };
            let source = Bindings::with_done().wrap(&code)?;
            let pool = SandboxPool::new(runtime.pool_config(), Arc::new(IsolateRunner));
            let result = pool.submit(source).await;
            pool.shutdown().await;

            let result = result?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Command::Validate { path } => {
            let formula = read_formula(&path)?;
            match engine::validate_formula(&formula) {
                Ok(entry) => {
                    println!(
                        "Formula is valid. Trigger '{}' starts at step '{}'.",
                        entry.trigger.name, entry.first_step.name
                    );
                }
                Err(e) => {
                    eprintln!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
