//! Bulwark CLI - inspect tool configuration and exercise the executor

use anyhow::Result;
use bulwark_core::prelude::*;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "bulwark")]
#[command(about = "Resilient tool execution CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to bulwark.toml plus BULWARK_* env)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config {
        /// Show the merged settings for one tool instead of the whole file
        #[arg(short, long)]
        tool: Option<String>,
    },
    /// Drive a synthetic flaky tool through the executor
    Simulate {
        /// Tool name
        #[arg(short, long, default_value = "demo")]
        tool: String,

        /// Number of executions
        #[arg(short = 'n', long, default_value_t = 10)]
        calls: u32,

        /// Fail every Nth invocation (0 = never)
        #[arg(long, default_value_t = 3)]
        fail_every: u32,

        /// Exceed the hard timeout on every Nth invocation (0 = never)
        #[arg(long, default_value_t = 0)]
        slow_every: u32,

        /// Number of distinct payloads to cycle through
        #[arg(long, default_value_t = 2)]
        distinct: u32,
    },
    /// Version information
    Version,
}

fn load_config(path: Option<PathBuf>) -> Result<BulwarkConfig> {
    let config = match path {
        Some(path) => BulwarkConfig::from_file(path)?,
        None => BulwarkConfig::load()?,
    };
    Ok(config)
}

async fn simulate(
    config: &BulwarkConfig,
    tool: &str,
    calls: u32,
    fail_every: u32,
    slow_every: u32,
    distinct: u32,
) -> Result<()> {
    let tool_config = config.config_for(tool)?;
    let metrics = Arc::new(PrometheusToolMetrics::new()?);
    let executor = ToolExecutor::builder()
        .metrics(metrics.clone())
        .logger(Arc::new(TracingAttemptLogger))
        .build();

    let invocations = AtomicU32::new(0);
    let overrun = tool_config.hard_timeout() + Duration::from_millis(50);
    let flaky = |payload: Value| {
        let n = invocations.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if slow_every > 0 && n % slow_every == 0 {
                tokio::time::sleep(overrun).await;
            }
            if fail_every > 0 && n % fail_every == 0 {
                anyhow::bail!("synthetic failure on invocation {}", n);
            }
            Ok::<_, anyhow::Error>(json!({ "invocation": n, "payload": payload }))
        }
    };

    tracing::info!(
        tool,
        calls,
        fail_every,
        slow_every,
        hard_timeout = ?tool_config.hard_timeout(),
        retry_count = tool_config.retry_count(),
        "starting simulation"
    );

    let cancel = CancelToken::new();
    let mut failed = 0u32;
    for i in 0..calls {
        let ctx = ToolContext::new(tool, uuid::Uuid::new_v4().to_string());
        let payload = json!({ "key": i % distinct.max(1) });
        match executor
            .execute(&ctx, &tool_config, flaky, payload, &cancel)
            .await
        {
            Ok(result) => println!(
                "call {:>3}: ok    cache_hit={} value={}",
                i + 1,
                result.is_cache_hit(),
                result.value
            ),
            Err(e) => {
                failed += 1;
                tracing::warn!(tool, call = i + 1, error = %e, "simulated call failed");
                println!("call {:>3}: error {}", i + 1, e);
            }
        }
    }

    tracing::info!(
        tool,
        calls,
        failed,
        invocations = invocations.load(Ordering::SeqCst),
        healthy = executor.is_healthy(tool),
        "simulation finished"
    );

    println!();
    println!("tool invocations: {}", invocations.load(Ordering::SeqCst));
    println!("healthy: {}", executor.is_healthy(tool));
    println!(
        "{}",
        serde_json::to_string_pretty(&executor.breakers().snapshot())?
    );
    println!();
    print!("{}", metrics.render()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("bulwark {}", env!("CARGO_PKG_VERSION"));
            println!("bulwark-core {}", bulwark_core::VERSION);
        }
        Commands::Config { tool } => {
            let config = load_config(cli.config)?;
            let rendered = match tool {
                Some(tool) => serde_json::to_string_pretty(&config.config_for(&tool)?)?,
                None => serde_json::to_string_pretty(&config)?,
            };
            println!("{}", rendered);
        }
        Commands::Simulate {
            tool,
            calls,
            fail_every,
            slow_every,
            distinct,
        } => {
            let config = load_config(cli.config)?;
            simulate(&config, &tool, calls, fail_every, slow_every, distinct).await?;
        }
    }

    Ok(())
}
