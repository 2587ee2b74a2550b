//! BucketSync CLI - Directory to S3 Prefix Synchronization
//!
//! Syncs the targets of a config file to their bucket prefixes, or clears
//! those prefixes again.

use anyhow::Context;
use bucketsync::config::{CliArgs, Commands, ConfigFile, LogFormat};
use bucketsync::core::{DeployRunner, SchedulerConfig, SyncEngine};
use bucketsync::progress::{DotTicker, NoProgress, ProgressListener, ProgressReporter};
use bucketsync::storage::S3Store;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(&args);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    // Handle result
    if let Err(e) = runtime.block_on(run(args)) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(args: &CliArgs) {
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(args: CliArgs) -> anyhow::Result<()> {
    let mut config = ConfigFile::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    if let Some(concurrency) = args.concurrency {
        config.settings.concurrency = concurrency;
        config.settings.validate()?;
    }

    if config.targets.is_empty() {
        tracing::warn!("No targets configured in {}", args.config.display());
        return Ok(());
    }

    let store = Arc::new(S3Store::connect(&config.settings).await);
    let engine = SyncEngine::new(store, SchedulerConfig::from_settings(&config.settings));

    let listener: Box<dyn ProgressListener> = if args.quiet {
        Box::new(NoProgress)
    } else if args.progress {
        Box::new(ProgressReporter::new())
    } else {
        Box::new(DotTicker::new())
    };

    let runner = DeployRunner::new(&engine, &config.targets, listener.as_ref()).quiet(args.quiet);

    match args.command {
        Commands::Sync {
            phase,
            dry_run: true,
        } => {
            println!("=== Dry Run Mode ===");
            println!("No objects will be uploaded or deleted.");
            for (destination, plan) in runner.plan(phase).await? {
                println!("\n{}", destination);
                plan.print_summary();
                plan.print_actions();
            }
        }
        Commands::Sync {
            phase,
            dry_run: false,
        } => {
            let summaries = runner.run(phase).await?;
            if args.verbose > 0 && !args.quiet {
                for summary in &summaries {
                    println!("\n{}", summary.target);
                    summary.report.print_summary();
                }
            }
        }
        Commands::Clear { dry_run: true } => {
            println!("=== Dry Run Mode ===");
            println!("No objects will be deleted.");
            for (destination, plan) in runner.plan_clear().await? {
                println!("\n{}", destination);
                plan.print_actions();
            }
        }
        Commands::Clear { dry_run: false } => {
            let summaries = runner.clear_all().await?;
            if args.verbose > 0 && !args.quiet {
                for summary in &summaries {
                    println!("\n{}", summary.target);
                    summary.report.print_summary();
                }
            }
        }
    }

    Ok(())
}
