use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::batch::parse_files;
use cli::commands::Commands;
use cli::files::expand_paths;
use cli::render::{print_json, print_report};
use taskmill::cache::CacheStore;
use taskmill::config::{GlobalConfig, load_config};
use taskmill::context::ParsePriority;
use taskmill::domain::PluginType;
use taskmill::scheduler::PluginManager;

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskmill")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("taskmill.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &GlobalConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Parse {
            paths,
            plugin,
            priority,
            json,
        } => handle_parse_command(paths, *plugin, *priority, *json, cli.is_verbose(), config).await,
        Commands::Config => handle_config_command(config),
    }
}

async fn handle_parse_command(
    paths: &[String],
    plugin: Option<PluginType>,
    priority: ParsePriority,
    json: bool,
    verbose: bool,
    config: &GlobalConfig,
) -> Result<()> {
    let files = expand_paths(paths)?;
    if files.is_empty() {
        eyre::bail!("No documents matched {:?}", paths);
    }
    info!("Parsing {} files", files.len());

    let cache: Arc<dyn CacheStore> = config.build_cache();
    let manager = PluginManager::start(config.build_registry(), config.to_manager_config(), Some(cache));

    let reports = parse_files(&manager, &files, plugin, priority, config).await;

    if verbose {
        let snapshot = manager.snapshot().await?;
        for p in &snapshot.plugins {
            println!(
                "{} {} circuit={:?} calls={} success={:.0}% avg={}ms",
                "plugin".cyan(),
                p.plugin_type,
                p.circuit,
                p.stats.successes + p.stats.failures,
                p.stats.success_rate * 100.0,
                p.stats.average_latency_ms
            );
        }
    }
    manager.shutdown().await?;

    let failed = reports.iter().filter(|r| !r.result.is_success()).count();
    let total_tasks: usize = reports.iter().filter_map(|r| r.result.tasks()).map(<[_]>::len).sum();

    if json {
        print_json(&reports)?;
    } else {
        for report in &reports {
            print_report(report);
        }
        let summary = format!("{} files, {} tasks, {} failed", reports.len(), total_tasks, failed);
        if failed > 0 {
            println!("{}", summary.red());
        } else {
            println!("{}", summary.green());
        }
    }
    Ok(())
}

fn handle_config_command(config: &GlobalConfig) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
