//! # Acquisition Configuration Validator
//!
//! Command-line tool for validating acquisition configuration files across
//! environments. Loads the same layered configuration the pipeline loads at
//! startup and prints the effective task defaults, domain policies and worker
//! settings.

use acquisition_core::config::{AcquisitionConfig, ConfigManager};
use acquisition_core::resilience::DomainPolicy;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate acquisition configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment overlay to apply (development, test, production, ...)
    #[arg(short, long)]
    environment: Option<String>,

    /// Base configuration file (default: config/acquisition.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate and print every section
    All,

    /// Validate and print one section (tasks, rate-limits, worker)
    Component { name: String },

    /// Print the effective rate limit policy for a domain
    Policy { domain: String },

    /// Print the fully merged configuration as JSON
    Dump,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = load(&cli).and_then(|manager| match &cli.command {
        Some(Commands::All) | None => show_all(&manager),
        Some(Commands::Component { name }) => show_component(manager.config(), name),
        Some(Commands::Policy { domain }) => show_policy(manager.config(), domain),
        Some(Commands::Dump) => dump(manager.config()),
    });

    match result {
        Ok(()) => {
            info!("Configuration validation completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {e:#}");
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> Result<std::sync::Arc<ConfigManager>> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(ConfigManager::default_config_path);
    let environment = cli
        .environment
        .clone()
        .unwrap_or_else(ConfigManager::detect_environment);

    println!("🔧 Validating Acquisition Configuration");
    println!("Environment: {environment}");
    println!("Config File: {}", path.display());
    println!();

    ConfigManager::load_from_path_with_env(&path, &environment)
        .with_context(|| format!("failed to load {}", path.display()))
}

fn show_all(manager: &ConfigManager) -> Result<()> {
    let config = manager.config();
    show_tasks(config);
    show_rate_limits(config);
    show_worker(config);
    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn show_component(config: &AcquisitionConfig, name: &str) -> Result<()> {
    match name.to_lowercase().as_str() {
        "tasks" => show_tasks(config),
        "rate_limits" | "rate-limits" => show_rate_limits(config),
        "worker" => show_worker(config),
        _ => bail!("Unknown component: {name}"),
    }
    println!("✅ Component '{name}' validation passed!");
    Ok(())
}

fn show_tasks(config: &AcquisitionConfig) {
    println!("🧾 Task Defaults");
    println!("   ✅ Seed: {}", config.tasks.seed);
    println!("   ✅ Max attempts: {}", config.tasks.max_attempts);
}

fn show_rate_limits(config: &AcquisitionConfig) {
    println!("🚦 Rate Limits");
    print_policy("   default", &config.rate_limits.default);
    for entry in &config.rate_limits.domains {
        print_policy(&format!("   {}", entry.domain), &entry.policy);
    }
}

fn show_worker(config: &AcquisitionConfig) {
    println!("👷 Worker");
    println!("   ✅ Pool size: {}", config.worker.pool_size);
    println!("   ✅ Poll interval: {}ms", config.worker.poll_interval_ms);
    println!(
        "   ✅ Error requeue delay: {}s",
        config.worker.error_requeue_delay_seconds
    );
}

fn show_policy(config: &AcquisitionConfig, domain: &str) -> Result<()> {
    let overridden = config.rate_limits.domains.iter().any(|d| d.domain == domain);
    println!(
        "🔍 Effective policy for {domain} ({})",
        if overridden { "override" } else { "default" }
    );
    print_policy("  ", &config.rate_limits.policy_for(domain));
    Ok(())
}

fn dump(config: &AcquisitionConfig) -> Result<()> {
    let rendered = serde_json::to_string_pretty(config).context("failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}

fn print_policy(label: &str, policy: &DomainPolicy) {
    println!(
        "{label}: cap={} min_delay={}s backoff={}s..{}s budget={}/{}s",
        policy.concurrency_cap,
        policy.min_delay_seconds,
        policy.error_backoff_seconds,
        policy.max_backoff_seconds,
        policy.budget_per_window,
        policy.window_seconds
    );
}
