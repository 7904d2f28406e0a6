//! PotterBuddy - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use potterbuddy::{
    bootstrap::{self, BootstrapStatus, EXIT_CODE_SETUP_NEEDED},
    cli::{Action, Args, Commands, Verbosity},
    config::Config,
    doctor::Doctor,
    rag::{RAGPipeline, RequestOptions},
    repl::{ReplConfig, ReplSession},
    streaming::GroqClient,
    telemetry::{TelemetryCollector, TelemetryDisplay},
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(message) = args.validate() {
        eprintln!("{} {}", "Error:".red().bold(), message);
        std::process::exit(1);
    }

    init_logging(args.verbosity());

    let config = Config::load(args.config.as_deref())?;

    match args.action() {
        Action::Ask(question) => run_ask(&args, &config, &question).await?,
        Action::Repl => run_repl(&args, &config).await?,
        Action::Command(Commands::Doctor) => run_doctor(config).await?,
        Action::Command(Commands::Models) => list_models(&config).await?,
        Action::Command(Commands::Stats) => show_stats(&config).await?,
        Action::Command(Commands::Config) => show_config(&args, &config)?,
        Action::Command(Commands::Ask { .. }) | Action::Command(Commands::Start) => {
            unreachable!("resolved by Args::action")
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the verbosity flags
fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Exit with setup guidance unless the API key and store are usable
async fn ensure_ready(config: &Config) {
    let status = bootstrap::check(config).await;
    if status != BootstrapStatus::Ready {
        bootstrap::show_setup_instructions(&status, config);
        if status != BootstrapStatus::StoreEmpty {
            std::process::exit(EXIT_CODE_SETUP_NEEDED);
        }
    }
}

async fn load_pipeline(config: &Config, verbosity: Verbosity) -> Result<RAGPipeline> {
    let spinner = verbosity.show_progress().then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Opening the Hogwarts library...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let pipeline = bootstrap::build_pipeline(config, TelemetryCollector::new()).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    pipeline
}

async fn run_ask(args: &Args, config: &Config, question: &str) -> Result<()> {
    ensure_ready(config).await;
    let pipeline = load_pipeline(config, args.verbosity()).await?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let category = args.category_hint();
    let hint = category.map(|c| c.as_str());
    let options = RequestOptions::default();

    let response = if config.generator.streaming(args.stream) {
        let response = pipeline
            .respond_streaming(question, hint, &options, &cancel, |fragment| {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
            })
            .await;
        println!();
        match response.answer() {
            Some(answer) => {
                let footer = answer.text.strip_prefix(answer.body.as_str()).unwrap_or("");
                if !footer.trim().is_empty() {
                    println!("{}", footer.trim_start_matches('\n'));
                }
            }
            None => println!("{}", response.text().yellow()),
        }
        response
    } else {
        let response = pipeline.respond_with(question, hint, &options, &cancel).await;
        match response.answer() {
            Some(answer) => println!("{}", answer.text),
            None => println!("{}", response.text().yellow()),
        }
        response
    };

    if matches!(args.verbosity(), Verbosity::Verbose | Verbosity::VeryVerbose) {
        TelemetryDisplay::new(pipeline.telemetry().clone()).display_summary();
    }

    if response.is_fallback() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_repl(args: &Args, config: &Config) -> Result<()> {
    ensure_ready(config).await;
    let pipeline = Arc::new(load_pipeline(config, args.verbosity()).await?);

    let repl_config = ReplConfig {
        streaming: config.generator.streaming(args.stream),
        category: args.category_hint(),
        ..ReplConfig::with_default_history()
    };

    let mut session = ReplSession::new(pipeline, repl_config)?;
    session.run(VERSION).await
}

async fn run_doctor(config: Config) -> Result<()> {
    let doctor = Doctor::new(config);
    let checks = doctor.run_diagnostics().await;
    Doctor::display_results(&checks);

    std::process::exit(if Doctor::overall_status(&checks) { 0 } else { 1 });
}

async fn list_models(config: &Config) -> Result<()> {
    let client = match GroqClient::new(&config.generator) {
        Ok(client) => client,
        Err(_) => {
            bootstrap::show_setup_instructions(&BootstrapStatus::MissingApiKey, config);
            std::process::exit(EXIT_CODE_SETUP_NEEDED);
        }
    };

    println!("\nChecking Groq models...\n");

    match client.list_models().await {
        Ok(models) if models.is_empty() => {
            println!("The API returned no models.");
        }
        Ok(models) => {
            let configured = config.models();
            println!("Available models:");
            for model in models {
                if configured.contains(&model) {
                    println!("  • {} {}", model.green(), "(configured)".dimmed());
                } else {
                    println!("  • {}", model);
                }
            }
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            eprintln!("\nRun 'potterbuddy doctor' to diagnose the connection.");
            std::process::exit(1);
        }
    }
    println!();

    Ok(())
}

async fn show_stats(config: &Config) -> Result<()> {
    let store = bootstrap::build_store(&config.store)?;
    let count = store
        .count()
        .await
        .with_context(|| format!("Failed to count passages in {}", store.describe()))?;

    println!("\n{}", "📚 Library Statistics".bold());
    println!("{}", "=".repeat(50));
    println!("  Store:            {}", store.describe());
    println!("  Passages:         {}", count.to_string().green());
    println!("  Embedding model:  {}", config.embedder.model_id);
    println!("  Generator models: {}", config.models().join(", "));
    println!();

    Ok(())
}

fn show_config(args: &Args, config: &Config) -> Result<()> {
    let mut shown = config.clone();
    if let Some(key) = shown.generator.api_key.as_mut() {
        *key = mask_secret(key);
    }
    if let Some(key) = shown.store.api_key.as_mut() {
        *key = mask_secret(key);
    }

    let path = match &args.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };

    println!("\n{} {}\n", "PotterBuddy Configuration".bold(), format!("({})", path.display()).dimmed());
    println!("{}", toml::to_string_pretty(&shown).context("Failed to serialize config")?);

    let problems = config.validate();
    if !problems.is_empty() {
        println!("{}", "Problems:".yellow().bold());
        for problem in problems {
            println!("  • {}", problem.yellow());
        }
        println!();
    }

    Ok(())
}

fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{}****", prefix)
}
