// Stencil CLI entry point

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use stencil_engine::{lifecycle, EngineConfig, TemplateEngine};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "stencil", version, about = "Render templates from a template root")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON); STENCIL_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Template root, overriding the configuration
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render a named template to stdout
    Render {
        name: String,

        /// Render data as inline JSON, or @path to read it from a file
        #[arg(short, long)]
        data: Option<String>,
    },
    /// Compile a named template and report problems
    Check { names: Vec<String> },
    /// Report whether a template resource exists
    Exists { name: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = run(cli).await;
    lifecycle::teardown();

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let engine = lifecycle::initialize(load_config(cli.config.as_deref(), cli.root)?)
        .context("failed to initialize template engine")?;
    debug!(version = engine.version(), "engine initialized");

    match cli.command {
        Command::Render { name, data } => {
            let data = parse_data(data.as_deref())?;
            let output = engine
                .render(&name, &data)
                .await
                .with_context(|| format!("failed to render {name}"))?;
            print!("{output}");
        }
        Command::Check { names } => check(&engine, &names).await?,
        Command::Exists { name } => {
            if !engine.exists(&name).await {
                bail!("{name} does not exist");
            }
            println!("{name} exists");
        }
    }
    Ok(())
}

async fn check(engine: &TemplateEngine, names: &[String]) -> Result<()> {
    let mut failures = 0;
    for name in names {
        match engine.get_template(name).await {
            Ok(template) => println!(
                "ok      {} ({})",
                template.name().unwrap_or(name),
                template.generation()
            ),
            Err(err) => {
                failures += 1;
                println!("failed  {name}: {err}");
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} templates failed", names.len());
    }
    Ok(())
}

fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => EngineConfig::default(),
    };
    match root {
        Some(root) => Ok(config.into_builder().template_path(root).build()?),
        None => Ok(config),
    }
}

fn parse_data(data: Option<&str>) -> Result<Value> {
    let Some(data) = data else {
        return Ok(Value::Object(Default::default()));
    };
    let text = match data.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?,
        None => data.to_string(),
    };
    serde_json::from_str(&text).context("render data is not valid JSON")
}

fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::WARN,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
