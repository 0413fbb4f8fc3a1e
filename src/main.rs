//! autocache CLI - Plan prompt-cache breakpoints for Messages API requests

use anyhow::{Context, Result};
use autocache::{
    api::{plan_and_send, MessagesRequest, UpstreamClient},
    cache::{CachePlanner, PlanMetadata, Strategy},
    config::{Config, ConfigError},
    logging::{init_tracing, TracingLogger},
};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "autocache")]
#[command(about = "Place cache_control breakpoints on Anthropic Messages API requests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (overrides the config file)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Config file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate a request with cache breakpoints and print it
    Plan {
        /// Request JSON file, or - for stdin
        #[arg(short, long)]
        input: PathBuf,

        /// conservative, moderate or aggressive
        #[arg(short, long)]
        strategy: Option<Strategy>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Annotate a request and forward it upstream
    Send {
        /// Request JSON file, or - for stdin
        #[arg(short, long)]
        input: PathBuf,

        /// conservative, moderate or aggressive
        #[arg(short, long)]
        strategy: Option<Strategy>,
    },

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Initialize configuration file with defaults
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Show {
        /// Show only one section (upstream, planner, logging)
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Plan {
            input,
            strategy,
            output,
        } => {
            let config = load_and_init(&cli.config, &config_path, log_level)?;
            run_plan(config, &input, strategy, output)?;
        }
        Commands::Send { input, strategy } => {
            let config = load_and_init(&cli.config, &config_path, log_level)?;
            run_send(config, &input, strategy).await?;
        }
        Commands::Config(cmd) => {
            init_tracing(log_level.unwrap_or("warn"))?;
            run_config_command(cmd, config_path)?;
        }
    }

    Ok(())
}

/// Load config, then install logging at the CLI level or the configured one
fn load_and_init(
    explicit: &Option<PathBuf>,
    path: &Path,
    log_level: Option<&str>,
) -> Result<Config> {
    let config = load_config(explicit, path)?;
    init_tracing(log_level.unwrap_or(&config.logging.level))?;
    Ok(config)
}

/// An explicitly named config file must exist; the default one may not.
fn load_config(explicit: &Option<PathBuf>, path: &Path) -> Result<Config, ConfigError> {
    if explicit.is_some() && !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    Config::load_from(path.to_path_buf())
}

fn read_request(input: &Path) -> Result<MessagesRequest> {
    let body = if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", input.display()))?
    };
    Ok(MessagesRequest::from_json(&body)?)
}

fn build_planner(mut config: Config, strategy: Option<Strategy>) -> Result<CachePlanner> {
    if let Some(strategy) = strategy {
        config.planner.strategy = strategy;
    }
    config.validate()?;
    Ok(CachePlanner::from_config(&config, Arc::new(TracingLogger))?)
}

fn print_plan_summary(metadata: &PlanMetadata) {
    eprint!("{}", metadata);

    let roi = metadata.roi();
    if let Some(hits) = roi.break_even_hits {
        eprintln!(
            "Write premium: ~{:.0} tokens, saves ~{:.0} per hit, pays off after {} hit(s)",
            roi.write_premium_tokens, roi.savings_per_hit_tokens, hits
        );
    }

    eprintln!();
    for (name, value) in metadata.headers() {
        eprintln!("{}: {}", name, value);
    }
}

fn run_plan(
    config: Config,
    input: &Path,
    strategy: Option<Strategy>,
    output: Option<PathBuf>,
) -> Result<()> {
    let planner = build_planner(config, strategy)?;
    let mut request = read_request(input)?;

    let metadata = planner.plan(&mut request)?;
    let annotated = serde_json::to_string_pretty(&request)?;

    match output {
        Some(path) => {
            std::fs::write(&path, annotated)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("annotated request written to {}", path.display());
        }
        None => println!("{}", annotated),
    }

    print_plan_summary(&metadata);
    Ok(())
}

async fn run_send(config: Config, input: &Path, strategy: Option<Strategy>) -> Result<()> {
    let client = UpstreamClient::from_config(&config)?;
    let planner = build_planner(config, strategy)?;
    let request = read_request(input)?;

    info!("forwarding to {}", client.url());
    let (response, metadata) = plan_and_send(&planner, &client, request).await?;

    println!("{}", response.text());
    print_plan_summary(&metadata);

    let usage = response.usage;
    eprintln!();
    eprintln!("=== Usage ===");
    eprintln!("Input tokens: {}", usage.input_tokens);
    eprintln!("Output tokens: {}", usage.output_tokens);
    eprintln!(
        "Cache write: {}",
        usage.cache_creation_input_tokens.unwrap_or(0)
    );
    if let Some(split) = usage.cache_creation {
        eprintln!(
            "  5m: {}, 1h: {}",
            split.ephemeral_5m_input_tokens, split.ephemeral_1h_input_tokens
        );
    }
    eprintln!("Cache read: {}", usage.cache_read_input_tokens.unwrap_or(0));
    eprintln!("Cache hit ratio: {:.1}%", usage.cache_hit_ratio() * 100.0);

    Ok(())
}

fn run_config_command(cmd: ConfigCommands, path: PathBuf) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => {
            config_init(&path, force)?;
        }
        ConfigCommands::Show { section } => {
            config_show(&path, section)?;
        }
        ConfigCommands::Path => {
            config_path(&path);
        }
        ConfigCommands::Validate => {
            config_validate(&path)?;
        }
    }
    Ok(())
}

fn config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Configuration file already exists at: {}", path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    Config::default().save_to(path.to_path_buf())?;

    println!("Configuration file created at: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file to add your API key, or");
    println!("  2. Set the environment variable:");
    println!("     export ANTHROPIC_API_KEY=your_anthropic_key");

    Ok(())
}

fn config_show(path: &Path, section: Option<String>) -> Result<()> {
    let config = Config::load_from(path.to_path_buf())?;

    // Mask API key in display
    let mut display_config = config;
    if display_config.upstream.api_key.is_some() {
        display_config.upstream.api_key = Some("***".to_string());
    }

    let display = if let Some(sec) = section {
        match sec.to_lowercase().as_str() {
            "upstream" => toml::to_string_pretty(&display_config.upstream)?,
            "planner" => toml::to_string_pretty(&display_config.planner)?,
            "logging" => toml::to_string_pretty(&display_config.logging)?,
            _ => {
                println!("Unknown section: {}", sec);
                println!("Available: upstream, planner, logging");
                return Ok(());
            }
        }
    } else {
        toml::to_string_pretty(&display_config)?
    };

    println!("{}", display);

    println!("\n--- Environment Variables ---");
    for name in ["ANTHROPIC_API_KEY", "ANTHROPIC_BASE_URL", "AUTOCACHE_STRATEGY", "AUTOCACHE_LOG_LEVEL"] {
        let state = if std::env::var(name).is_ok() { "set" } else { "not set" };
        println!("{}: {}", name, state);
    }

    Ok(())
}

fn config_path(path: &Path) {
    println!("{}", path.display());

    if path.exists() {
        println!("(file exists)");
    } else {
        println!("(file does not exist - run 'config init' to create)");
    }
}

fn config_validate(path: &Path) -> Result<()> {
    let config = Config::load_from(path.to_path_buf())?;

    match config.validate() {
        Ok(()) => {
            println!("Configuration is valid!");
            println!();
            println!("Upstream: {}", config.upstream.base_url);
            match config.api_key() {
                Some(_) => println!("API key: set"),
                None => println!("API key: NOT SET (plan works, send will fail)"),
            }
            println!(
                "Planner: {} strategy, {:?} token estimator",
                config.planner.strategy, config.planner.token_estimator
            );
            println!(
                "Stability signals: {}",
                config.planner.stability_signals.join(", ")
            );
        }
        Err(e) => {
            println!("Configuration validation failed:");
            println!("  {}", e);
            println!();
            println!("Edit {} or run 'autocache config init --force'", path.display());
        }
    }

    Ok(())
}
