use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use prism_core::{
    AnthropicProvider, GoogleProvider, ModelRouter, OpenAiProvider, ResponsePanel, Selector,
};
use prism_gateway::GatewayServer;

mod config;

use config::PrismConfig;

#[derive(Parser)]
#[command(name = "prism")]
#[command(version)]
#[command(about = "Prism: stream one prompt from GPT, Claude or Gemini")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the prompt page
    Serve {
        /// Listen on all interfaces instead of loopback
        #[arg(long)]
        share: bool,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Stream one answer to the terminal
    Ask {
        /// Model to ask: GPT, Claude or Gemini
        #[arg(short, long, default_value = "GPT")]
        model: String,

        /// The prompt to send
        prompt: String,
    },

    /// List the selectable models
    Models,

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before anything reads the environment, RUST_LOG and API keys included
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // RUST_LOG wins over --debug; logs go to stderr so `ask` output stays clean
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match dotenv {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Ignoring .env file: {}", e),
    }

    match cli.command {
        Commands::Serve { share, port } => cmd_serve(&cli.config, share, port).await,
        Commands::Ask { model, prompt } => cmd_ask(&cli.config, &model, &prompt).await,
        Commands::Models => cmd_models(&cli.config),
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
    }
}

/// Register one adapter per selector, sharing a single HTTP client
fn build_router(cfg: &PrismConfig) -> Result<ModelRouter> {
    let client = prism_core::build_http_client().context("Failed to build HTTP client")?;
    let system = cfg.system_instruction.as_str();

    for selector in Selector::ALL {
        if cfg.providers.get(selector).api_key.is_empty() {
            warn!(
                "No API key for {} (set {}); requests to it will fail",
                selector,
                config::key_env_var(selector)
            );
        }
    }

    Ok(ModelRouter::builder()
        .source(
            Selector::Gpt,
            Arc::new(OpenAiProvider::new(
                client.clone(),
                &cfg.provider_settings(Selector::Gpt),
                system,
            )),
        )
        .source(
            Selector::Claude,
            Arc::new(AnthropicProvider::new(
                client.clone(),
                &cfg.provider_settings(Selector::Claude),
                system,
            )),
        )
        .source(
            Selector::Gemini,
            Arc::new(GoogleProvider::new(
                client,
                &cfg.provider_settings(Selector::Gemini),
                system,
            )),
        )
        .build())
}

async fn cmd_serve(config_path: &Option<PathBuf>, share: bool, port: Option<u16>) -> Result<()> {
    let cfg = PrismConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let addr = cfg.gateway.bind_addr(share, port)?;
    if addr.ip().is_unspecified() {
        info!("Sharing enabled: the page is reachable from other machines");
    }

    GatewayServer::new(addr, Arc::new(router))
        .run(async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl-C, shutting down");
        })
        .await
}

async fn cmd_ask(config_path: &Option<PathBuf>, model: &str, prompt: &str) -> Result<()> {
    let cfg = PrismConfig::load(config_path)?;
    let router = build_router(&cfg)?;
    let stream = router.route(prompt, model)?;

    let mut panel = TerminalPanel::new(std::io::stdout());
    let summary = prism_core::bind(stream, &mut panel).await?;
    panel.finish().context("Failed to write to stdout")?;
    info!("Received {} snapshots from {}", summary.snapshots, model);
    Ok(())
}

fn cmd_models(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = PrismConfig::load(config_path)?;
    for selector in Selector::ALL {
        let settings = cfg.provider_settings(selector);
        let key = if settings.api_key.is_empty() {
            "no key"
        } else {
            "key set"
        };
        println!(
            "{:<8} {:<10} {:<28} ({})",
            selector.label(),
            selector.provider(),
            settings.model,
            key
        );
    }
    Ok(())
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
        return Ok(());
    }

    tokio::fs::write(&config_path, config::DEFAULT_CONFIG).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    info!("Created default config at {}", config_path.display());

    println!("Prism initialized at {}", config_dir.display());
    println!(
        "Export OPENAI_API_KEY, ANTHROPIC_API_KEY and GEMINI_API_KEY, or edit {}.",
        config_path.display()
    );
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = PrismConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

/// Writes each snapshot's new suffix so the terminal shows the answer growing in place
struct TerminalPanel<W> {
    out: W,
    shown: String,
}

impl<W: Write> TerminalPanel<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            shown: String::new(),
        }
    }

    fn finish(&mut self) -> std::io::Result<()> {
        if !self.shown.ends_with('\n') {
            writeln!(self.out)?;
        }
        self.out.flush()
    }
}

#[async_trait]
impl<W: Write + Send> ResponsePanel for TerminalPanel<W> {
    async fn replace(&mut self, markdown: &str) -> prism_core::Result<()> {
        let written = match markdown.strip_prefix(self.shown.as_str()) {
            Some(suffix) => write!(self.out, "{}", suffix),
            // Not an extension of what is on screen: start over on a fresh line
            None => write!(self.out, "\n{}", markdown),
        };
        written
            .and_then(|_| self.out.flush())
            .map_err(|e| prism_core::Error::Panel(e.to_string()))?;
        self.shown = markdown.to_string();
        Ok(())
    }
}
