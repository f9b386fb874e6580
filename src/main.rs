//! chat-proxy: moderating, token-budgeted proxy for chat completion APIs
//!
//! Accepts a conversation on a single POST route and:
//! - Rejects conversations over the token budget
//! - Runs the latest message through upstream moderation
//! - Injects the configured system prompt and model policy
//! - Streams the upstream completion back as server-sent events

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chat_proxy::{config::AppConfig, run_server, ProxyState, TiktokenCounter, TokenCounter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "chat-proxy")]
#[command(version = "0.1.0")]
#[command(about = "Moderating, token-budgeted proxy for chat completion APIs")]
#[command(long_about = "
chat-proxy serves a single chat route in front of an OpenAI-compatible provider:
  - Counts tokens for the conversation plus the injected system prompt
  - Checks the latest message with the moderation endpoint
  - Streams the completion back as server-sent events

The API key is read from the environment variable named by upstream.api_key_env
(OPENAI_KEY by default).

Example usage:
  chat-proxy run --config config.yaml
  chat-proxy count-tokens \"As a user I want to reset my password\"
")]
struct Cli {
    /// Path to config file (built-in defaults are used when omitted and no default file exists)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override upstream URL (e.g., "https://api.openai.com")
        #[arg(long)]
        upstream_url: Option<String>,
    },

    /// Validate configuration file
    CheckConfig,

    /// Count tokens the way the proxy budgets them
    CountTokens {
        /// Text to count
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter))
        .init();

    match cli.command {
        Commands::Run { port, upstream_url } => {
            run_proxy(cli.config.as_deref(), port, upstream_url).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config.as_deref());
        }
        Commands::CountTokens { text } => {
            count_tokens(cli.config.as_deref(), &text)?;
        }
    }

    Ok(())
}

/// Run the proxy server
async fn run_proxy(
    config_path: Option<&Path>,
    port_override: Option<u16>,
    upstream_url_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config_or_exit(config_path);

    if let Some(port) = port_override {
        config.server.port = port;
    }
    if let Some(url) = upstream_url_override {
        config.upstream.url = url;
        config.validate()?;
    }

    let api_key = config.upstream.resolve_api_key();
    let tokenizer = TiktokenCounter::for_model(&config.policy.model)?;

    let state = ProxyState::new(config, Arc::new(tokenizer), api_key)?;
    run_server(state).await?;

    Ok(())
}

/// Validate configuration file
fn check_config(config_path: Option<&Path>) {
    match AppConfig::load_or_default(config_path) {
        Ok(config) => {
            if let Err(e) = config.validate() {
                eprintln!("✗ Configuration error: {}", e);
                std::process::exit(1);
            }

            println!("✓ Configuration is valid\n");
            println!("Server:");
            println!("  Listen: {}:{}", config.server.host, config.server.port);
            println!("  Route: POST {}", config.server.route);
            println!("\nUpstream:");
            println!("  URL: {}", config.upstream.url);
            println!("  TLS: {}", if config.upstream.is_tls() { "enabled" } else { "disabled" });
            if let Some(ref tls) = config.upstream.tls {
                if tls.accept_invalid_certs {
                    println!("  TLS: Accepting invalid certificates");
                }
                if let Some(ref ca) = tls.ca_cert_path {
                    println!("  TLS CA: {}", ca);
                }
            }
            println!("  Read timeout: {}s", config.upstream.timeout_seconds);
            println!("  Moderation: {}", config.upstream.moderation_url());
            println!("  Completion: {}", config.upstream.completion_url());
            println!(
                "  API key: {} (env {})",
                if config.upstream.resolve_api_key().is_some() { "set" } else { "MISSING" },
                config.upstream.api_key_env
            );
            println!("\nPolicy:");
            println!("  Model: {}", config.policy.model);
            println!("  Temperature: {}", config.policy.temperature);
            println!("  Token limit: {}", config.policy.token_limit);
            println!("  System prompt: {} chars", config.policy.system_prompt.chars().count());
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the token count of `text` and of the configured system prompt
fn count_tokens(config_path: Option<&Path>, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(config_path);
    let tokenizer = TiktokenCounter::for_model(&config.policy.model)?;

    let text_tokens = tokenizer.count_tokens(text);
    let prompt_tokens = tokenizer.count_tokens(&config.policy.system_prompt);

    println!("Model:         {}", tokenizer.model_name());
    println!("Text:          {} tokens", text_tokens);
    println!("System prompt: {} tokens", prompt_tokens);
    println!(
        "Total:         {} / {} tokens",
        text_tokens + prompt_tokens,
        config.policy.token_limit
    );

    Ok(())
}

/// Load configuration or exit with error
fn load_config_or_exit(config_path: Option<&Path>) -> AppConfig {
    match AppConfig::load_or_default(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            eprintln!("\nYou can copy config.yaml.default and modify it:");
            eprintln!("  cp config.yaml.default config.yaml");
            std::process::exit(1);
        }
    }
}
