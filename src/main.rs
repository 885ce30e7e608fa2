// Shop Gateway - Main Entry Point
//
// CLI for the multi-tenant Admin API gateway:
// - serve the webhook, health and metrics endpoints
// - encrypt / decrypt tenant secrets for the config file
// - sign payloads for local webhook testing
// - subscribe a shop to webhook topics

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shop_gateway::cancel::CancelToken;
use shop_gateway::config::{Config, DEFAULT_CONFIG_FILE, ENCRYPTION_KEY_ENV};
use shop_gateway::crypto::CredentialCipher;
use shop_gateway::webhooks::WebhookTopic;
use shop_gateway::{logging, server, webhooks};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Shop Gateway: multi-tenant Admin API access layer
#[derive(Parser, Debug)]
#[command(name = "shop-gateway")]
#[command(author = "Shop Gateway Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Multi-tenant Shopify Admin API gateway with rate limiting and webhook verification", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, env = "SHOP_GATEWAY_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook, health and metrics HTTP server
    Serve,
    /// Encrypt a secret for the tenants section of the config
    Encrypt {
        /// Plaintext secret
        plaintext: String,
    },
    /// Decrypt a stored secret
    Decrypt {
        /// Base64 blob produced by `encrypt`
        blob: String,
    },
    /// Compute the webhook signature header for a payload file
    Sign {
        /// Webhook secret
        #[arg(long)]
        secret: String,

        /// Payload file
        file: PathBuf,
    },
    /// Subscribe a shop to webhook topics for a configured tenant
    Subscribe {
        /// Tenant project id
        #[arg(long)]
        project: String,

        /// Tenant environment (default: production)
        #[arg(long, default_value = "")]
        environment: String,

        /// Shop domain, e.g. acme.myshopify.com
        #[arg(long)]
        shop: String,

        /// Shop access token
        #[arg(long, env = "SHOP_GATEWAY_ACCESS_TOKEN")]
        access_token: String,

        /// Public base URL of the webhook route, e.g. https://hooks.example.com/webhooks
        #[arg(long, env = "SHOP_GATEWAY_WEBHOOK_URL")]
        webhook_url: String,

        /// Topic to subscribe (repeatable; default set when omitted)
        #[arg(long = "topic")]
        topics: Vec<WebhookTopic>,
    },
    /// Validate the configuration and print a summary
    CheckConfig,
    /// Print a fresh base64 encryption key
    GenerateKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_from_path(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    logging::init(&config.logging, args.verbose)?;

    match args.command {
        Some(Commands::Serve) => {
            info!("Shop Gateway v{} starting...", env!("CARGO_PKG_VERSION"));
            server::serve(&config, cipher()?).await?;
        }
        Some(Commands::Encrypt { plaintext }) => {
            println!("{}", cipher()?.encrypt(&plaintext)?);
        }
        Some(Commands::Decrypt { blob }) => {
            println!("{}", cipher()?.decrypt(&blob)?);
        }
        Some(Commands::Sign { secret, file }) => {
            let body = fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            println!("{}", webhooks::sign(&body, &secret)?);
        }
        Some(Commands::Subscribe {
            project,
            environment,
            shop,
            access_token,
            webhook_url,
            topics,
        }) => {
            let topics = if topics.is_empty() {
                WebhookTopic::defaults()
            } else {
                topics
            };
            let gateway = server::build_gateway(&config, cipher()?);
            let client = gateway.client_for(&project, &environment, None).await?;
            let created = webhooks::subscribe_webhooks(
                &*client,
                &shop,
                &access_token,
                &topics,
                &webhook_url,
                &CancelToken::new(),
            )
            .await?;
            for subscription in created {
                match subscription.id {
                    Some(id) => println!("{} -> {} (id {})", subscription.topic, subscription.address, id),
                    None => println!("{} -> {}", subscription.topic, subscription.address),
                }
            }
        }
        Some(Commands::CheckConfig) => {
            check_config(&config);
        }
        Some(Commands::GenerateKey) => {
            println!("{}", CredentialCipher::generate_key());
        }
        None => {
            println!("No command specified. Use \"shop-gateway --help\" for usage.");
        }
    }

    Ok(())
}

fn cipher() -> Result<CredentialCipher> {
    let key = Config::encryption_key()?;
    CredentialCipher::from_base64_key(&key)
        .with_context(|| format!("{} is not a valid key", ENCRYPTION_KEY_ENV))
}

fn check_config(config: &Config) {
    println!("Configuration OK");
    println!("  Listen: {}", config.server.bind_address());
    println!(
        "  Rate limit: {} ({} requests / {}s)",
        if config.rate_limit.enabled { "enabled" } else { "disabled" },
        config.rate_limit.max_requests,
        config.rate_limit.window_secs
    );
    println!(
        "  Retry: {} retries, {:?} initial, {:?} max",
        config.retry.max_retries, config.retry.initial_delay, config.retry.max_delay
    );
    println!("  API version: {}", config.upstream.api_version);
    println!("  Tenants: {}", config.tenants.len());
    for tenant in &config.tenants {
        println!("    - {}", tenant.key());
    }
}
