use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use stack_gateway::{
    adapters::{HttpClientAdapter, HttpRpcClient, MemoryBroker, MemoryRegistry},
    config::{ConfigOverrides, GatewayConfig, GatewayConfigValidator, load_config},
    core::{Gateway, Service},
    ports::http_client::HttpClient,
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file; missing files fall back to defaults
    #[clap(short, long, env = "MICRO_API_CONFIG")]
    config: Option<String>,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate the effective configuration
    Validate,
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "gateway.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate) => {
            return validate_config_command(args.config.as_deref(), &args.overrides);
        }
        Some(Commands::Init { config }) => return init_config_command(&config).await,
        Some(Commands::Serve) | None => {}
    }

    let config = load_config(args.config.as_deref(), &args.overrides)?;
    tracing_setup::init_tracing(&config.log)?;

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            A provider was probably installed already; continuing.",
            e
        );
    }

    let config = Arc::new(config);
    tracing::info!(
        server = %config.server_name,
        address = %config.address,
        handler = %config.handler,
        resolver = %config.resolver,
        namespace = %config.namespace,
        "starting stack gateway"
    );

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);
    let registry = Arc::new(MemoryRegistry::with_services(config.services.clone()).await);
    let rpc_client = Arc::new(
        HttpRpcClient::new(http_client.clone(), &config.header_prefix, "/")
            .context("Failed to create RPC client")?,
    );
    let service = Arc::new(Service::new(
        config.server_name.clone(),
        config.version.clone(),
        registry,
        rpc_client,
        Arc::new(MemoryBroker::default()),
        http_client,
    ));

    let server = Gateway::new(config.clone(), service.clone()).run().await?;
    if let Some(addr) = server.local_addr() {
        println!("Stack gateway listening on {addr}");
    }

    let graceful_shutdown = GracefulShutdown::new();
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let reason = graceful_shutdown.wait_for_shutdown_signal().await;
    tracing::info!(?reason, "shutdown signal received");

    service
        .lifecycle()
        .stop()
        .await
        .context("Failed to stop gateway")?;

    tracing_setup::shutdown_tracing();
    Ok(())
}

/// Validate the effective configuration and exit
fn validate_config_command(config_path: Option<&str>, overrides: &ConfigOverrides) -> Result<()> {
    match config_path {
        Some(path) => {
            println!("🔍 Validating configuration file: {path}");
            if !Path::new(path).exists() {
                eprintln!("❌ Error: Configuration file '{path}' not found");
                std::process::exit(1);
            }
        }
        None => println!("🔍 Validating configuration from defaults, flags and environment"),
    }

    let config: GatewayConfig = match load_config(config_path, overrides) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Address: {}", config.address);
            println!("   • Handler: {} on {}", config.handler, config.api_path);
            println!("   • Resolver: {} ({})", config.resolver, config.namespace);
            println!("   • RPC Enabled: {}", config.enable_rpc);
            println!("   • Stats Enabled: {}", config.enable_stats);
            println!(
                "   • Transport: {}",
                if config.enable_acme {
                    "acme"
                } else if config.enable_tls {
                    "tls"
                } else {
                    "plain"
                }
            );
            println!("   • Plugins: {:?}", config.plugins);
            println!("   • Services: {}", config.services.len());
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Use ':PORT' or 'IP:PORT' for the address");
            println!("   • Start api_path and rpc_path with '/'");
            println!("   • Set acme_hosts when enable_acme is true");
            println!("   • Point tls_cert_file and tls_key_file at existing files");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Stack Gateway Configuration

# The address to listen on; ':8080' binds every interface
address = ":8080"

# Request handler: api, event, http, proxy, rpc, web or meta
handler = "meta"
# Resolver: host, path, grpc or stack
resolver = "stack"
namespace = "stack.rpc.api"
api_path = "/"

# Mount the direct RPC handler on rpc_path
enable_rpc = false
rpc_path = "/rpc"

# Mount /stats and count every request
enable_stats = false

# Built-in plugins, outermost first:
# cors, request_id, security_headers, timing, compression
plugins = ["request_id", "timing"]

# Drain timeout for in-flight requests on shutdown
shutdown_timeout = "30s"

# Static TLS
# enable_tls = true
# tls_cert_file = "cert.pem"
# tls_key_file = "key.pem"

# ACME certificates (takes priority over static TLS)
# enable_acme = true
# acme_hosts = ["api.example.com"]
# acme_cache_dir = "./acme-cache"

[log]
format = "json"
level = "info"

# Services seeded into the in-memory registry
# [[services]]
# name = "stack.rpc.api.greeter"
# version = "1.0.0"
# endpoints = ["Greeter.Hello"]
# nodes = [{ id = "greeter-1", address = "127.0.0.1:9001" }]
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'stack-gateway --config {config_path}' to start the server");
    Ok(())
}
