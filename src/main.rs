//! Chat Router - Main entry point

use anyhow::{Context, Result};
use axum::http::Method;
use chat_router::{
    RouterConfig, ViewRegistry, api,
    metrics,
    urls::{Endpoint, Resolver},
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "chat-router")]
#[command(about = "URL routing and REST dispatch for a team chat server", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override API port
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "json")]
    log_format: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve HTTP (default)
    Serve,

    /// Print the compiled routing table
    Routes {
        /// Emit JSON instead of a text table
        #[arg(long)]
        json: bool,
    },

    /// Show which endpoint a request would reach
    Resolve {
        /// HTTP method, e.g. GET
        method: String,
        /// Request path, e.g. /json/users/me
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .json()
                .init();
        }
    }

    // Load configuration
    let mut config = RouterConfig::load(cli.config)?;

    // CLI overrides
    if let Some(port) = cli.port {
        config.api_port = port;
    }

    config.validate()?;

    tracing::info!(
        api_port = config.api_port,
        development = config.development,
        languages = config.languages.len(),
        webhooks = config.webhook_integrations.len(),
        extra_apps = config.extra_installed_apps.len(),
        "Configuration loaded"
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Routes { json } => print_routes(&config, json),
        Command::Resolve { method, path } => print_resolution(&config, &method, &path),
    }
}

async fn serve(config: RouterConfig) -> Result<()> {
    tracing::info!("Starting chat router");

    let prometheus_handle = metrics::setup_metrics()?;
    let views = ViewRegistry::with_builtins(&config);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));

    let state = api::AppState::new(config, views, prometheus_handle)
        .context("Failed to build routing table")?;
    let app = api::create_router(state);

    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("Shutdown complete");

    Ok(())
}

fn print_routes(config: &RouterConfig, json: bool) -> Result<()> {
    let resolver = Resolver::from_config(config).context("Failed to build routing table")?;
    let routes = resolver.describe();

    if json {
        println!("{}", serde_json::to_string_pretty(&routes)?);
        return Ok(());
    }

    for route in routes {
        let methods = if route.methods.is_empty() {
            "*".to_string()
        } else {
            route.methods.join(",")
        };
        println!(
            "{:<70} {:<9} {:<24} {}{}",
            route.pattern,
            route.kind,
            methods,
            route.views.join(" "),
            route
                .name
                .map(|name| format!("  [{}]", name))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn print_resolution(config: &RouterConfig, method: &str, path: &str) -> Result<()> {
    let resolver = Resolver::from_config(config).context("Failed to build routing table")?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", method))?;

    let Some(matched) = resolver.resolve(path) else {
        anyhow::bail!("No route matches {}", path);
    };

    let target = match matched.endpoint {
        Endpoint::View(id) => format!("view {}", id),
        Endpoint::Rest(methods) => match methods.binding(&method) {
            Some(binding) => format!("rest {} -> {}", method, binding.view),
            None => format!(
                "rest: {} not allowed (allowed: {})",
                method,
                chat_router::error::allow_header(&methods.allowed())
            ),
        },
        Endpoint::Page(page) => format!("page {}", page.template),
        Endpoint::Redirect { url, permanent } => {
            format!("redirect {} ({})", url, if *permanent { 301 } else { 302 })
        }
    };

    println!("route:    {}", matched.route);
    println!("target:   {}", target);
    if let Some(name) = matched.view_name() {
        println!("name:     {}", name);
    }
    if let Some(language) = &matched.language {
        println!("language: {}", language);
    }
    for (key, value) in &matched.kwargs {
        println!("kwarg:    {} = {}", key, value);
    }
    for arg in &matched.args {
        println!("arg:      {}", arg);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
