//! gitgate node - git hosting proxy with push audit logging.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gitgate_git::{decode_commit, split_frame, Command, PushEvent};
use gitgate_node::access::AccessList;
use gitgate_node::config::Config;
use gitgate_node::observability::{init_logging, LogFormat};
use gitgate_node::proxy::{create_router, AppState};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// gitgate - git hosting proxy with push audit logging
#[derive(Parser, Debug)]
#[command(name = "gitgate-node")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the proxy
    Serve(ServeArgs),

    /// Decode a captured git-receive-pack request body and print it as JSON
    Decode {
        /// File holding the raw request body
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Listen address (overrides the config file)
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Upstream base URL (overrides the config file)
    #[arg(long)]
    upstream: Option<String>,

    /// Access list path (overrides the config file)
    #[arg(long)]
    access_list: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

impl ServeArgs {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = Config::load_or_default(&self.config)?;

        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(upstream) = self.upstream {
            config.upstream = upstream;
        }
        if let Some(path) = self.access_list {
            config.access_list = path;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args.into_config()?),
        Commands::Decode { file } => decode(&file),
    }
}

fn serve(config: Config) -> anyhow::Result<()> {
    init_logging(&config.log_level, LogFormat::parse(&config.log_format));

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting gitgate node");
    tracing::info!(
        listen_addr = %config.listen_addr,
        upstream = %config.upstream,
        route_prefix = %config.route_prefix,
        access_list = %config.access_list.display(),
        "Node configuration"
    );

    let access = AccessList::load(&config.access_list).context("failed to load access list")?;
    let listen_addr = config.listen_addr;
    let state = AppState::new(config, access)?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("failed to bind {}", listen_addr))?;

        tracing::info!(addr = %listen_addr, "Listening");

        axum::serve(listener, create_router(state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn decode(file: &Path) -> anyhow::Result<()> {
    let body = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;

    let frame = split_frame(&body).context("not a git-receive-pack body")?;
    let command = Command::parse(frame.line).context("invalid command line")?;

    let commit = if command.is_delete() || frame.pack.is_empty() {
        None
    } else {
        match decode_commit(frame.pack) {
            Ok(commit) => Some(commit),
            Err(e) => {
                eprintln!("warning: no commit metadata: {}", e);
                None
            }
        }
    };

    let event = PushEvent::assemble(command, commit);
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}
