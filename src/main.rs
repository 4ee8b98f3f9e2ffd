use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use e2b_mcp::config::Config;
use e2b_mcp::mcp::McpServer;
use e2b_mcp::sandbox::e2b::E2bProvider;
use e2b_mcp::sandbox::SandboxRegistry;
use e2b_mcp::tools::ToolDispatcher;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Upper bound on how long the runtime waits for blocked stdio threads
/// after the server has finished.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Parser)]
#[command(
    name = "e2b-mcp",
    version,
    about = "MCP server exposing E2B cloud sandboxes as code-execution tools"
)]
struct Cli {
    /// Path to a TOML config file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log filter, e.g. `debug` or `e2b_mcp=trace`. `RUST_LOG` takes precedence.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand, PartialEq, Eq)]
enum Command {
    /// Serve MCP over stdin/stdout (default)
    Serve,
    /// Print the tool catalog as JSON
    Tools,
    /// Print the JSON Schema of the config file
    ConfigSchema,
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = init_tracing(cli.log_level.as_deref());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("e2b-mcp: failed to start async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cli, filter));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("e2b-mcp error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; stdout carries protocol frames. Unless `RUST_LOG` or
/// `--log-level` pins it, the filter is provisional until the config file has
/// been read, and the returned handle swaps it.
fn init_tracing(cli_level: Option<&str>) -> Option<FilterHandle> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some() || cli_level.is_some();
    let filter = from_env.unwrap_or_else(|| EnvFilter::new(cli_level.unwrap_or("info")));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();

    (!pinned).then_some(handle)
}

async fn run(cli: Cli, filter: Option<FilterHandle>) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    if let Some(handle) = filter {
        match EnvFilter::try_new(&config.log_level) {
            Ok(level) => {
                if let Err(e) = handle.reload(level) {
                    tracing::warn!(error = %e, "failed to apply configured log level");
                }
            }
            Err(e) => {
                tracing::warn!(
                    log_level = %config.log_level,
                    error = %e,
                    "invalid log level, keeping info"
                );
            }
        }
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Tools => {
            let dispatcher = build_dispatcher(&config)?;
            println!("{}", serde_json::to_string_pretty(&dispatcher.definitions())?);
            Ok(())
        }
        Command::ConfigSchema => {
            println!("{}", serde_json::to_string_pretty(&Config::json_schema())?);
            Ok(())
        }
    }
}

fn build_dispatcher(config: &Config) -> anyhow::Result<ToolDispatcher> {
    let provider = Arc::new(E2bProvider::new(&config.e2b)?);
    let registry = Arc::new(SandboxRegistry::new(provider, config.sandbox.limits()));
    Ok(ToolDispatcher::new(registry))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    if config.e2b.api_key.is_empty() {
        tracing::warn!("E2B_API_KEY is not set; sandbox creation will fail");
    }

    let dispatcher = Arc::new(build_dispatcher(&config)?);
    let registry = Arc::clone(dispatcher.registry());
    let server = McpServer::new(dispatcher)
        .with_shutdown_grace(Duration::from_secs(config.server.shutdown_grace_secs));

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        max_sandboxes = config.sandbox.max_sandboxes,
        template = %config.e2b.template,
        "starting e2b-mcp"
    );

    let served = server
        .serve(tokio::io::stdin(), tokio::io::stdout(), shutdown_signal())
        .await;

    let report = registry.cleanup_all().await;
    if !report.failed.is_empty() {
        tracing::warn!(failed = ?report.failed, "some sandboxes could not be terminated");
    }
    tracing::info!("e2b-mcp stopped");

    served.map_err(Into::into)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
