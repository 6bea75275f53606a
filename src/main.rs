use anyhow::{Context, Result};
use arxiv_fulltext::config::{load_config, Config, LogFormat, StoreBackend};
use arxiv_fulltext::convert::PdfMarkdownConverter;
use arxiv_fulltext::mcp::McpServer;
use arxiv_fulltext::sources::ArxivSource;
use arxiv_fulltext::store::{MemoryStore, TaskStore};
use arxiv_fulltext::tasks::TaskManager;
use arxiv_fulltext::ui::{summary_line, TaskSpinner};
use arxiv_fulltext::utils::{HttpClient, RateGate};
use arxiv_fulltext::TaskStatus;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// arXiv full text - convert arXiv papers to Markdown as background tasks
#[derive(Parser, Debug)]
#[command(name = "arxiv-fulltext")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch arXiv papers and convert them to Markdown as pollable tasks", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv, -vvv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server (the default when no command is given)
    Serve {
        /// Serve streamable HTTP instead of stdio
        #[arg(long)]
        http: bool,

        /// Port for HTTP mode
        #[arg(long, short, default_value_t = 3000)]
        port: u16,

        /// Host to bind to for HTTP mode
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Convert one paper and print its Markdown to stdout
    #[command(alias = "c")]
    Convert {
        /// arXiv identifier or abs/pdf URL
        paper_id: String,

        /// Polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },

    /// Print a task as JSON (needs a durable backend to see other processes' tasks)
    Status {
        /// Task ID
        task_id: String,
    },

    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_tracing(&cli, &config);

    match cli.command {
        None => serve(&config, false, "127.0.0.1", 3000).await?,

        Some(Commands::Serve { http, port, host }) => serve(&config, http, &host, port).await?,

        Some(Commands::Convert { paper_id, poll_ms }) => {
            let manager = build_manager(&config).await?;
            let task_id = manager.create(&paper_id).await?;
            tracing::debug!(task_id = %task_id, "Polling task");

            let spinner = TaskSpinner::new(&format!("Converting {}", paper_id.trim()), cli.quiet);
            let interval = Duration::from_millis(poll_ms.max(10));
            let view = loop {
                let view = manager.get_status(&task_id).await?;
                spinner.update(&view);
                if view.status.is_terminal() {
                    break view;
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = tokio::signal::ctrl_c() => {
                        manager.shutdown();
                        spinner.finish_with_error("Interrupted");
                        anyhow::bail!("interrupted while converting {}", paper_id);
                    }
                }
            };

            match (view.status, &view.result, &view.error) {
                (TaskStatus::Succeeded, Some(text), _) => {
                    spinner.finish_with_success(&summary_line(&view));
                    println!("{}", text);
                }
                (_, _, Some(error)) => {
                    spinner.finish_with_error(&summary_line(&view));
                    anyhow::bail!("conversion of {} failed: {}", view.paper_id, error);
                }
                _ => anyhow::bail!("task {} ended without a result", view.task_id),
            }
        }

        Some(Commands::Status { task_id }) => {
            let manager = build_manager(&config).await?;
            let view = manager.get_status(&task_id).await?;
            if !cli.quiet {
                eprintln!("{}", summary_line(&view));
            }
            println!("{}", serde_json::to_string_pretty(&view)?);
        }

        Some(Commands::Config) => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn init_tracing(cli: &Cli, config: &Config) {
    let log_level = match cli.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };

    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("arxiv_fulltext={}", env_filter)),
    );

    // stdout carries MCP frames and converted text, so logs go to stderr
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

async fn build_manager(config: &Config) -> Result<TaskManager> {
    let store: Arc<dyn TaskStore> = match config.tasks.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Redis => connect_redis(config).await?,
    };
    tracing::info!("Using {} task store", store.backend());

    let client = HttpClient::with_settings(&config.upstream.user_agent, config.request_timeout())
        .context("failed to build HTTP client")?;
    let gate = Arc::new(RateGate::new(config.rate_interval()));
    let source = ArxivSource::new(client, gate)
        .with_endpoints(&config.upstream.api_url, &config.upstream.pdf_url)
        .with_retry(config.upstream_retry());

    Ok(TaskManager::new(
        store,
        Arc::new(source),
        Arc::new(PdfMarkdownConverter::new()),
        config.task_manager_config(),
    ))
}

#[cfg(feature = "redis-backend")]
async fn connect_redis(config: &Config) -> Result<Arc<dyn TaskStore>> {
    use arxiv_fulltext::store::RedisStore;

    let url = config
        .tasks
        .redis_url
        .as_deref()
        .context("tasks.redis_url is not set")?;
    let store = RedisStore::connect(url, config.tasks.key_prefix.clone())
        .await
        .context("failed to connect to Redis")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis-backend"))]
async fn connect_redis(_config: &Config) -> Result<Arc<dyn TaskStore>> {
    anyhow::bail!("tasks.backend = \"redis\" requires building with the redis-backend feature")
}

async fn serve(config: &Config, http: bool, host: &str, port: u16) -> Result<()> {
    let manager = build_manager(config).await?;
    let sweeper = manager.spawn_sweeper(config.sweep_interval());
    let server = McpServer::new(manager.clone())?;

    if http {
        let addr = format!("{}:{}", host, port);
        let (bound_addr, handle) = server.run_http(&addr).await?;
        tracing::info!("MCP server listening on {}", bound_addr);

        tokio::select! {
            result = handle => result.map_err(|e| anyhow::anyhow!("Server task failed: {}", e))?,
            _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C, shutting down"),
        }
    } else {
        tokio::select! {
            result = server.run() => result?,
            _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C, shutting down"),
        }
    }

    let aborted = manager.in_flight();
    manager.shutdown();
    sweeper.abort();
    if aborted > 0 {
        tracing::warn!("Aborted {} in-flight task(s)", aborted);
    }
    Ok(())
}
