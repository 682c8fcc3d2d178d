use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tabscape_core::{Action, Config, Router};
use tokio::io::BufReader;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long in-flight requests get to finish once stdin closes
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "tabscape")]
#[command(version, about = "Background image and quote cache for new tab pages", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/tabscape/config.toml)
    #[arg(long, global = true, env = "TABSCAPE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Answer newline-delimited JSON requests from stdin on stdout
    Serve,
    /// Fetch one item and print it
    Get {
        /// What to fetch
        #[arg(value_enum)]
        kind: Kind,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Kind {
    Image,
    Quote,
}

impl From<Kind> for Action {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Image => Action::GetBackgroundImage,
            Kind::Quote => Action::GetQuote,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, stdout carries responses
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tabscape=info,tabscape_core=info,tabscape_cache=info,tabscape_api=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        eprintln!("No command specified. Try --help");
        return Ok(());
    };

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let router = Arc::new(Router::start(&config));

    match command {
        Commands::Serve => serve(router).await,
        Commands::Get { kind, timeout_secs } => {
            get_one(&router, kind.into(), Duration::from_secs(timeout_secs)).await
        }
    }
}

async fn serve(router: Arc<Router>) -> anyhow::Result<()> {
    tracing::info!("Serving requests on stdin");
    let stdin = BufReader::new(tokio::io::stdin());
    tabscape_core::serve(router, stdin, tokio::io::stdout(), SHUTDOWN_GRACE).await?;
    Ok(())
}

async fn get_one(router: &Router, action: Action, limit: Duration) -> anyhow::Result<()> {
    let item = tokio::time::timeout(limit, router.handle(action))
        .await
        .with_context(|| format!("No item after {}s", limit.as_secs()))??;

    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}
