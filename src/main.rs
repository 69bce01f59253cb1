//! blockdiff CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod remote;

use commands::Format;

#[derive(Parser)]
#[command(name = "blockdiff")]
#[command(about = "Side-by-side diff of two block-editor workspaces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root path (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (defaults to <root>/.blockdiff.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two workspace documents and print the differences
    Diff {
        /// Edited workspace: file path or http(s) URL
        mine: String,
        /// Reference workspace: file path or http(s) URL
        previous: String,
        /// Print the full diff as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert a document between the native and mergeable formats
    Convert {
        /// Input document: file path or http(s) URL
        input: String,
        /// Target format
        #[arg(long, value_enum, default_value = "mergeable")]
        to: Format,
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Start the diff server for two workspace files
    Serve {
        /// Edited workspace file
        #[arg(long)]
        mine: PathBuf,
        /// Reference workspace file
        #[arg(long)]
        previous: PathBuf,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Open browser automatically
        #[arg(short, long)]
        open: bool,
        /// Save edits in the mergeable format
        #[arg(long)]
        mergeable: bool,
    },
    /// Upload a pair of documents to a server and print the share link
    Share {
        mine: String,
        previous: String,
        /// Base URL of a running blockdiff server
        #[arg(long, default_value = "http://127.0.0.1:7878")]
        server: String,
    },
    /// Clear backups and shares
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "blockdiff={level},blockdiff_core={level},blockdiff_server={level},blockdiff_watcher={level}",
            level = log_level
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("blockdiff v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Project root: {}", cli.root.display());

    let config = commands::load_config(&cli.root, cli.config.as_deref())?;

    match cli.command {
        Commands::Diff {
            mine,
            previous,
            json,
        } => commands::diff(&cli.root, &config, &mine, &previous, json).await,
        Commands::Convert { input, to, output } => commands::convert(&input, to, output).await,
        Commands::Serve {
            mine,
            previous,
            port,
            host,
            open,
            mergeable,
        } => {
            let options = commands::ServeOptions {
                mine,
                previous,
                host: host.unwrap_or_else(|| config.server.host.clone()),
                port: port.unwrap_or(config.server.port),
                open,
                mergeable,
            };
            commands::serve(cli.root, config, options).await
        }
        Commands::Share {
            mine,
            previous,
            server,
        } => commands::share(&mine, &previous, &server).await,
        Commands::Clear => commands::clear(&cli.root, &config),
        Commands::Version => {
            println!("blockdiff v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
