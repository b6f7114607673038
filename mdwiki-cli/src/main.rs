//! # mdwiki CLI
//!
//! Command-line interface for the mdwiki live markdown server.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mdwiki")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to an optional configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a directory of markdown files over HTTP
    Serve {
        /// Directory to serve when no --include is given
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Directory to index (repeatable)
        #[arg(short, long = "include", value_name = "DIR")]
        include: Vec<PathBuf>,

        /// Path, directory name or glob to skip (repeatable)
        #[arg(short = 'x', long = "exclude", value_name = "RULE")]
        exclude: Vec<String>,

        /// Hostname to bind
        #[arg(short = 'H', long, env = "MDWIKI_HOSTNAME")]
        hostname: Option<String>,

        /// Port to bind
        #[arg(short = 'P', long, env = "MDWIKI_PORT")]
        port: Option<u16>,

        /// Watch the include directories and keep the index up to date
        #[arg(short, long)]
        watch: bool,
    },

    /// Create a new markdown document
    New {
        /// Document title
        title: String,

        /// Directory to create the document in
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve {
            path,
            include,
            exclude,
            hostname,
            port,
            watch,
        } => {
            let opts = commands::ServeOptions {
                path,
                include,
                exclude,
                hostname,
                port,
                watch,
            };
            commands::serve_wiki(cli.config.as_deref(), opts).await
        }
        Commands::New { title, dir } => commands::new_document(&title, &dir).map(|path| {
            println!("Created {:?}", path);
        }),
    }
}
