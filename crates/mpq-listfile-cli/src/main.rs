//! mpq-listfile binary entry point.
//!
//! Parses arguments, initializes logging and dispatches to the command
//! handlers in [`commands`].

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mpq_listfile::ListfileConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mpq-listfile",
    about = "Enumerate and canonicalize MPQ listfiles",
    version,
    author
)]
struct Cli {
    /// Bytes of a listfile held in memory at once
    #[arg(
        long,
        global = true,
        env = "MPQ_LISTFILE_PAGE_SIZE",
        default_value_t = mpq_listfile::config::DEFAULT_PAGE_SIZE
    )]
    page_size: usize,

    /// Name buffer capacity; longer names are truncated
    #[arg(
        long,
        global = true,
        env = "MPQ_LISTFILE_MAX_NAME",
        default_value_t = mpq_listfile::config::DEFAULT_MAX_NAME_LENGTH
    )]
    max_name_length: usize,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn listfile_config(&self) -> ListfileConfig {
        ListfileConfig::new()
            .with_page_size(self.page_size)
            .with_max_name_length(self.max_name_length)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the names of a listfile matching a mask
    List {
        /// Listfile to read
        listfile: PathBuf,

        /// Wildcard mask (`*` and `?`, case-insensitive)
        #[arg(short, long)]
        mask: Option<String>,
    },

    /// Merge listfiles into one sorted, deduplicated listfile
    Canonicalize {
        /// Listfiles to merge
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.listfile_config();
    config.validate()?;

    match cli.command {
        Commands::List { listfile, mask } => {
            let stdout = std::io::stdout();
            commands::list(&listfile, mask.as_deref(), &config, &mut stdout.lock())?;
        }
        Commands::Canonicalize { inputs, output } => {
            let count = commands::canonicalize(inputs.as_slice(), output.as_deref(), &config)?;
            tracing::info!("Canonical listfile holds {count} names");
        }
    }

    Ok(())
}
