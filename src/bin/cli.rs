use std::{path::PathBuf, process::exit};

use clap::{Parser, Subcommand};
use log::{error, LevelFilter};

use logcask::{Result, Store, StoreError};

/// Args for the logcask command line
#[derive(Parser)]
#[clap(author, version, about)]
#[clap(propagate_version = true)]
struct CliArgs {
    /// Directory holding the store, default is the current directory
    #[clap(short, long, value_parser, default_value = ".")]
    dir: PathBuf,
    /// Subcommand
    #[clap(subcommand)]
    command: Commands,
}

/// Enum type of subcommand for logcask
#[derive(Debug, Subcommand)]
enum Commands {
    /// Get the value of a given key
    Get {
        /// Key
        key: String,
    },
    /// Set the value of a key
    Put {
        /// Key
        key: String,
        /// Value
        value: String,
    },
    /// Remove a given key
    Del {
        /// Key
        key: String,
    },
    /// Rewrite the data file, dropping superseded records
    Compact,
}

fn main() {
    env_logger::builder().filter_level(LevelFilter::Warn).init();

    if let Err(e) = run() {
        error!("{}", e);
        exit(1);
    }
}

fn run() -> Result<()> {
    let cli = CliArgs::parse();

    let store = Store::open(cli.dir)?;

    match cli.command {
        Commands::Get { key } => match store.get(key.as_bytes()) {
            Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
            Err(StoreError::KeyNotFound) => println!("Key not found"),
            Err(e) => return Err(e),
        },
        Commands::Put { key, value } => store.put(key.as_bytes(), value.as_bytes())?,
        Commands::Del { key } => store.delete(key.as_bytes())?,
        Commands::Compact => store.compact()?,
    }

    store.close()
}
