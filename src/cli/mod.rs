//! Command-line interface for mongo-scroll-extract
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and merging with arguments
//! - The `version` and `config` subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, LogLevel};
use crate::connection::sanitize_uri;
use crate::error::Result;

/// Extract database name from MongoDB connection URI
///
/// Format: mongodb://[username:password@]host[:port][/database][?options]
fn extract_database_from_uri(uri: &str) -> Option<String> {
    let after_scheme = uri.split("://").nth(1)?;
    let path_part = after_scheme.split('/').nth(1)?;
    let db_name = path_part.split('?').next().unwrap_or("");
    if db_name.is_empty() {
        None
    } else {
        Some(db_name.to_string())
    }
}

/// Bulk-extract records matching a filter from a MongoDB collection
#[derive(Parser, Debug)]
#[command(
    name = "mongo-scroll-extract",
    version,
    about = "Extract matching MongoDB records into a JSON file",
    long_about = "Scrolls a cursor over every record whose filter field equals the given value,
decodes the records concurrently and writes them to a JSON file. A run either
writes every matching record or writes nothing."
)]
pub struct CliArgs {
    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(value_name = "URI")]
    pub uri: Option<String>,

    /// Database name to extract from
    #[arg(short = 'd', long, value_name = "NAME")]
    pub database: Option<String>,

    /// Collection name to extract from
    #[arg(short = 'c', long, value_name = "NAME")]
    pub collection: Option<String>,

    /// Field the equality filter applies to
    #[arg(long, value_name = "FIELD")]
    pub filter_field: Option<String>,

    /// Value the filter field must equal
    #[arg(long, value_name = "VALUE")]
    pub filter_value: Option<String>,

    /// Documents requested per cursor page
    #[arg(long, value_name = "N")]
    pub page_size: Option<u32>,

    /// Number of concurrent decode workers
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Capacity of the pipeline channels (defaults to page size)
    #[arg(long, value_name = "N")]
    pub channel_capacity: Option<usize>,

    /// Output file path
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Pretty-print the output file
    #[arg(long)]
    pub pretty: bool,

    /// Disable the progress bar
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Configuration file path
    #[arg(long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for mongo-scroll-extract
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show version information
    Version,

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Configuration with arguments applied
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// Validation is left to the caller: `config --show` must work on an
    /// incomplete configuration.
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_connection_args(config, args);
        Self::apply_extraction_args(config, args);
        Self::apply_output_args(config, args);
        Self::apply_logging_args(config, args);
    }

    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(uri) = &args.uri {
            config.connection.uri = uri.clone();
        }

        // Explicit flag wins over the database embedded in the URI
        if let Some(database) = &args.database {
            config.connection.database = Some(database.clone());
        } else if config.connection.database.is_none() {
            config.connection.database = extract_database_from_uri(&config.connection.uri);
        }

        if let Some(collection) = &args.collection {
            config.connection.collection = Some(collection.clone());
        }
        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
    }

    fn apply_extraction_args(config: &mut Config, args: &CliArgs) {
        if let Some(field) = &args.filter_field {
            config.extraction.filter_field = field.clone();
        }
        if let Some(value) = &args.filter_value {
            config.extraction.filter_value = Some(value.clone());
        }
        if let Some(page_size) = args.page_size {
            config.extraction.page_size = page_size;
        }
        if let Some(workers) = args.workers {
            config.extraction.worker_count = workers;
        }
        if let Some(capacity) = args.channel_capacity {
            config.extraction.channel_capacity = Some(capacity);
        }
    }

    fn apply_output_args(config: &mut Config, args: &CliArgs) {
        if let Some(path) = &args.output {
            config.output.path = path.clone();
        }
        if args.pretty {
            config.output.pretty = true;
        }
        if args.no_progress || args.quiet {
            config.output.progress = false;
        }
    }

    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        if args.very_verbose {
            config.logging.level = LogLevel::Trace;
        } else if args.verbose {
            config.logging.level = LogLevel::Debug;
        } else if args.quiet {
            config.logging.level = LogLevel::Error;
        }
    }

    /// Handle a subcommand if one was given
    ///
    /// Returns `true` when a subcommand ran and the process should exit.
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                self.show_version();
                Ok(true)
            }
            Some(Commands::Config { show }) => {
                self.handle_config_command(*show)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn show_version(&self) {
        println!("mongo-scroll-extract {}", crate::VERSION);
    }

    fn handle_config_command(&self, show: bool) -> Result<()> {
        if show {
            let mut shown = self.config.clone();
            shown.connection.uri = sanitize_uri(&shown.connection.uri);
            print!("{}", shown.to_toml_string()?);
        } else {
            println!("Configuration file: {}", Config::default_path().display());
            match self.config.validate() {
                Ok(()) => println!("Configuration is complete"),
                Err(e) => println!("Configuration is incomplete: {}", e),
            }
        }
        Ok(())
    }

    /// Get the effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connection URI for display, with credentials hidden
    pub fn sanitized_uri(&self) -> String {
        sanitize_uri(&self.config.connection.uri)
    }
}
