use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stream, merge and process large JSON result sets record by record.
#[derive(Clone, Parser)]
#[command(name = "resultflow")]
#[command(about = "Stream the array stored under one key of a large JSON file.")]
pub struct Cli {
    /// Verbose output (debug logs, progress counter).
    #[arg(long, short = 'v', global = true, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Name of the top-level array field. Default: `results`.
    #[arg(long, short = 'k', global = true)]
    pub key: Option<String>,

    /// Decoded records buffered ahead of the consumer.
    #[arg(long, global = true, value_parser = clap::value_parser!(usize))]
    pub buffer: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Print the number of records.
    Count {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print `true` when the array has no records.
    Empty {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print records as JSON lines.
    Dump {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Stop after N records.
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Merge the records of several files into one. Inputs are left untouched.
    Merge {
        /// Output file.
        #[arg(long, short = 'o')]
        output: PathBuf,

        #[arg(value_name = "FILE", num_args = 1.., required = true)]
        files: Vec<PathBuf>,
    },
    /// Run every record through the worker pool; a record fails when a required field is missing.
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Fields every record must carry. Can specify multiple: --require a b c
        #[arg(long, short = 'r', num_args = 1.., required = true)]
        require: Vec<String>,

        /// Worker threads. Default: derived from available threads and the open-file limit.
        #[arg(long, short = 't')]
        threads: Option<usize>,

        /// Stop starting new records after the first failure.
        #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
        fail_fast: Option<bool>,

        /// Never block reading on a full task queue (memory grows with the file).
        #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
        unbounded: Option<bool>,
    },
}
