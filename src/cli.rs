use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "jarview")]
#[command(about = "Browse jar/zip/war archives and view decompiled class skeletons")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// List the entries of an archive
    List {
        archive: PathBuf,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print one entry as plain text
    Show {
        archive: PathBuf,

        entry_path: String,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Decompile a class entry
    Decompile {
        archive: PathBuf,

        class_name: String,

        /// Option overrides, e.g. --set showversion=false
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        #[arg(long)]
        code_only: bool,

        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print the options catalogue with defaults
    Options {
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
    Code,
}
