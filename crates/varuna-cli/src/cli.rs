use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(
    name = "varuna",
    version,
    about = "Submit a signature to the validation service and store the report"
)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(
        short,
        long,
        env = "VARUNA_CLIENT_CONFIG_FILE",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    /// Signature file to validate
    #[arg(short, long)]
    pub signature: PathBuf,

    /// Signed document (for detached signatures)
    #[arg(short, long)]
    pub document: Option<PathBuf>,

    /// Report output path (default: generated in output.directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}
