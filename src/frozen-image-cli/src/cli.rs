//! CLI argument definitions for frozen

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "frozen")]
#[command(about = "Inspect and re-encode frozen memory image sections")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Where to find a container section and how to resolve its names
#[derive(Args, Debug, Clone)]
pub struct SectionArgs {
    /// File holding the container section
    pub input: PathBuf,

    /// Name table, one name per line (line number = name index)
    #[arg(short, long, env = "FROZEN_NAMES")]
    pub names: PathBuf,

    /// Byte offset of the container header within the file
    #[arg(long, default_value = "0")]
    pub offset: u64,

    /// Bytes since the enclosing 16-byte boundary (defaults to --offset)
    #[arg(long)]
    pub origin: Option<u64>,
}

impl SectionArgs {
    pub fn origin(&self) -> u64 {
        self.origin.unwrap_or(self.offset)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a section and print keys, schema and rows as JSON
    Dump {
        #[command(flatten)]
        section: SectionArgs,

        /// Write JSON to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode, re-encode and compare byte-for-byte
    Roundtrip {
        #[command(flatten)]
        section: SectionArgs,

        /// Write the re-encoded section to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the stored and derived lookup index arrays
    Index {
        #[command(flatten)]
        section: SectionArgs,
    },
}
