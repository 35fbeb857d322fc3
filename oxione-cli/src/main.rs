//! OxiONE CLI - The Oxidized ONE-code toolkit
//!
//! A Pure Rust toolset for ONE-code record files: validation, ASCII/binary
//! conversion and viewing, file summaries, and a sequence simulator.

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use commands::{cmd_info, cmd_sim, cmd_validate, cmd_view};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "one")]
#[command(author, version, about = "The Oxidized ONE-code toolkit - Pure Rust ONE-code utilities")]
#[command(long_about = "
OxiONE is a Pure Rust implementation of the ONE-code record format used in
genome assembly pipelines, with both ASCII and compressed binary encodings.

Examples:
  one validate reads.seq
  one validate -t seq --header headerless.seq
  one view -b -o reads.1seq reads.seq
  one view -i 0-10 reads.1seq
  one view --usage reads.1seq
  one info --json reads.1seq
  one sim -n 10000 -o sim.1seq -b
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a file's syntax and its header statistics
    #[command(alias = "v")]
    Validate {
        /// File to validate
        file: PathBuf,

        /// File type (e.g. seq) - required if the file has no header
        #[arg(short = 't', long = "type")]
        file_type: Option<String>,

        /// Write out a correct header
        #[arg(short = 'H', long)]
        header: bool,

        /// Rewrite the whole file in ASCII with a correct header
        #[arg(short = 'w', long)]
        rewrite: bool,

        /// Output file (default stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Re-emit a file in ASCII or binary, whole or by object selection
    View {
        /// File to view
        file: PathBuf,

        /// File type (e.g. seq) - required if the file has no header
        #[arg(short = 't', long = "type")]
        file_type: Option<String>,

        /// Include the header in ASCII output
        #[arg(short = 'H', long)]
        header: bool,

        /// Only write the header
        #[arg(long)]
        header_only: bool,

        /// Write binary output (default is ASCII)
        #[arg(short, long)]
        binary: bool,

        /// Output file (default stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Objects to write, e.g. 0-10 or 3,17,40-45 (binary input only)
        #[arg(short = 'i', long)]
        index: Option<String>,

        /// Report byte usage per line type instead of records
        #[arg(short, long)]
        usage: bool,
    },

    /// Summarize a file's type, encoding, and statistics
    #[command(alias = "i")]
    Info {
        /// File to inspect
        file: PathBuf,

        /// File type (e.g. seq) - required if the file has no header
        #[arg(short = 't', long = "type")]
        file_type: Option<String>,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,
    },

    /// Generate a synthetic sequence file
    Sim {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Number of reads to generate
        #[arg(short = 'n', long, default_value_t = 10_000)]
        count: usize,

        /// Mean read length
        #[arg(short = 'l', long, default_value_t = 100)]
        mean_len: usize,

        /// Random seed
        #[arg(long, default_value_t = 17)]
        seed: u64,

        /// Write binary output (default is ASCII)
        #[arg(short, long)]
        binary: bool,

        /// Number of parallel writer shards
        #[arg(short = 'T', long, default_value_t = 1)]
        shards: usize,
    },

    /// Generate shell completion scripts
    #[command(hide = true)]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            file,
            file_type,
            header,
            rewrite,
            output,
        } => cmd_validate(&file, file_type.as_deref(), header, rewrite, output),
        Commands::View {
            file,
            file_type,
            header,
            header_only,
            binary,
            output,
            index,
            usage,
        } => cmd_view(
            &file,
            file_type.as_deref(),
            header,
            header_only,
            binary,
            output,
            index.as_deref(),
            usage,
        ),
        Commands::Info {
            file,
            file_type,
            json,
        } => cmd_info(&file, file_type.as_deref(), json),
        Commands::Sim {
            output,
            count,
            mean_len,
            seed,
            binary,
            shards,
        } => cmd_sim(&output, count, mean_len, seed, binary, shards),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "one", &mut io::stdout());
            return;
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
