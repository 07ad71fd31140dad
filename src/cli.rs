//! Command-line interface for the selkie instruction selector.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "selkie")]
#[command(about = "Table-driven instruction selection for a toy target", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG`
    /// takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Select a machine IR function and print the result
    Select {
        /// Machine IR source file
        file: PathBuf,

        /// Match table to use instead of the built-in one (assembly or JSON)
        #[arg(long)]
        table: Option<PathBuf>,

        /// Select without the hardware multiplier
        #[arg(long)]
        no_mul: bool,

        /// Fail on the first instruction that cannot be selected
        #[arg(long)]
        abort: bool,

        /// Keep instructions whose results are unused
        #[arg(long)]
        keep_dead: bool,
    },

    /// Print the built-in match table
    Table {
        #[arg(long, value_enum, default_value_t = TableFormat::Text)]
        format: TableFormat,
    },

    /// Validate a match table file and print its disassembly
    #[command(alias = "check")]
    CheckTable {
        file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TableFormat {
    Text,
    Json,
}
