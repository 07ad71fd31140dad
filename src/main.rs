//! selkie CLI entry point.

mod cli;

use std::path::Path;

use clap::Parser;
use cli::{Cli, Command, TableFormat};
use selkie::toy::{FEATURE_HAS_MUL, ToySelector, ToyTarget, toy_table};
use selkie::{load_table, select_source};
use selkie_isel::{FallbackPolicy, FeatureBitset, SelectOptions};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Select {
            file,
            table,
            no_mul,
            abort,
            keep_dead,
        } => {
            let mut features = FeatureBitset::EMPTY;
            if !no_mul {
                features.set(FEATURE_HAS_MUL);
            }
            let mut selector = ToySelector::new(ToyTarget::new()).with_features(features);
            if let Some(path) = table {
                let text = read_file(&path);
                match load_table(&selector.toy().info, &text) {
                    Ok(table) => selector = selector.with_table(table),
                    Err(e) => fail(format_args!("{}: {e}", path.display())),
                }
            }

            let options = SelectOptions {
                fallback: if abort {
                    FallbackPolicy::Abort
                } else {
                    FallbackPolicy::Continue
                },
                eliminate_dead: !keep_dead,
            };
            let source = read_file(&file);
            match select_source(&selector, &source, options) {
                Ok((output, _stats)) => print!("{output}"),
                Err(e) => fail(format_args!("{}: {e}", file.display())),
            }
        }
        Command::Table { format } => {
            let toy = ToyTarget::new();
            let table = toy_table(&toy);
            match format {
                TableFormat::Text => print!("{}", table.display(Some(&toy.info))),
                TableFormat::Json => match serde_json::to_string(&table) {
                    Ok(json) => println!("{json}"),
                    Err(e) => fail(format_args!("cannot serialize table: {e}")),
                },
            }
        }
        Command::CheckTable { file } => {
            let toy = ToyTarget::new();
            let text = read_file(&file);
            match load_table(&toy.info, &text) {
                Ok(table) => print!("{}", table.display(Some(&toy.info))),
                Err(e) => fail(format_args!("{}: {e}", file.display())),
            }
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` or else by the `-v` count.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_file(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => fail(format_args!("error reading {}: {e}", path.display())),
    }
}

fn fail(message: std::fmt::Arguments<'_>) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}
