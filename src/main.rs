mod args;

use clap::Parser;
use colored::*;
use log::info;
use osmfeatures::{extract, ExtractConfig, TagFilter};

use std::io::{self, BufWriter, Write};

type Error = Box<dyn std::error::Error>;

fn run(args: args::Args) -> Result<(), Error> {
    let filter = if args.values.is_empty() {
        TagFilter::any_value(args.key)?
    } else {
        TagFilter::new(args.key, args.values)?
    };
    let config = ExtractConfig {
        multiprocess: args.multiprocess || args.workers.is_some(),
        workers: args.workers,
        progress_bar: args.progress,
    };

    let extraction = extract(&args.input, &filter, &args.region, &config)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut rows = extraction.rows();
    for row in rows.by_ref() {
        serde_json::to_writer(&mut out, &row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    let stats = rows.stats();
    info!("Wrote {} rows for {}", stats.num_rows, filter);
    eprintln!("{}", stats);
    Ok(())
}

fn main() {
    let args = args::Args::parse();
    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_module_path(false)
        .format_timestamp_nanos()
        .init();

    if let Err(e) = run(args) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}
