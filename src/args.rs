use std::path::PathBuf;

use clap::Parser;

/// Extracts tagged OpenStreetMap features from an osm.pbf file as JSON lines
#[derive(Debug, Parser)]
#[clap(about, version, author)]
pub struct Args {
    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Input OSM pbf file
    pub input: PathBuf,

    /// Primary tag key, e.g. `power`
    #[arg(short, long)]
    pub key: String,

    /// Accepted tag value; may be repeated. Without any value, every value of
    /// the key is accepted.
    #[arg(long = "value")]
    pub values: Vec<String>,

    /// Region label copied into every row
    #[arg(short, long, default_value = "")]
    pub region: String,

    /// Scan blocks on a pool of worker threads
    #[arg(long)]
    pub multiprocess: bool,

    /// Number of worker threads (implies --multiprocess)
    #[arg(short = 'j', long = "workers")]
    pub workers: Option<usize>,

    /// Show a progress bar per scan phase
    #[arg(long)]
    pub progress: bool,
}
