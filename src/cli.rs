use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to a YAML config file
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Process and index every screenshot in a directory, then print stats
    Index {
        /// Directory containing screenshots
        dir: PathBuf,
    },

    /// Index a directory and search it by meaning
    Search {
        /// Directory containing screenshots
        dir: PathBuf,

        /// What the screenshot looked like or contained
        query: String,

        /// Number of results (defaults to search.top_k)
        #[clap(short = 'k', long)]
        top_k: Option<usize>,

        /// Print results as JSON
        #[clap(long, default_value = "false")]
        json: bool,
    },
}
