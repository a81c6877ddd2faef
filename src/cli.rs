use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "coursetrack",
    version,
    about = "Scan a local video course and track playback progress, streaks and history"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Scan {
        dir: PathBuf,
    },
    Play {
        dir: PathBuf,
        #[arg(long)]
        index: Option<usize>,
    },
    Stats,
    History,
    Done {
        dir: PathBuf,
        number: usize,
    },
}
