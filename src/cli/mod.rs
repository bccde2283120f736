//! CLI Module
//!
//! Command-line interface for speech onset detection.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Speech Onset - find the first onsets in a WAV recording
#[derive(Parser, Debug)]
#[command(name = "speech-onset")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Detect the first three onsets in a WAV file
    #[command(name = "detect")]
    Detect {
        /// Path to the WAV file
        path: PathBuf,

        /// Ignore onsets earlier than this many milliseconds
        #[arg(short, long, default_value_t = 0.0, value_name = "MS")]
        nothing_before: f64,

        /// Show the denoised waveform with onset markers
        #[arg(short, long)]
        plot: bool,

        /// Print the full report as JSON after the summary line
        #[arg(long)]
        json: bool,
    },
}
