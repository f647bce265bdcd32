use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "keylab", about = "Practice piano on your computer keyboard")]
pub struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/keylab/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Open the interactive trainer (the default)
    Play(PlayArgs),
    /// Print the key mapping and chord tables
    Keys,
    /// Print the exercise catalog
    Exercises {
        /// Local JSON catalog to merge with the built-ins
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// List available audio output devices
    Audio,
}

#[derive(clap::Args, Default)]
pub struct PlayArgs {
    /// Audio output device name (default: system default)
    #[arg(long)]
    pub audio_device: Option<String>,

    /// Audio buffer size in frames
    #[arg(long)]
    pub buffer_size: Option<u32>,

    /// Sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Local JSON catalog to merge with the built-ins
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}
