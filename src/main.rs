#![allow(clippy::collapsible_if)]

mod audio;
mod capture;
mod catalog;
mod cli;
mod config;
mod enumerate;
mod error;
mod keymap;
mod lesson;
mod prefs;
mod step;
mod tui;

use clap::Parser;
use cli::{Cli, Command, PlayArgs};
use config::Config;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        None => play(config, PlayArgs::default()),
        Some(Command::Play(args)) => play(config, args),
        Some(Command::Keys) => enumerate::keys(),
        Some(Command::Exercises { catalog }) => {
            let mut catalog_config = config.catalog;
            if catalog.is_some() {
                catalog_config.file = catalog;
            }
            enumerate::exercises(&catalog_config)
        }
        Some(Command::Audio) => enumerate::audio(),
    }
}

fn play(config: Config, args: PlayArgs) -> anyhow::Result<()> {
    // CLI flags win over the config file.
    let settings = audio::AudioSettings {
        device: args.audio_device.or(config.audio.device.clone()),
        sample_rate: args.sample_rate.unwrap_or(config.audio.sample_rate),
        buffer_size: args.buffer_size.unwrap_or(config.audio.buffer_size),
    };
    let mut catalog_config = config.catalog.clone();
    if args.catalog.is_some() {
        catalog_config.file = args.catalog;
    }

    let store = prefs::FileStore::new(config.preferences_path());
    log::info!("Preferences: {}", store.path().display());

    tui::run(
        audio::LazyAudio::new(settings),
        prefs::LessonsPanel::new(store),
        catalog::source_from(&catalog_config),
    )
}
