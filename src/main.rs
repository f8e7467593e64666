use clap::{Arg, Command, value_parser};
use std::path::PathBuf;
use std::{panic, process};

use crate::config::{DEST_HEIGHT, DEST_WIDTH, PlayerConfig};
use crate::display::WindowSurface;
use crate::pipeline::{DecodeWorker, Presenter};
use crate::utils::StopSignal;

pub mod config;
pub mod decoder;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod utils;

fn main() {
    tracing_subscriber::fmt::init();

    let matches = Command::new("vidplay")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("input")
                .value_name("FILE")
                .help("Video file to play.")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("width")
                .long("width")
                .value_name("PIXELS")
                .help("Output frame width.")
                .value_parser(value_parser!(u32).range(1..=7680))
                .default_value("1920"),
        )
        .arg(
            Arg::new("height")
                .long("height")
                .value_name("PIXELS")
                .help("Output frame height.")
                .value_parser(value_parser!(u32).range(1..=4320))
                .default_value("1080"),
        )
        .arg(
            Arg::new("buffer")
                .long("buffer")
                .value_name("FRAMES")
                .help("Decoded-frame buffer depth (default: one second of frames).")
                .value_parser(value_parser!(usize)),
        )
        .get_matches();

    let mut config = PlayerConfig::new(matches.get_one::<PathBuf>("input").cloned().unwrap());
    config.dest_width = matches.get_one::<u32>("width").copied().unwrap_or(DEST_WIDTH);
    config.dest_height = matches
        .get_one::<u32>("height")
        .copied()
        .unwrap_or(DEST_HEIGHT);
    config.buffer_capacity = matches.get_one::<usize>("buffer").copied();

    // kill the main thread as soon as a secondary thread panics
    let orig_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        orig_hook(panic_info);
        process::exit(105);
    }));

    let stop = StopSignal::new();

    // gracefully close the app when receiving SIGINT, SIGTERM, or SIGHUP
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.cancel()).expect("Error setting Ctrl-C handler");
    }

    if let Err(e) = run(config, stop) {
        log::error!("{e:#}");
        process::exit(1);
    }
}

fn run(config: PlayerConfig, stop: StopSignal) -> anyhow::Result<()> {
    let (worker, frames, descriptor) = DecodeWorker::spawn(&config, stop.clone())?;

    let title = config
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "vidplay".into());
    let surface = WindowSurface::create(config.dest_width, config.dest_height, &title)?;

    let surface = Presenter::new(surface, frames, descriptor.frame_rate, stop.clone()).run();
    drop(surface);

    // Presentation is over for whatever reason; make sure the worker
    // unblocks and release its resources before leaving.
    stop.cancel();
    worker.join();
    Ok(())
}
