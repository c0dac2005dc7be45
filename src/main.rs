use std::io::{stdin, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use implayer::engine::{Mixer, Player, PROVISIONED_CHANNELS};
use implayer::formats::{self, LoadError};

/// Mono mix rate, fixed at build time.
const SAMPLE_RATE: u32 = 44_100;

/// CLI based S3M/IT module player
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The module file to play
    path: PathBuf,
}

#[derive(Debug, Error)]
enum PlaybackError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("no default audio output device")]
    NoOutputDevice,
    #[error("could not open audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("could not start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), PlaybackError> {
    let module = Arc::new(formats::load_file(&args.path)?);
    println!(
        "Loaded {} ({} samples, {} patterns, {} orders)",
        args.path.display(),
        module.samples.len(),
        module.patterns.len(),
        module.pattern_order.len(),
    );

    let mut mixer = Mixer::new(SAMPLE_RATE, PROVISIONED_CHANNELS);
    let mut player = Player::new(Arc::clone(&module));
    mixer.attach_handler(&mut player);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(PlaybackError::NoOutputDevice)?;
    let config = cpal::StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(SAMPLE_RATE),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device.build_output_stream(
        &config,
        move |out: &mut [f32], _: &cpal::OutputCallbackInfo| {
            player.render_audio(&mut mixer, out);
        },
        |err| tracing::error!(%err, "audio stream error"),
        None,
    )?;
    stream.play()?;

    println!("Playing. Press enter to quit.");
    let mut line = String::new();
    let _ = stdin().lock().read_line(&mut line);

    Ok(())
}
