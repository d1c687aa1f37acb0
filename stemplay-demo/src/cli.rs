use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use stemplay::{
    AudioPlayer, PlaybackMode, PlayerDesc, SessionOutcome, TrackCache, list_output_devices,
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "stemplay-demo")]
#[command(about = "Play several audio files mixed together")]
pub struct Args {
    /// Loop a short preview instead of playing once
    #[arg(long)]
    pub preview: bool,

    /// Output device as "<index>:<name>" (see --list-devices)
    #[arg(long)]
    pub device: Option<String>,

    /// Gain for one track; may be repeated
    #[arg(long = "volume", value_name = "PATH=GAIN", value_parser = parse_volume)]
    pub volumes: Vec<(PathBuf, f32)>,

    /// Stop after this many seconds
    #[arg(long, value_parser = parse_seconds)]
    pub seconds: Option<f64>,

    /// Print the available output devices
    #[arg(long)]
    pub list_devices: bool,

    /// Audio files to mix
    pub files: Vec<PathBuf>,
}

impl Args {
    fn mode(&self) -> PlaybackMode {
        if self.preview {
            PlaybackMode::Preview
        } else {
            PlaybackMode::Full
        }
    }
}

fn parse_volume(raw: &str) -> std::result::Result<(PathBuf, f32), String> {
    let (path, gain) = raw
        .rsplit_once('=')
        .ok_or_else(|| format!("expected <path>=<gain>, got '{}'", raw))?;
    let gain = gain
        .parse::<f32>()
        .map_err(|e| format!("invalid gain '{}': {}", gain, e))?;
    Ok((PathBuf::from(path), gain))
}

fn parse_seconds(raw: &str) -> std::result::Result<f64, String> {
    let seconds = raw.parse::<f64>().map_err(|e| e.to_string())?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err("must be a non-negative number".into());
    }
    Ok(seconds)
}

pub fn run(args: Args) -> Result<()> {
    if args.list_devices {
        for device in list_output_devices()? {
            println!("{}", device);
        }
        if args.files.is_empty() {
            return Ok(());
        }
    }

    if args.files.is_empty() {
        bail!("no input files (see --help)");
    }

    let mut desc = PlayerDesc::default();
    if let Some(device) = &args.device {
        desc = desc.output_device(device.clone());
    }

    let cache = TrackCache::new();
    let mut player = AudioPlayer::new(&cache, args.files.as_slice(), args.mode(), desc);
    if player.tracks().is_empty() {
        bail!("none of the input files could be loaded");
    }
    log::info!(
        "Loaded {} tracks at {} Hz",
        player.tracks().len(),
        player.tracks().sample_rate().unwrap_or_default()
    );

    for (path, gain) in &args.volumes {
        player.set_volume(path, *gain);
    }

    let limit = args.seconds.map(Duration::from_secs_f64);
    let started = Instant::now();
    player.play();

    loop {
        for event in player.poll_events() {
            if event.is_error() {
                log::warn!("{:?}", event);
            } else {
                log::info!("{:?}", event);
            }
        }
        if !player.is_playing() {
            break;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            log::info!("Time limit reached at {:.2}s", player.get_time());
            player.stop();
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    // The stream thread records the outcome shortly after playback ends.
    let deadline = Instant::now() + Duration::from_secs(1);
    while player.last_outcome().is_none() && Instant::now() < deadline {
        std::thread::sleep(POLL_INTERVAL);
    }

    match player.last_outcome() {
        Some(SessionOutcome::RetriesExhausted { attempts }) => {
            bail!("could not open an output stream after {} attempts", attempts)
        }
        outcome => {
            log::info!("Playback ended: {:?}", outcome);
            Ok(())
        }
    }
}
