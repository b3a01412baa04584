//! peachy: compile G-code to galvo audio and play it back against a drip
//! counter.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};

use peachy::audio::{AudioInput, AudioOutput, SampleSource};
use peachy::cue::load_cues;
use peachy::drip::{DripDetector, DripGovernor, DripSensor, SimulatedDripDetector};
use peachy::gcode::{compile_file, scramble_layers, ExposureTest, LayerMixer, DEFAULT_SAMPLE_RATE};
use peachy::logging::init_logging;
use peachy::player::{CuedPlayer, PlayerConfig, WaveCursor};
use peachy::tuning::{load_tuning, tuning_path};
use peachy::Result;

#[derive(Parser)]
#[command(name = "peachy", version, about = "Audio-driven stereolithography toolchain")]
struct Cli {
    /// Log per-cue and per-drip detail.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a G-code file into a wave file and a cue file.
    Compile {
        gcode: PathBuf,
        wav: PathBuf,
        cue: PathBuf,
        /// Tuning file; defaults to ~/.peachy/tuning.yaml.
        #[arg(long)]
        tuning: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,
    },
    /// Play a compiled print, advancing sublayers as drips are heard.
    Play {
        wav: PathBuf,
        cue: PathBuf,
        /// Tuning file; defaults to ~/.peachy/tuning.yaml.
        #[arg(long)]
        tuning: Option<PathBuf>,
        /// Serial port of the drip actuator.
        #[arg(long)]
        port: Option<PathBuf>,
        /// Player settings; defaults to ~/.peachy/player.yaml.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Count virtual drips at this rate (per second) instead of listening.
        #[arg(long, value_name = "RATE")]
        virtual_drips: Option<f64>,
    },
    /// Count drips heard on the microphone until interrupted.
    Listen {
        #[arg(long)]
        config: Option<PathBuf>,
        /// Drips per unit of build height, for the height readout.
        #[arg(long, default_value_t = 1.0)]
        drips_per_height: f64,
    },
    /// Rotate each layer's start point so layer seams do not stack.
    Mix {
        input: PathBuf,
        output: PathBuf,
        /// Pick a seeded random start per layer instead of a steady shift.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write an exposure test pattern: a base, then one layer per speed.
    Exposure {
        output: PathBuf,
        /// Half the side of the test square.
        #[arg(long, default_value_t = 5.0)]
        size: f64,
        /// Slowest test speed (mm/min).
        #[arg(long, default_value_t = 100.0)]
        start_speed: f64,
        /// Speed at which the test stops (mm/min, exclusive).
        #[arg(long, default_value_t = 1000.0)]
        max_speed: f64,
        #[arg(long, default_value_t = 50.0)]
        speed_increment: f64,
        #[arg(long, default_value_t = 100)]
        layers_per_unit: u32,
        /// Height of the base.
        #[arg(long, default_value_t = 3.0)]
        base_height: f64,
        /// Speed of the base layers (mm/min).
        #[arg(long, default_value_t = 400.0)]
        base_speed: f64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Compile {
            gcode,
            wav,
            cue,
            tuning,
            sample_rate,
        } => compile(&tuning_path(tuning.as_deref()), &gcode, &wav, &cue, sample_rate),
        Command::Play {
            wav,
            cue,
            tuning,
            port,
            config,
            virtual_drips,
        } => play(
            &tuning_path(tuning.as_deref()),
            &wav,
            &cue,
            port.as_deref(),
            config.as_deref(),
            virtual_drips,
        ),
        Command::Listen {
            config,
            drips_per_height,
        } => listen(config.as_deref(), drips_per_height),
        Command::Mix {
            input,
            output,
            seed,
        } => mix(&input, &output, seed),
        Command::Exposure {
            output,
            size,
            start_speed,
            max_speed,
            speed_increment,
            layers_per_unit,
            base_height,
            base_speed,
        } => exposure(
            &output,
            &ExposureTest {
                size,
                start_speed,
                max_speed,
                speed_increment,
                layers_per_unit,
                base_height,
                base_speed,
            },
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn compile(tuning: &Path, gcode: &Path, wav: &Path, cue: &Path, sample_rate: u32) -> Result<()> {
    tracing::info!("Using tuning file {}", tuning.display());
    let tuning = load_tuning(tuning)?;
    let summary = compile_file(&tuning, gcode, wav, cue, sample_rate)?;
    tracing::info!(
        "Wrote {} frames ({:.1} s), {} cues, {} layers, {} sublayers",
        summary.frames,
        summary.duration_secs(),
        summary.cues,
        summary.layers,
        summary.sublayers
    );
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PlayerConfig> {
    match path {
        Some(path) => PlayerConfig::load_from(path),
        None => Ok(PlayerConfig::load().unwrap_or_default()),
    }
}

/// Raised by Ctrl-C.
fn interrupt_flag() -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::warn!("could not install Ctrl-C handler: {e}");
    }
    stop
}

fn play(
    tuning: &Path,
    wav: &Path,
    cue: &Path,
    port: Option<&Path>,
    config: Option<&Path>,
    virtual_drips: Option<f64>,
) -> Result<()> {
    let tuning = load_tuning(tuning)?;
    let config = load_config(config)?;
    let cursor = WaveCursor::open(wav)?;
    let cues = load_cues(cue)?;
    tracing::info!(
        "Playing {} ({} frames at {} Hz, {} cues)",
        wav.display(),
        cursor.total_frames(),
        cursor.sample_rate(),
        cues.len()
    );

    let sensor: Box<dyn DripSensor> = match virtual_drips {
        Some(rate) => {
            tracing::info!("using virtual drips at {rate} per second");
            Box::new(SimulatedDripDetector::new(
                config.input_sample_rate,
                rate,
                tuning.drips_per_height,
            ))
        }
        None => Box::new(DripDetector::new(
            config.detector_settings(tuning.drips_per_height),
        )),
    };
    let output = AudioOutput::open(cursor.sample_rate(), config.output_buffer_frames)?;
    let input = AudioInput::open(config.input_sample_rate, config.input_buffer_samples)?;

    let actuator = match port {
        Some(port) => Some(DripGovernor::open_serial(
            &port.to_string_lossy(),
            config.actuator_baud_rate,
            config.actuator_repeat_interval(),
        )?),
        None => None,
    };

    let mut player = CuedPlayer::new(cursor, cues, output, input, sensor, config)?;
    if let Some(actuator) = actuator {
        player = player.with_actuator(Box::new(actuator));
    }

    let stop = interrupt_flag();
    let summary = player.play(&stop)?;
    tracing::info!(
        "{} after {} frames: {} cues, {} loops, {} drips, height {:.4}",
        if summary.completed { "Print finished" } else { "Print stopped" },
        summary.frames_written,
        summary.cues_played,
        summary.loops,
        summary.drips,
        summary.height
    );
    Ok(())
}

fn listen(config: Option<&Path>, drips_per_height: f64) -> Result<()> {
    let config = load_config(config)?;
    let mut input = AudioInput::open(config.input_sample_rate, config.input_buffer_samples)?;
    let mut detector = DripDetector::new(config.detector_settings(drips_per_height));
    let stop = interrupt_flag();
    let mut buf = vec![0i16; config.input_buffer_samples];
    let mut reported = 0;

    tracing::info!("Listening for drips; press Ctrl-C to stop");
    while !stop.load(Ordering::SeqCst) {
        let n = input.read_samples(&mut buf);
        detector.add_samples(&buf[..n]);
        if detector.num_drips() != reported {
            reported = detector.num_drips();
            match detector.drip_rate() {
                Some(rate) => tracing::info!(
                    "{reported} drips, height {:.4}, {rate:.2} drips/s",
                    detector.height()
                ),
                None => tracing::info!("{reported} drips, height {:.4}", detector.height()),
            }
        }
        if n == 0 {
            thread::sleep(config.tick());
        }
    }
    input.close()?;
    tracing::info!("Counted {} drips", detector.num_drips());
    Ok(())
}

fn mix(input: &Path, output: &Path, seed: Option<u64>) -> Result<()> {
    let program = fs::read_to_string(input)?;
    let mixed = match seed {
        Some(seed) => scramble_layers(&program, seed),
        None => LayerMixer::new().mix(&program),
    };
    fs::write(output, mixed)?;
    tracing::info!("Wrote mixed program to {}", output.display());
    Ok(())
}

fn exposure(output: &Path, pattern: &ExposureTest) -> Result<()> {
    let gcode = pattern.generate()?;
    fs::write(output, gcode)?;
    tracing::info!(
        "Wrote exposure test ({} base layers, {} test layers) to {}",
        pattern.base_layers(),
        pattern.speeds().len(),
        output.display()
    );
    Ok(())
}
