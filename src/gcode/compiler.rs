//! G-code to waveform compiler.
//!
//! Runs a G-code program through the transformer, the modulator and the codec
//! into a 16-bit stereo WAV stream, and writes the cue list that tells the
//! player where to wait for the resin to rise.
//!
//! Every Z move becomes one or more sublayers. For each sublayer the galvos
//! rapid to the dwell point, one waveform period of dwell audio is written and
//! wrapped in a `LoopUntilHeight` cue. If the requested Z is still above the
//! new sublayer height, the layer's instructions are compiled again from the
//! last layer checkpoint, so the same geometry is drawn once per sublayer.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::{codec, Modulator, Point3, PositionTransformer};
use crate::cue::{Cue, CueWriter, HEIGHT_TOLERANCE};
use crate::error::{Axis, ConfigError, Error, GeometryError, ParseError, Result};
use crate::tuning::TuningCollection;

use super::instruction::{parse_line, Code, Instruction, Move};

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

const Z_TOLERANCE: f64 = HEIGHT_TOLERANCE;

/// Longest single move, in seconds of audio.
const MAX_MOVE_SECONDS: u64 = 3600;

/// Where a layer starts, so it can be compiled again for the next sublayer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerCheckpoint {
    pub x: f64,
    pub y: f64,
    pub feed_rate: Option<f64>,
    pub extruder_on: bool,
    pub extruder_pwm: f64,
    /// Index of the first line of the layer.
    pub line: usize,
}

/// Machine state for one compilation run.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineState {
    pub x: f64,
    pub y: f64,
    /// Logical height, always `sublayer * sublayer_height`.
    pub z: f64,
    pub sublayer: u64,
    /// Last Z the program asked for and that has been fully reached.
    pub requested_z: f64,
    /// Requested feed rate in mm/s, before PWM scaling and clamping.
    pub feed_rate: Option<f64>,
    pub extruder_on: bool,
    /// Drawing moves run at `feed_rate / extruder_pwm`.
    pub extruder_pwm: f64,
    /// Frames written so far.
    pub frame: u64,
    /// First frame of the cue being built.
    pub cue_start: u64,
    /// Index of the next line to execute.
    pub line: usize,
    pub layer_start: LayerCheckpoint,
    /// Line index of the Z move that rewound the current layer, while replaying.
    pub replaying: Option<usize>,
}

impl Default for MachineState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            sublayer: 0,
            requested_z: 0.0,
            feed_rate: None,
            extruder_on: false,
            extruder_pwm: 1.0,
            frame: 0,
            cue_start: 0,
            line: 0,
            layer_start: LayerCheckpoint {
                x: 0.0,
                y: 0.0,
                feed_rate: None,
                extruder_on: false,
                extruder_pwm: 1.0,
                line: 0,
            },
            replaying: None,
        }
    }
}

/// What a compilation produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompileSummary {
    pub sample_rate: u32,
    pub frames: u64,
    pub cues: usize,
    pub layers: usize,
    pub sublayers: usize,
    /// Lines executed, counting replayed lines each time.
    pub lines_executed: usize,
    pub program_lines: usize,
}

impl CompileSummary {
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Single-pass compiler writing to a WAV stream and a cue stream.
pub struct Compiler<'a, W: Write + Seek, C: Write> {
    tuning: &'a TuningCollection,
    transformer: PositionTransformer<'a>,
    modulator: Modulator,
    sample_rate: u32,
    wav: WavWriter<W>,
    cues: CueWriter<C>,
    state: MachineState,
    warned_codes: HashSet<Code>,
    warned_params: HashSet<char>,
    warned_feed: [bool; 2],
    warned_combined_move: bool,
    cue_count: usize,
    layers: usize,
    sublayers: usize,
    lines_executed: usize,
}

impl<'a, W: Write + Seek, C: Write> Compiler<'a, W, C> {
    pub fn new(
        tuning: &'a TuningCollection,
        sample_rate: u32,
        wav_out: W,
        cue_out: C,
    ) -> Result<Self> {
        if sample_rate == 0 {
            return Err(ConfigError::NotPositive {
                field: "sample_rate",
                value: 0.0,
            }
            .into());
        }
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        Ok(Self {
            tuning,
            transformer: PositionTransformer::new(tuning),
            modulator: tuning.modulator(sample_rate),
            sample_rate,
            wav: WavWriter::new(wav_out, spec)?,
            cues: CueWriter::new(cue_out)?,
            state: MachineState::default(),
            warned_codes: HashSet::new(),
            warned_params: HashSet::new(),
            warned_feed: [false; 2],
            warned_combined_move: false,
            cue_count: 0,
            layers: 0,
            sublayers: 0,
            lines_executed: 0,
        })
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    /// Compile a whole program and finalize both outputs.
    pub fn compile(mut self, program: &str) -> Result<CompileSummary> {
        let lines: Vec<&str> = program.lines().collect();
        let total = lines.len();
        let notify_every = (total / 100).max(1);
        let mut furthest = 0;

        while self.state.line < total {
            let index = self.state.line;
            self.state.line += 1;
            self.lines_executed += 1;

            // Progress counts first visits only; replayed layers would repeat it.
            if index >= furthest {
                furthest = index + 1;
                if furthest % notify_every == 0 {
                    tracing::info!(
                        "Processing line {} of {} ({}%)",
                        furthest,
                        total,
                        (100 * furthest).div_ceil(total)
                    );
                }
            }

            let text = lines[index];
            let Some(instruction) = parse_line(index + 1, text)? else {
                continue;
            };
            self.execute(index, text, instruction)
                .map_err(|source| match source {
                    Error::Parse(_) => source,
                    other => Error::Instruction {
                        line: index + 1,
                        text: text.trim().to_string(),
                        source: Box::new(other),
                    },
                })?;
        }

        self.close_play_cue()?;
        self.finish(total)
    }

    fn finish(self, program_lines: usize) -> Result<CompileSummary> {
        let summary = CompileSummary {
            sample_rate: self.sample_rate,
            frames: self.state.frame,
            cues: self.cue_count,
            layers: self.layers,
            sublayers: self.sublayers,
            lines_executed: self.lines_executed,
            program_lines,
        };
        self.wav.finalize()?;
        self.cues.finish()?;
        tracing::info!(
            frames = summary.frames,
            cues = summary.cues,
            layers = summary.layers,
            sublayers = summary.sublayers,
            "compilation finished ({:.1} s of audio)",
            summary.duration_secs()
        );
        Ok(summary)
    }

    fn execute(&mut self, index: usize, text: &str, instruction: Instruction) -> Result<()> {
        match instruction {
            Instruction::Move(mv) => self.execute_move(index, text, mv),
            Instruction::AbsolutePositioning | Instruction::Millimetres => Ok(()),
            Instruction::Home => {
                self.check_bounds(0.0, 0.0)?;
                self.rapid_to(0.0, 0.0)
            }
            Instruction::ExtruderOn => {
                self.state.extruder_on = true;
                Ok(())
            }
            Instruction::ExtruderOff => {
                self.state.extruder_on = false;
                Ok(())
            }
            Instruction::ExtruderPwm(pwm) => {
                if let Some(pwm) = pwm {
                    self.state.extruder_pwm = pwm;
                }
                Ok(())
            }
            Instruction::Unsupported(code) => {
                if self.warned_codes.insert(code) {
                    tracing::warn!("Code {code} is not supported and will be ignored");
                }
                Ok(())
            }
        }
    }

    fn execute_move(&mut self, index: usize, text: &str, mv: Move) -> Result<()> {
        for &letter in &mv.ignored {
            if self.warned_params.insert(letter) {
                tracing::warn!("Move parameter {letter} is not supported and will be ignored");
            }
        }
        if let Some(feed) = mv.feed_rate {
            self.state.feed_rate = Some(feed);
        }

        // A replayed layer may only contain the Z move that rewound it.
        if let (Some(_), Some(origin)) = (mv.z, self.state.replaying) {
            if origin != index {
                return Err(GeometryError::MultipleZMoves {
                    expected: origin + 1,
                    found: index + 1,
                }
                .into());
            }
        }

        let new_z = match mv.z {
            Some(z) if z < self.state.requested_z - Z_TOLERANCE => {
                return Err(GeometryError::DownwardZ {
                    from: self.state.requested_z,
                    to: z,
                }
                .into());
            }
            Some(z) if z > self.state.z + Z_TOLERANCE => Some(z),
            Some(z) => {
                self.state.requested_z = self.state.requested_z.max(z);
                None
            }
            None => None,
        };

        if mv.is_lateral() {
            if new_z.is_some() && !self.warned_combined_move {
                self.warned_combined_move = true;
                tracing::warn!(
                    "Line {}: X/Y and Z in one move; moving laterally first, then changing height",
                    index + 1
                );
            }
            let x = mv.x.unwrap_or(self.state.x);
            let y = mv.y.unwrap_or(self.state.y);
            self.check_bounds(x, y)?;
            if mv.rapid || self.state.extruder_pwm == 0.0 {
                self.rapid_to(x, y)?;
            } else {
                let feed = self.state.feed_rate.ok_or_else(|| {
                    ParseError::new(index + 1, text.trim(), "move has no feed rate")
                })?;
                let feed = self.clamp_feed_rate(feed);
                let laser = mv.extrude || self.state.extruder_on;
                self.draw_to(x, y, feed, laser)?;
            }
        }

        if let Some(z) = new_z {
            self.change_height(index, z)?;
        }
        Ok(())
    }

    /// Add one sublayer towards `target`, rewinding the layer if it is not
    /// reached yet.
    fn change_height(&mut self, index: usize, target: f64) -> Result<()> {
        let (layer_x, layer_y) = (self.state.x, self.state.y);
        let (dwell_x, dwell_y) = (self.tuning.dwell_x, self.tuning.dwell_y);

        self.rapid_to(dwell_x, dwell_y)?;
        self.close_play_cue()?;

        let period = self.modulator.waveform_period();
        let dwell = vec![Point3::new(dwell_x, dwell_y, self.state.z); period];
        self.write_points(&dwell)?;

        self.state.sublayer += 1;
        self.state.z = self.state.sublayer as f64 * self.tuning.sublayer_height;
        self.sublayers += 1;
        self.write_cue(Cue::LoopUntilHeight {
            start_frame: self.state.cue_start,
            end_frame: self.state.frame,
            until_height: self.state.z,
        })?;

        if self.state.z < target - Z_TOLERANCE {
            let checkpoint = self.state.layer_start;
            tracing::debug!(
                z = self.state.z,
                target,
                line = checkpoint.line + 1,
                "sublayer done, replaying layer"
            );
            self.rapid_to(checkpoint.x, checkpoint.y)?;
            self.state.feed_rate = checkpoint.feed_rate;
            self.state.extruder_on = checkpoint.extruder_on;
            self.state.extruder_pwm = checkpoint.extruder_pwm;
            self.state.line = checkpoint.line;
            self.state.replaying = Some(index);
        } else {
            tracing::debug!(z = self.state.z, target, "layer done");
            self.rapid_to(layer_x, layer_y)?;
            self.state.requested_z = target;
            self.state.layer_start = LayerCheckpoint {
                x: layer_x,
                y: layer_y,
                feed_rate: self.state.feed_rate,
                extruder_on: self.state.extruder_on,
                extruder_pwm: self.state.extruder_pwm,
                line: index + 1,
            };
            self.state.replaying = None;
            self.layers += 1;
        }
        Ok(())
    }

    /// Scale a requested feed rate by the extruder PWM and clip it to the
    /// axis limits. `extruder_pwm` must be positive.
    fn clamp_feed_rate(&mut self, requested: f64) -> f64 {
        let pwm = self.state.extruder_pwm;
        let mut feed = requested / pwm;
        for (slot, (axis, max)) in [
            (Axis::X, self.tuning.velocity_x_max),
            (Axis::Y, self.tuning.velocity_y_max),
        ]
        .into_iter()
        .enumerate()
        {
            if feed > max {
                if !self.warned_feed[slot] {
                    self.warned_feed[slot] = true;
                    tracing::warn!(
                        "Effective feed rate {feed} mm/s ({requested} mm/s at extruder PWM {pwm}) exceeds the {axis} axis maximum of {max} mm/s; clipping"
                    );
                }
                feed = max;
            }
        }
        feed
    }

    fn check_bounds(&self, x: f64, y: f64) -> Result<()> {
        let tc = self.tuning;
        for (axis, value, min, max) in [
            (Axis::X, x, tc.build_x_min, tc.build_x_max),
            (Axis::Y, y, tc.build_y_min, tc.build_y_max),
        ] {
            if !(min..=max).contains(&value) {
                return Err(GeometryError::OutOfBounds {
                    axis,
                    value,
                    min,
                    max,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Fastest coordinated move to `(x, y)` with the laser off.
    fn rapid_to(&mut self, x: f64, y: f64) -> Result<()> {
        let dx = x - self.state.x;
        let dy = y - self.state.y;
        let distance = dx.hypot(dy);
        if distance <= 0.0 {
            return Ok(());
        }
        let (cos_x, cos_y) = (dx / distance, dy / distance);
        let (vx, vy) = (self.tuning.velocity_x_max, self.tuning.velocity_y_max);
        let feed = if cos_y == 0.0 {
            vx
        } else if cos_x == 0.0 {
            vy
        } else {
            (vx / cos_x.abs()).min(vy / cos_y.abs())
        };
        self.modulator.set_laser_enabled(false);
        self.move_to(x, y, feed)
    }

    fn draw_to(&mut self, x: f64, y: f64, feed: f64, laser: bool) -> Result<()> {
        self.modulator.set_laser_enabled(laser);
        self.move_to(x, y, feed)
    }

    /// Constant-velocity move at the current height. Sample `i` of `n` sits
    /// at fraction `(i + 1) / n`, so the target is the last sample.
    fn move_to(&mut self, x: f64, y: f64, feed: f64) -> Result<()> {
        let (x0, y0, z) = (self.state.x, self.state.y, self.state.z);
        let (dx, dy) = (x - x0, y - y0);
        let distance = dx.hypot(dy);
        if distance <= 0.0 {
            return Ok(());
        }
        let samples = (distance * self.sample_rate as f64 / feed).ceil();
        let max = self.sample_rate as u64 * MAX_MOVE_SECONDS;
        if samples > max as f64 {
            return Err(GeometryError::MoveTooLong {
                distance,
                feed,
                samples,
                max,
            }
            .into());
        }
        let n = (samples as usize).max(1);
        let points: Vec<Point3> = (1..=n)
            .map(|i| {
                let t = i as f64 / n as f64;
                Point3::new(x0 + dx * t, y0 + dy * t, z)
            })
            .collect();
        self.write_points(&points)?;
        self.state.x = x;
        self.state.y = y;
        Ok(())
    }

    fn write_points(&mut self, points: &[Point3]) -> Result<()> {
        let values = self.transformer.transform(points);
        let values = codec::clip(&values);
        let values = self.modulator.modulate_values(&values)?;
        let frames = codec::encode(&values)?;
        for frame in &frames {
            self.wav.write_sample(frame.left)?;
            self.wav.write_sample(frame.right)?;
        }
        self.state.frame += frames.len() as u64;
        Ok(())
    }

    fn write_cue(&mut self, cue: Cue) -> Result<()> {
        tracing::debug!(%cue, "cue");
        self.cues.write_cue(&cue)?;
        self.cue_count += 1;
        self.state.cue_start = cue.end_frame();
        Ok(())
    }

    fn close_play_cue(&mut self) -> Result<()> {
        if self.state.frame > self.state.cue_start {
            self.write_cue(Cue::Play {
                start_frame: self.state.cue_start,
                end_frame: self.state.frame,
            })?;
        }
        Ok(())
    }
}

/// Compile `program` into the given WAV and cue streams.
pub fn compile_program<W: Write + Seek, C: Write>(
    tuning: &TuningCollection,
    sample_rate: u32,
    program: &str,
    wav_out: W,
    cue_out: C,
) -> Result<CompileSummary> {
    Compiler::new(tuning, sample_rate, wav_out, cue_out)?.compile(program)
}

/// Compile a G-code file into a WAV file and a cue file.
pub fn compile_file(
    tuning: &TuningCollection,
    gcode_path: &Path,
    wav_path: &Path,
    cue_path: &Path,
    sample_rate: u32,
) -> Result<CompileSummary> {
    tracing::info!(
        "Converting G-code file {} into wave file {} and cue file {}",
        gcode_path.display(),
        wav_path.display(),
        cue_path.display()
    );
    let program = fs::read_to_string(gcode_path)?;
    let wav_out = BufWriter::new(File::create(wav_path)?);
    let cue_out = BufWriter::new(File::create(cue_path)?);
    compile_program(tuning, sample_rate, &program, wav_out, cue_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Frame;
    use crate::cue::read_cues;
    use crate::tuning::ModulationScheme;
    use assert_approx_eq::assert_approx_eq;
    use std::io::Cursor;

    const RATE: u32 = 1000;

    #[derive(Debug)]
    struct Output {
        summary: CompileSummary,
        frames: Vec<Frame>,
        cues: Vec<Cue>,
    }

    fn tuning() -> TuningCollection {
        TuningCollection::new(ModulationScheme::DirectConnection)
    }

    fn run(tuning: &TuningCollection, program: &str) -> Result<Output> {
        let mut wav = Cursor::new(Vec::new());
        let mut cue_text = Vec::new();
        let summary = compile_program(tuning, RATE, program, &mut wav, &mut cue_text)?;

        let reader = hound::WavReader::new(Cursor::new(wav.into_inner()))?;
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().bits_per_sample, 16);
        assert_eq!(reader.spec().sample_rate, RATE);
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<_, _>>()?;
        let frames = samples
            .chunks(2)
            .map(|pair| Frame::new(pair[0], pair[1]))
            .collect();
        let cues = read_cues(Cursor::new(cue_text))?;
        Ok(Output {
            summary,
            frames,
            cues,
        })
    }

    fn loops(cues: &[Cue]) -> Vec<f64> {
        cues.iter()
            .filter_map(|c| match c {
                Cue::LoopUntilHeight { until_height, .. } => Some(*until_height),
                Cue::Play { .. } => None,
            })
            .collect()
    }

    const TWO_SUBLAYERS: &str = "G90\nG1 X1 Y0 F600\nG1 Z0.02\nG1 X0 Y0 F600\n";

    #[test]
    fn single_move_is_one_play_cue() {
        let out = run(&tuning(), "G90\nG1 X1 Y0 F600\n").unwrap();
        // 1 mm at 10 mm/s and 1 kHz.
        assert_eq!(out.frames.len(), 100);
        assert_eq!(
            out.cues,
            vec![Cue::Play {
                start_frame: 0,
                end_frame: 100
            }]
        );
        // Direct connection with the laser off: 0.75 of full scale at x = 1.
        let last = out.frames[99];
        assert_eq!(last.left, (0.75 * 32767.0f64).round() as i16);
        assert_eq!(last.right, 0);
    }

    #[test]
    fn first_sample_is_not_the_start_point() {
        let out = run(&tuning(), "G1 X1 F600\n").unwrap();
        assert!(out.frames[0].left > 0);
    }

    #[test]
    fn z_move_emits_one_loop_per_sublayer() {
        let out = run(&tuning(), TWO_SUBLAYERS).unwrap();
        assert_eq!(
            out.cues,
            vec![
                Cue::Play {
                    start_frame: 0,
                    end_frame: 103
                },
                Cue::LoopUntilHeight {
                    start_frame: 103,
                    end_frame: 111,
                    until_height: 0.01
                },
                Cue::Play {
                    start_frame: 111,
                    end_frame: 214
                },
                Cue::LoopUntilHeight {
                    start_frame: 214,
                    end_frame: 222,
                    until_height: 2.0 * 0.01
                },
                Cue::Play {
                    start_frame: 222,
                    end_frame: 325
                },
            ]
        );
        assert_eq!(out.summary.frames, 325);
        assert_eq!(out.summary.sublayers, 2);
        assert_eq!(out.summary.layers, 1);
        assert_eq!(out.summary.program_lines, 4);
        // Lines 0..=2 run twice.
        assert_eq!(out.summary.lines_executed, 7);
    }

    #[test]
    fn each_sublayer_replays_the_layer_geometry() {
        let out = run(&tuning(), TWO_SUBLAYERS).unwrap();
        let first_pass = &out.frames[0..100];
        let second_play = &out.frames[111..214];
        assert!(second_play.windows(100).any(|w| w == first_pass));
    }

    #[test]
    fn dwell_loop_is_one_waveform_period_at_dwell() {
        let out = run(&tuning(), TWO_SUBLAYERS).unwrap();
        for cue in &out.cues {
            if let Cue::LoopUntilHeight {
                start_frame,
                end_frame,
                ..
            } = *cue
            {
                assert_eq!(end_frame - start_frame, 8);
                for frame in &out.frames[start_frame as usize..end_frame as usize] {
                    assert_eq!(*frame, Frame::new(0, 0));
                }
            }
        }
    }

    #[test]
    fn requested_z_between_sublayers_rounds_up() {
        let out = run(&tuning(), "G1 X0.5 Y0 F600\nG1 Z0.025\nG1 X0 F600\n").unwrap();
        assert_eq!(loops(&out.cues).len(), 3);
        let heights = loops(&out.cues);
        assert_approx_eq!(*heights.last().unwrap(), 0.03);
    }

    #[test]
    fn z_already_reached_adds_no_sublayer() {
        let out = run(
            &tuning(),
            "G1 X0.5 F600\nG1 Z0.025\nG1 X0 F600\nG1 Z0.028\nG1 X0.5 F600\n",
        )
        .unwrap();
        assert_eq!(loops(&out.cues).len(), 3);
    }

    #[test]
    fn successive_layers() {
        let program = "G1 X0.5 Y0.5 F600\nG1 Z0.01\nG1 X-0.5 F600\nG1 Z0.02\nG1 X0 F600\n";
        let out = run(&tuning(), program).unwrap();
        let heights = loops(&out.cues);
        assert_eq!(heights.len(), 2);
        assert_approx_eq!(heights[0], 0.01);
        assert_approx_eq!(heights[1], 0.02);
        assert_eq!(out.summary.layers, 2);
    }

    #[test]
    fn cues_are_contiguous_and_cover_the_audio() {
        let out = run(&tuning(), TWO_SUBLAYERS).unwrap();
        let mut expected_start = 0;
        for cue in &out.cues {
            assert_eq!(cue.start_frame(), expected_start);
            expected_start = cue.end_frame();
        }
        assert_eq!(expected_start, out.frames.len() as u64);
    }

    #[test]
    fn compilation_is_deterministic() {
        let program = "G1 X0.3 Y-0.2 F900 E1\nG1 Z0.03\nG1 X-0.4 Y0.4 F300 E2\n";
        let a = run(&tuning(), program).unwrap();
        let b = run(&tuning(), program).unwrap();
        assert_eq!(a.frames, b.frames);
        assert_eq!(a.cues, b.cues);
    }

    #[test]
    fn extrude_flag_enables_side_tone() {
        let dark = run(&tuning(), "G1 X1 F600\n").unwrap();
        let lit = run(&tuning(), "G1 X1 F600 E1\n").unwrap();
        assert_eq!(dark.frames.len(), lit.frames.len());
        assert_ne!(dark.frames, lit.frames);
    }

    #[test]
    fn m101_enables_laser_for_following_moves() {
        let lit = run(&tuning(), "G1 X1 F600 E1\n").unwrap();
        let m101 = run(&tuning(), "M101\nG1 X1 F600\n").unwrap();
        assert_eq!(lit.frames, m101.frames);
    }

    #[test]
    fn out_of_bounds_is_fatal_with_line() {
        let err = run(&tuning(), "G90\nG1 X2 Y0 F600\n").unwrap_err();
        match err {
            Error::Instruction { line, text, source } => {
                assert_eq!(line, 2);
                assert_eq!(text, "G1 X2 Y0 F600");
                assert!(matches!(
                    *source,
                    Error::Geometry(GeometryError::OutOfBounds { axis: Axis::X, .. })
                ));
            }
            other => panic!("expected instruction error, got {other:?}"),
        }
    }

    #[test]
    fn downward_z_is_fatal() {
        let err = run(&tuning(), "G1 X0.1 F600\nG1 Z0.02\nG1 Z0.01\n").unwrap_err();
        assert!(matches!(
            err.root(),
            Error::Geometry(GeometryError::DownwardZ { .. })
        ));
    }

    #[test]
    fn second_z_move_in_replayed_layer_is_fatal() {
        // The layer holds a Z word on line 2 besides the rewinding one on line 4.
        let program = "G1 X0.1 F600\nG1 Z0\nG1 X0.2 F600\nG1 Z0.02\n";
        let err = run(&tuning(), program).unwrap_err();
        assert!(
            matches!(
                err.root(),
                Error::Geometry(GeometryError::MultipleZMoves {
                    expected: 4,
                    found: 2
                })
            ),
            "got {err:?}"
        );
    }

    #[test]
    fn move_without_feed_rate_is_parse_error() {
        let err = run(&tuning(), "G1 X0.5\n").unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError { line: 1, .. })));
    }

    #[test]
    fn malformed_parameter_is_parse_error() {
        let err = run(&tuning(), "G90\nG1 X0.5 Fast\n").unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError { line: 2, .. })));
    }

    #[test]
    fn feed_rate_clamped_to_axis_limit() {
        let mut tc = tuning();
        tc.velocity_x_max = 50.0;
        tc.velocity_y_max = 50.0;
        // 6000 mm/min = 100 mm/s, clamped to 50 mm/s: 1 mm takes 20 frames.
        let out = run(&tc, "G1 X1 F6000\n").unwrap();
        assert_eq!(out.frames.len(), 20);
    }

    #[test]
    fn extruder_pwm_scales_drawing_speed() {
        // F300 is 5 mm/s; at PWM 0.5 the move runs at 10 mm/s.
        let out = run(&tuning(), "M113 S0.5\nG1 X1 F300\n").unwrap();
        assert_eq!(out.frames.len(), 100);
        let full = run(&tuning(), "G1 X1 F300\n").unwrap();
        assert_eq!(full.frames.len(), 200);
    }

    #[test]
    fn extruder_pwm_without_value_keeps_current() {
        let out = run(&tuning(), "M113 S0.5\nM113\nG1 X1 F300\n").unwrap();
        assert_eq!(out.frames.len(), 100);
    }

    #[test]
    fn zero_extruder_pwm_turns_draws_into_rapids() {
        let rapid = run(&tuning(), "G0 X1\n").unwrap();
        let out = run(&tuning(), "M113 S0\nG1 X1 F600 E1\n").unwrap();
        assert_eq!(out.frames, rapid.frames);
        // No feed rate is needed while the PWM is zero.
        assert!(run(&tuning(), "M113 S0\nG1 X1\n").is_ok());
    }

    #[test]
    fn effective_feed_rate_is_clamped() {
        let mut tc = tuning();
        tc.velocity_x_max = 50.0;
        tc.velocity_y_max = 50.0;
        // 30 mm/s at PWM 0.25 asks for 120 mm/s, clipped to 50 mm/s.
        let out = run(&tc, "M113 S0.25\nG1 X1 F1800\n").unwrap();
        assert_eq!(out.frames.len(), 20);
    }

    #[test]
    fn replayed_layer_restores_extruder_pwm() {
        // The layer starts at PWM 1 and ends at 0.5; the replay must start at 1 again.
        let program = "G1 X1 F600\nM113 S0.5\nG1 X0 F300\nG1 Z0.02\n";
        let out = run(&tuning(), program).unwrap();
        let plays: Vec<u64> = out
            .cues
            .iter()
            .filter(|c| matches!(c, Cue::Play { .. }))
            .map(Cue::len)
            .collect();
        assert_eq!(plays.len(), 2);
        assert_eq!(plays[0], plays[1]);
    }

    #[test]
    fn move_needing_too_many_samples_is_fatal() {
        let err = run(&tuning(), "G1 X0.1 F600\nG1 X1 F1e-9\n").unwrap_err();
        match err {
            Error::Instruction { line, source, .. } => {
                assert_eq!(line, 2);
                assert!(matches!(
                    *source,
                    Error::Geometry(GeometryError::MoveTooLong { max: 3_600_000, .. })
                ));
            }
            other => panic!("expected instruction error, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_codes_are_ignored() {
        let out = run(&tuning(), "M104 S200\nG4 P10\nM104 S0\nG1 X1 F600\n").unwrap();
        assert_eq!(out.frames.len(), 100);
    }

    #[test]
    fn home_rapids_to_origin() {
        let out = run(&tuning(), "G1 X1 F600\nG28\n").unwrap();
        // Rapid back along X at 400 mm/s: ceil(2.5) samples.
        assert_eq!(out.frames.len(), 103);
        assert_eq!(*out.frames.last().unwrap(), Frame::new(0, 0));
    }

    #[test]
    fn rapid_uses_coordinated_axis_limit() {
        let mut tc = tuning();
        tc.velocity_x_max = 100.0;
        tc.velocity_y_max = 400.0;
        // On a diagonal the slower X axis sets the coordinated speed.
        let out = run(&tc, "G0 X1 Y1\n").unwrap();
        let distance = 1.0f64.hypot(1.0);
        let cos = 1.0 / distance;
        let feed = (100.0 / cos).min(400.0 / cos);
        let expected = (distance * RATE as f64 / feed).ceil() as usize;
        assert_eq!(out.frames.len(), expected);
        assert!(expected >= 10);
    }

    #[test]
    fn amplitude_scheme_compiles() {
        let tc = TuningCollection::new(ModulationScheme::Amplitude);
        let out = run(&tc, TWO_SUBLAYERS).unwrap();
        assert_eq!(loops(&out.cues).len(), 2);
        // Laser-off carrier period.
        if let Cue::LoopUntilHeight {
            start_frame,
            end_frame,
            ..
        } = out.cues[1]
        {
            assert_eq!(end_frame - start_frame, 8);
        }
    }

    #[test]
    fn zero_sample_rate_rejected() {
        let tc = tuning();
        let result = Compiler::new(&tc, 0, Cursor::new(Vec::new()), Vec::new());
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::NotPositive { .. }))
        ));
    }
}
