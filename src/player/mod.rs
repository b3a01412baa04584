//! Real-time cued player.
//!
//! A single cooperative loop: each tick drains the microphone into the drip
//! sensor, then fills whatever output space is free from the current cue. At
//! the end of a `LoopUntilHeight` cue the measured height decides whether to
//! loop the dwell audio again or move on, and a bang-bang rule tells the
//! drip actuator to start or stop.

pub mod config;
pub mod cursor;

use std::io::{Read, Seek};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::{Frame, FrameSink, SampleSource};
use crate::cue::{Cue, HEIGHT_TOLERANCE};
use crate::drip::{DripActuator, DripSensor};
use crate::error::{AudioError, Error, Result};

pub use config::PlayerConfig;
pub use cursor::WaveCursor;

/// How often a slow sublayer is reported while it keeps looping.
const SLOW_WARNING_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one scheduling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No output space was free.
    Idle,
    /// This many frames were queued.
    Wrote(usize),
    /// Every cue has been played.
    Finished,
}

/// Totals reported when a session ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackSummary {
    pub frames_written: u64,
    pub loops: u64,
    pub cues_played: usize,
    pub drips: u64,
    pub height: f64,
    pub completed: bool,
}

pub struct CuedPlayer<R, O, I, S>
where
    R: Read + Seek,
    O: FrameSink,
    I: SampleSource,
    S: DripSensor,
{
    cursor: WaveCursor<R>,
    cues: Vec<Cue>,
    current: usize,
    output: O,
    input: I,
    sensor: S,
    actuator: Option<Box<dyn DripActuator>>,
    config: PlayerConfig,
    input_buf: Vec<i16>,
    frame_buf: Vec<Frame>,
    frames_written: u64,
    loops: u64,
    loop_started: Option<Instant>,
    last_slow_warning: Option<Instant>,
    finished: bool,
    closed: bool,
}

impl<R, O, I, S> CuedPlayer<R, O, I, S>
where
    R: Read + Seek,
    O: FrameSink,
    I: SampleSource,
    S: DripSensor,
{
    /// Set up a session. Fails if any cue lies beyond the end of the audio.
    pub fn new(
        cursor: WaveCursor<R>,
        cues: Vec<Cue>,
        output: O,
        input: I,
        sensor: S,
        config: PlayerConfig,
    ) -> Result<Self> {
        if let Some(cue) = cues.iter().find(|c| c.end_frame() > cursor.total_frames()) {
            return Err(AudioError::SeekPastEnd(cue.end_frame()).into());
        }
        let mut player = Self {
            cursor,
            cues,
            current: 0,
            output,
            input,
            sensor,
            actuator: None,
            config,
            input_buf: Vec::new(),
            frame_buf: Vec::new(),
            frames_written: 0,
            loops: 0,
            loop_started: None,
            last_slow_warning: None,
            finished: false,
            closed: false,
        };
        player.enter_cue()?;
        Ok(player)
    }

    pub fn with_actuator(mut self, actuator: Box<dyn DripActuator>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn current_cue(&self) -> Option<&Cue> {
        self.cues.get(self.current)
    }

    /// Index of the cue being played; equals the cue count once finished.
    pub fn cue_index(&self) -> usize {
        self.current
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn summary(&self) -> PlaybackSummary {
        PlaybackSummary {
            frames_written: self.frames_written,
            loops: self.loops,
            cues_played: self.current.min(self.cues.len()),
            drips: self.sensor.num_drips(),
            height: self.sensor.height(),
            completed: self.finished,
        }
    }

    /// Run one scheduling tick.
    pub fn step(&mut self) -> Result<Tick> {
        if self.finished {
            return Ok(Tick::Finished);
        }
        self.drain_input();

        let mut budget = self.output.write_available();
        let mut written = 0;
        loop {
            let Some(cue) = self.cues.get(self.current).copied() else {
                self.finished = true;
                tracing::info!(frames = self.frames_written, "all cues played");
                break;
            };
            if self.cursor.position() >= cue.end_frame() {
                if !self.end_of_cue(&cue)? {
                    break;
                }
                continue;
            }
            if budget == 0 {
                break;
            }

            let wanted = budget.min((cue.end_frame() - self.cursor.position()) as usize);
            let before = self.cursor.position();
            self.frame_buf.clear();
            let read = self.cursor.read_frames(&mut self.frame_buf, wanted)?;
            if read == 0 {
                // The cue promised frames the file does not hold.
                return Err(AudioError::SeekPastEnd(before).into());
            }
            let accepted = self.output.write_frames(&self.frame_buf[..read]);
            written += accepted;
            self.frames_written += accepted as u64;
            budget -= read.min(budget);
            if accepted < read {
                self.cursor.seek(before + accepted as u64)?;
                break;
            }
        }

        Ok(match (written, self.finished) {
            (0, true) => Tick::Finished,
            (0, false) => Tick::Idle,
            (n, _) => Tick::Wrote(n),
        })
    }

    /// Loop until every cue is played or `stop` is raised, then close the
    /// streams and the actuator whatever the outcome.
    pub fn play(mut self, stop: &AtomicBool) -> Result<PlaybackSummary> {
        let outcome = self.run(stop);
        let closed = self.close();
        outcome?;
        closed?;
        Ok(self.summary())
    }

    /// Loop `step` until finished or interrupted.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        let tick = self.config.tick();
        loop {
            if stop.load(Ordering::SeqCst) {
                tracing::warn!(
                    cue = self.current,
                    height = self.sensor.height(),
                    "playback interrupted"
                );
                return Ok(());
            }
            match self.step()? {
                Tick::Idle => thread::sleep(tick),
                Tick::Wrote(_) => {}
                Tick::Finished => return Ok(()),
            }
        }
    }

    /// Drain and close the output, close the input, stop and release the
    /// actuator. Every handle is closed even if an earlier one fails; the
    /// first error is returned.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut first_err: Option<Error> = None;
        if let Err(e) = self.output.close() {
            first_err.get_or_insert(e.into());
        }
        if let Err(e) = self.input.close() {
            first_err.get_or_insert(e.into());
        }
        if let Some(actuator) = self.actuator.as_mut() {
            if let Err(e) = actuator.stop().and_then(|_| actuator.close()) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn drain_input(&mut self) {
        let available = self.input.read_available();
        if available == 0 {
            return;
        }
        self.input_buf.resize(available, 0);
        let n = self.input.read_samples(&mut self.input_buf);
        self.sensor.add_samples(&self.input_buf[..n]);
    }

    /// Decide what follows a cue whose frames are exhausted. Returns false
    /// when nothing more can be written this tick.
    fn end_of_cue(&mut self, cue: &Cue) -> Result<bool> {
        match *cue {
            Cue::Play { .. } => {
                self.advance()?;
                Ok(true)
            }
            Cue::LoopUntilHeight {
                start_frame,
                until_height,
                ..
            } => {
                let height = self.sensor.height();
                if height + HEIGHT_TOLERANCE < until_height {
                    self.actuate(true)?;
                    self.warn_if_slow(until_height, height);
                    self.loops += 1;
                    self.cursor.seek(start_frame)?;
                    Ok(!cue.is_empty())
                } else {
                    let ahead = (height - until_height) * self.sensor.drips_per_height();
                    self.actuate(ahead <= self.config.actuator_dead_band)?;
                    tracing::debug!(until_height, height, ahead, "sublayer reached");
                    self.advance()?;
                    Ok(true)
                }
            }
        }
    }

    fn advance(&mut self) -> Result<()> {
        self.current += 1;
        self.enter_cue()
    }

    fn enter_cue(&mut self) -> Result<()> {
        self.loop_started = None;
        self.last_slow_warning = None;
        let Some(cue) = self.cues.get(self.current).copied() else {
            return Ok(());
        };
        if self.cursor.position() != cue.start_frame() {
            self.cursor.seek(cue.start_frame())?;
        }
        if let Cue::LoopUntilHeight {
            start_frame,
            end_frame,
            ..
        } = cue
        {
            self.cursor.cache_span(start_frame, end_frame)?;
            self.loop_started = Some(Instant::now());
        }
        tracing::debug!(index = self.current, %cue, "cue");
        Ok(())
    }

    fn actuate(&mut self, drip: bool) -> Result<()> {
        match self.actuator.as_mut() {
            Some(actuator) if drip => actuator.start(),
            Some(actuator) => actuator.stop(),
            None => Ok(()),
        }
    }

    fn warn_if_slow(&mut self, until_height: f64, height: f64) {
        let Some(started) = self.loop_started else {
            return;
        };
        let now = Instant::now();
        if now.duration_since(started) < self.config.slow_sublayer() {
            return;
        }
        if self
            .last_slow_warning
            .is_some_and(|at| now.duration_since(at) < SLOW_WARNING_INTERVAL)
        {
            return;
        }
        self.last_slow_warning = Some(now);
        tracing::warn!(
            "Sublayer to height {until_height} has taken {:.1} s; measured height is {height:.4} ({} drips)",
            now.duration_since(started).as_secs_f64(),
            self.sensor.num_drips()
        );
    }
}
