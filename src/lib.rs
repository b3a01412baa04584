//! Peachy: an audio-driven stereolithography toolchain.
//!
//! The compiler turns G-code into a stereo WAV that steers two galvanometer
//! mirrors plus a cue file; the player streams that audio in real time and
//! uses drips heard on a microphone to decide when each sublayer is done.

pub mod audio;
pub mod cue;
pub mod drip;
pub mod error;
pub mod gcode;
pub mod logging;
pub mod player;
pub mod tuning;

pub use cue::Cue;
pub use error::{Error, Result};
pub use gcode::{compile_file, CompileSummary};
pub use player::{CuedPlayer, PlaybackSummary, PlayerConfig, Tick, WaveCursor};
pub use tuning::TuningCollection;
