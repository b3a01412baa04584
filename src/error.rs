//! Error taxonomy shared by the compiler and the player.
//!
//! Every variant here is fatal. Recoverable conditions (unsupported G-code,
//! clamped feed rates, a player falling behind its height target) are
//! reported through `tracing::warn!` and never surface as errors.

use std::fmt;

use thiserror::Error;

/// Malformed tuning or cue files, and invalid session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed YAML document: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("tuning file contains no tuning parameters")]
    NoTuningPoints,
    #[error("duplicate tuning height {0}")]
    DuplicateHeight(f64),
    #[error("invalid build volume on {axis} axis: min {min} must be below max {max}")]
    BuildVolume { axis: Axis, min: f64, max: f64 },
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
    #[error("dwell position ({x}, {y}) lies outside the build volume")]
    DwellOutsideVolume { x: f64, y: f64 },
    #[error("not a cue file: expected \"CUE_FILE\", got {0:?}")]
    NotCueFile(String),
    #[error("cue file version {found} is not supported (expected {expected})")]
    CueVersion { found: u32, expected: u32 },
    #[error("unexpected end of cue file while looking for {0}")]
    CueTruncated(&'static str),
}

/// Moves or signals that would damage the print or produce unusable output.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("requested {axis} position {value} outside build volume [{min}, {max}]")]
    OutOfBounds {
        axis: Axis,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("cannot move down from Z {from} to Z {to}")]
    DownwardZ { from: f64, to: f64 },
    #[error("{channel} amplitude {amplitude} outside modulation band [{min}, {max}]")]
    AmplitudeOutOfBand {
        channel: Channel,
        amplitude: f64,
        min: f64,
        max: f64,
    },
    #[error(
        "layer replay reached a Z move on line {found} but the layer was opened by line {expected}; \
         layers must end in exactly one Z move"
    )]
    MultipleZMoves { expected: usize, found: usize },
    #[error("move of {distance} mm at {feed} mm/s needs {samples} samples; at most {max} are allowed")]
    MoveTooLong {
        distance: f64,
        feed: f64,
        samples: f64,
        max: u64,
    },
}

/// A G-code instruction or cue record that does not match its grammar.
#[derive(Debug, Error)]
#[error("line {line}: {message}: {text:?}")]
pub struct ParseError {
    pub line: usize,
    pub text: String,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, text: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            line,
            text: text.into(),
            message: message.into(),
        }
    }
}

/// PCM conversion of a value that was not clipped beforehand.
#[derive(Debug, Error)]
#[error("{channel} value {value} outside [-1.0, 1.0]; clip before encoding")]
pub struct CodecError {
    pub channel: Channel,
    pub value: f64,
}

/// Failures of the live audio devices.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device found")]
    NoOutputDevice,
    #[error("no audio input device found")]
    NoInputDevice,
    #[error("stream build error: {0}")]
    StreamBuild(String),
    #[error("stream play error: {0}")]
    StreamPlay(String),
    #[error("wave file must be 16-bit stereo PCM, got {channels} channel(s) at {bits} bits")]
    WaveFormat { channels: u16, bits: u16 },
    #[error("seek to frame {0} is past the end of the wave file")]
    SeekPastEnd(u64),
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error("while processing line {line} ({text:?}): {source}")]
    Instruction {
        line: usize,
        text: String,
        #[source]
        source: Box<Error>,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl Error {
    /// Strip any `Instruction` wrappers and return the underlying error.
    pub fn root(&self) -> &Error {
        match self {
            Error::Instruction { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Build-volume axis named in an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
            Axis::Z => write!(f, "z"),
        }
    }
}

/// Stereo channel named in an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Left,
    Right,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Left => write!(f, "left"),
            Channel::Right => write!(f, "right"),
        }
    }
}
