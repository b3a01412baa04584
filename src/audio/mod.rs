//! Audio signal path: positions to normalized values to modulated PCM, plus
//! the live streams the player drives.
//!
//! Compile-time path: [`transform`] → [`codec::clip`] → [`modulation`] →
//! [`codec::encode`]. Run-time path: [`device`] streams behind the
//! [`stream`] traits, fed through lock-free ring buffers by [`callback`].

pub mod callback;
pub mod codec;
pub mod device;
pub mod modulation;
pub mod stream;
pub mod transform;

pub use device::{AudioInput, AudioOutput};
pub use modulation::Modulator;
pub use stream::{FrameSink, SampleSource};
pub use transform::{Point3, PositionTransformer};

/// A normalized stereo pair, nominally in `[-1, 1]` per channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub left: f64,
    pub right: f64,
}

impl Sample {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }
}

/// A signed 16-bit PCM stereo frame, the unit stored in the WAV container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Frame {
    pub left: i16,
    pub right: i16,
}

impl Frame {
    pub fn new(left: i16, right: i16) -> Self {
        Self { left, right }
    }
}
