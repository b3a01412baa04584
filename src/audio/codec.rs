//! Sample codec: normalized stereo values to and from signed 16-bit PCM.

use crate::error::{Channel, CodecError};

use super::{Frame, Sample};

/// Largest signed 16-bit magnitude used for scaling.
pub const MAX_S16: f64 = i16::MAX as f64;

fn encode_channel(value: f64, channel: Channel) -> Result<i16, CodecError> {
    if !(-1.0..=1.0).contains(&value) {
        return Err(CodecError { channel, value });
    }
    Ok((value * MAX_S16).round() as i16)
}

/// Encode values into PCM frames, rounding to the nearest integer.
///
/// Fails on any value outside `[-1, 1]`; run [`clip`] first.
pub fn encode(samples: &[Sample]) -> Result<Vec<Frame>, CodecError> {
    samples
        .iter()
        .map(|s| {
            Ok(Frame::new(
                encode_channel(s.left, Channel::Left)?,
                encode_channel(s.right, Channel::Right)?,
            ))
        })
        .collect()
}

/// Decode PCM frames back into normalized values.
pub fn decode(frames: &[Frame]) -> Vec<Sample> {
    frames
        .iter()
        .map(|f| Sample::new(f.left as f64 / MAX_S16, f.right as f64 / MAX_S16))
        .collect()
}

/// Clamp each channel independently to `[-1, 1]`.
pub fn clip(samples: &[Sample]) -> Vec<Sample> {
    samples
        .iter()
        .map(|s| Sample::new(s.left.clamp(-1.0, 1.0), s.right.clamp(-1.0, 1.0)))
        .collect()
}
