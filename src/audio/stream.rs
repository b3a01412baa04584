//! Non-blocking stream interfaces the player is written against.
//!
//! Both directions expose "how much is available" so a single cooperative
//! loop can service output and input without blocking on either. The cpal
//! implementations live in [`device`](super::device); tests use in-memory
//! fakes.

use crate::error::AudioError;

use super::Frame;

/// Write side of a stereo PCM output stream.
pub trait FrameSink {
    /// Frames that can be written right now without blocking.
    fn write_available(&self) -> usize;

    /// Write up to `frames.len()` frames, returning how many were accepted.
    fn write_frames(&mut self, frames: &[Frame]) -> usize;

    /// Let buffered frames play out, then stop the stream.
    fn close(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// Read side of a mono PCM capture stream.
pub trait SampleSource {
    /// Samples that can be read right now without blocking.
    fn read_available(&self) -> usize;

    /// Read up to `buf.len()` samples, returning how many were read.
    fn read_samples(&mut self, buf: &mut [i16]) -> usize;

    fn close(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}
