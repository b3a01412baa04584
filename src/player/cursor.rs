//! Rewindable cursor over a compiled WAV file.
//!
//! The player jumps back to the start of a dwell loop many times a second.
//! Seeking the underlying reader discards its buffer and costs a syscall on
//! every loop, so short spans that will be revisited are decoded once into a
//! bounded cache keyed by their first frame, and reads inside a cached span
//! never touch the reader.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::audio::Frame;
use crate::error::{AudioError, Result};

/// Total frames kept across all cached spans.
pub const DEFAULT_CACHE_FRAMES: usize = 1 << 16;

pub struct WaveCursor<R: Read + Seek> {
    reader: WavReader<R>,
    sample_rate: u32,
    total_frames: u64,
    /// Next frame handed out by [`read_frames`](Self::read_frames).
    position: u64,
    /// Next frame the reader itself would decode.
    reader_position: u64,
    cache: BTreeMap<u64, Vec<Frame>>,
    cached_frames: usize,
    cache_limit: usize,
}

impl WaveCursor<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(WavReader::open(path)?)
    }
}

impl<R: Read + Seek> WaveCursor<R> {
    /// Wrap a reader. Only 16-bit integer stereo files are accepted.
    pub fn new(reader: WavReader<R>) -> Result<Self> {
        let spec = reader.spec();
        if spec.channels != 2 || spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int
        {
            return Err(AudioError::WaveFormat {
                channels: spec.channels,
                bits: spec.bits_per_sample,
            }
            .into());
        }
        let total_frames = reader.duration() as u64;
        Ok(Self {
            reader,
            sample_rate: spec.sample_rate,
            total_frames,
            position: 0,
            reader_position: 0,
            cache: BTreeMap::new(),
            cached_frames: 0,
            cache_limit: DEFAULT_CACHE_FRAMES,
        })
    }

    pub fn with_cache_limit(mut self, frames: usize) -> Self {
        self.cache_limit = frames;
        self
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_cached(&self, start_frame: u64) -> bool {
        self.cache.contains_key(&start_frame)
    }

    pub fn cached_frames(&self) -> usize {
        self.cached_frames
    }

    /// Move to `frame`. The reader is only repositioned when a later read
    /// falls outside the cache.
    pub fn seek(&mut self, frame: u64) -> Result<()> {
        if frame > self.total_frames {
            return Err(AudioError::SeekPastEnd(frame).into());
        }
        self.position = frame;
        Ok(())
    }

    /// Decode `[start, end)` into the cache so later visits are served from
    /// memory. Spans larger than the whole cache are left uncached. Oldest
    /// (lowest) spans are evicted to make room.
    pub fn cache_span(&mut self, start: u64, end: u64) -> Result<bool> {
        if end > self.total_frames {
            return Err(AudioError::SeekPastEnd(end).into());
        }
        let len = end.saturating_sub(start) as usize;
        if len == 0 || len > self.cache_limit {
            return Ok(false);
        }
        if self.cache.get(&start).is_some_and(|span| span.len() == len) {
            return Ok(true);
        }
        while self.cached_frames + len > self.cache_limit {
            match self.cache.pop_first() {
                Some((_, span)) => self.cached_frames -= span.len(),
                None => break,
            }
        }
        let mut span = Vec::with_capacity(len);
        self.read_from_reader(start, len, &mut span)?;
        self.cached_frames += span.len();
        if let Some(old) = self.cache.insert(start, span) {
            self.cached_frames -= old.len();
        }
        tracing::trace!(start, end, "cached span");
        Ok(true)
    }

    /// Append up to `max` frames from the current position to `out`.
    /// Returns the number appended; zero at the end of the file.
    pub fn read_frames(&mut self, out: &mut Vec<Frame>, max: usize) -> Result<usize> {
        let remaining = (self.total_frames - self.position).min(max as u64) as usize;
        if remaining == 0 {
            return Ok(0);
        }

        let cached = self
            .cache
            .range(..=self.position)
            .next_back()
            .and_then(|(&start, span)| {
                let offset = (self.position - start) as usize;
                (offset < span.len()).then(|| &span[offset..])
            });
        let n = match cached {
            Some(frames) => {
                let n = frames.len().min(remaining);
                out.extend_from_slice(&frames[..n]);
                n
            }
            None => {
                let from = self.position;
                self.read_from_reader(from, remaining, out)?
            }
        };
        self.position += n as u64;
        Ok(n)
    }

    fn read_from_reader(&mut self, from: u64, count: usize, out: &mut Vec<Frame>) -> Result<usize> {
        if self.reader_position != from {
            self.reader.seek(from as u32)?;
            self.reader_position = from;
        }
        let mut samples = self.reader.samples::<i16>();
        let mut n = 0;
        while n < count {
            let (Some(left), Some(right)) = (samples.next(), samples.next()) else {
                break;
            };
            out.push(Frame::new(left?, right?));
            n += 1;
        }
        self.reader_position += n as u64;
        Ok(n)
    }
}
