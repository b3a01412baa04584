//! cpal-backed streams: the live output to the galvos and the drip microphone.
//!
//! Each stream owns its cpal handle and one end of a lock-free ring buffer;
//! the other end lives in the audio callback. The player thread only ever
//! touches the ring buffer, so no locks are shared with the audio threads.

use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::error::AudioError;

use super::callback::{InputCallback, OutputCallback};
use super::stream::{FrameSink, SampleSource};
use super::Frame;

/// How long [`FrameSink::close`] waits for queued frames to play out.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Stereo PCM output on the default device.
pub struct AudioOutput {
    stream: cpal::Stream,
    producer: HeapProd<i16>,
    sample_rate: u32,
    scratch: Vec<i16>,
}

impl AudioOutput {
    /// Open the default output device at `sample_rate` with room for
    /// `buffer_frames` queued frames.
    pub fn open(sample_rate: u32, buffer_frames: usize) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;

        let rb = HeapRb::<i16>::new(buffer_frames.max(1) * 2);
        let (producer, consumer) = rb.split();
        let mut callback = OutputCallback::new(consumer, 2);

        let config = cpal::StreamConfig {
            channels: 2,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback.process(data);
                },
                |err: cpal::StreamError| tracing::error!("audio output stream error: {err}"),
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;

        tracing::info!(sample_rate, buffer_frames, "audio output started");

        Ok(Self {
            stream,
            producer,
            sample_rate,
            scratch: Vec::new(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl FrameSink for AudioOutput {
    fn write_available(&self) -> usize {
        self.producer.vacant_len() / 2
    }

    fn write_frames(&mut self, frames: &[Frame]) -> usize {
        let n = frames.len().min(self.write_available());
        self.scratch.clear();
        self.scratch
            .extend(frames[..n].iter().flat_map(|f| [f.left, f.right]));
        self.producer.push_slice(&self.scratch) / 2
    }

    fn close(&mut self) -> Result<(), AudioError> {
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while !self.producer.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))
    }
}

/// Mono PCM capture on the default input device.
pub struct AudioInput {
    stream: cpal::Stream,
    consumer: HeapCons<i16>,
    sample_rate: u32,
}

impl AudioInput {
    /// Open the default input device at `sample_rate`, buffering up to
    /// `buffer_samples` unread samples.
    pub fn open(sample_rate: u32, buffer_samples: usize) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::NoInputDevice)?;

        let rb = HeapRb::<i16>::new(buffer_samples.max(1));
        let (producer, consumer) = rb.split();
        let mut callback = InputCallback::new(producer, 1);

        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    callback.process(data);
                },
                |err: cpal::StreamError| tracing::error!("audio input stream error: {err}"),
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))?;

        tracing::info!(sample_rate, "audio input started");

        Ok(Self {
            stream,
            consumer,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl SampleSource for AudioInput {
    fn read_available(&self) -> usize {
        self.consumer.occupied_len()
    }

    fn read_samples(&mut self, buf: &mut [i16]) -> usize {
        self.consumer.pop_slice(buf)
    }

    fn close(&mut self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamPlay(e.to_string()))
    }
}
