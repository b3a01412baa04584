//! Audio callbacks that run on the cpal audio threads.
//!
//! The output callback drains interleaved PCM from a lock-free ring buffer;
//! on underrun it repeats the last frame so the galvos hold position instead
//! of snapping to center. The input callback pushes mono PCM into a second
//! ring buffer, dropping samples when the reader falls behind.

use cpal::Sample as _;
use ringbuf::traits::{Consumer, Producer};
use ringbuf::{HeapCons, HeapProd};

/// Output-side state. Accessed only from the cpal output callback.
pub struct OutputCallback {
    consumer: HeapCons<i16>,
    channels: usize,
    scratch: Vec<i16>,
    hold: [f32; 2],
}

impl OutputCallback {
    pub fn new(consumer: HeapCons<i16>, channels: u16) -> Self {
        Self {
            consumer,
            channels: channels.max(1) as usize,
            scratch: Vec::new(),
            hold: [0.0; 2],
        }
    }

    /// Fill `output` (interleaved device channels) from the ring buffer.
    pub fn process(&mut self, output: &mut [f32]) {
        let frames = output.len() / self.channels;
        let wanted = frames * 2;
        if self.scratch.len() < wanted {
            self.scratch.resize(wanted, 0);
        }

        let got = self.consumer.pop_slice(&mut self.scratch[..wanted]) / 2;

        for (frame_idx, out_frame) in output.chunks_mut(self.channels).enumerate() {
            if frame_idx < got {
                self.hold = [
                    self.scratch[frame_idx * 2].to_sample::<f32>(),
                    self.scratch[frame_idx * 2 + 1].to_sample::<f32>(),
                ];
            }
            for (ch, sample) in out_frame.iter_mut().enumerate() {
                *sample = if ch < 2 { self.hold[ch] } else { 0.0 };
            }
        }
    }
}

/// Input-side state. Accessed only from the cpal input callback.
pub struct InputCallback {
    producer: HeapProd<i16>,
    channels: usize,
    scratch: Vec<i16>,
}

impl InputCallback {
    pub fn new(producer: HeapProd<i16>, channels: u16) -> Self {
        Self {
            producer,
            channels: channels.max(1) as usize,
            scratch: Vec::new(),
        }
    }

    /// Push the first channel of each captured frame.
    pub fn process(&mut self, input: &[f32]) {
        self.scratch.clear();
        self.scratch.extend(
            input
                .chunks(self.channels)
                .map(|frame| frame[0].to_sample::<i16>()),
        );
        self.producer.push_slice(&self.scratch);
    }
}
