//! Hysteresis drip detector over a mono PCM microphone stream.
//!
//! A drip starts when a sample's magnitude reaches the threshold and ends only
//! after the signal has stayed below it for the full release window, so the
//! ringing at the edge of one drip is never counted twice.

use std::collections::VecDeque;

use super::DripSensor;

/// Inter-drip intervals kept for the rate estimate.
const RATE_WINDOW: usize = 10;
/// Intervals required before a rate is reported.
const RATE_MIN_INTERVALS: usize = 5;

/// Detector parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    pub sampling_rate: u32,
    /// Distance below `i16::MAX` at which a sample counts as a drip.
    pub threshold_margin: u16,
    pub release_ms: u32,
    pub drips_per_height: f64,
}

/// Rising-edge drip counter with release-time hysteresis.
#[derive(Debug, Clone)]
pub struct DripDetector {
    sampling_rate: u32,
    threshold: i32,
    release_samples: u64,
    drips_per_height: f64,
    in_drip: bool,
    hold: u64,
    num_drips: u64,
    elapsed_samples: u64,
    last_drip_sample: Option<u64>,
    intervals: VecDeque<u64>,
}

impl DripDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            sampling_rate: settings.sampling_rate,
            threshold: i16::MAX as i32 - settings.threshold_margin as i32,
            release_samples: settings.sampling_rate as u64 / 1000 * settings.release_ms as u64,
            drips_per_height: settings.drips_per_height,
            in_drip: false,
            hold: 0,
            num_drips: 0,
            elapsed_samples: 0,
            last_drip_sample: None,
            intervals: VecDeque::with_capacity(RATE_WINDOW),
        }
    }

    /// Samples the signal must stay below threshold before a drip ends.
    pub fn release_samples(&self) -> u64 {
        self.release_samples
    }

    pub fn in_drip(&self) -> bool {
        self.in_drip
    }

    /// Average drips per second over recent drips, once enough are known.
    pub fn drip_rate(&self) -> Option<f64> {
        if self.intervals.len() < RATE_MIN_INTERVALS {
            return None;
        }
        let mean = self.intervals.iter().sum::<u64>() as f64 / self.intervals.len() as f64;
        Some(self.sampling_rate as f64 / mean)
    }

    fn record_drip(&mut self) {
        self.num_drips += 1;
        if let Some(last) = self.last_drip_sample {
            if self.intervals.len() == RATE_WINDOW {
                self.intervals.pop_front();
            }
            self.intervals.push_back(self.elapsed_samples - last);
        }
        self.last_drip_sample = Some(self.elapsed_samples);
        tracing::debug!(
            num = self.num_drips,
            rate = ?self.drip_rate(),
            "drip detected"
        );
    }
}

impl DripSensor for DripDetector {
    fn add_samples(&mut self, samples: &[i16]) {
        for &sample in samples {
            self.elapsed_samples += 1;
            if (sample as i32).abs() >= self.threshold {
                if !self.in_drip {
                    self.in_drip = true;
                    self.record_drip();
                }
                self.hold = self.release_samples;
            } else if self.in_drip {
                self.hold = self.hold.saturating_sub(1);
                if self.hold == 0 {
                    self.in_drip = false;
                }
            }
        }
    }

    fn num_drips(&self) -> u64 {
        self.num_drips
    }

    fn drips_per_height(&self) -> f64 {
        self.drips_per_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const RATE: u32 = 48000;

    fn settings() -> DetectorSettings {
        DetectorSettings {
            sampling_rate: RATE,
            threshold_margin: 400,
            release_ms: 6,
            drips_per_height: 10.0,
        }
    }

    /// `count` pulses of `width` loud samples separated by `gap` quiet ones.
    fn pulses(count: usize, width: usize, gap: usize) -> Vec<i16> {
        let mut signal = vec![0i16; gap];
        for _ in 0..count {
            signal.extend(std::iter::repeat(i16::MAX).take(width));
            signal.extend(std::iter::repeat(0).take(gap));
        }
        signal
    }

    #[test]
    fn release_window_in_samples() {
        assert_eq!(DripDetector::new(settings()).release_samples(), 288);
    }

    #[test]
    fn no_drips_on_silence() {
        let mut d = DripDetector::new(settings());
        d.add_samples(&vec![0; 10_000]);
        assert_eq!(d.num_drips(), 0);
        assert_eq!(d.height(), 0.0);
    }

    #[test]
    fn separated_pulses_counted_individually() {
        let mut d = DripDetector::new(settings());
        d.add_samples(&pulses(14, 20, 400));
        assert_eq!(d.num_drips(), 14);
    }

    #[test]
    fn pulses_closer_than_release_are_one_drip() {
        let mut d = DripDetector::new(settings());
        d.add_samples(&pulses(6, 20, 100));
        assert_eq!(d.num_drips(), 1);
    }

    #[test]
    fn gap_of_exactly_release_ends_drip() {
        let mut d = DripDetector::new(settings());
        d.add_samples(&pulses(3, 5, 288));
        assert_eq!(d.num_drips(), 3);
    }

    #[test]
    fn negative_peaks_count() {
        let mut d = DripDetector::new(settings());
        let signal: Vec<i16> = pulses(2, 10, 500).iter().map(|&s| -s).collect();
        d.add_samples(&signal);
        assert_eq!(d.num_drips(), 2);
    }

    #[test]
    fn split_across_calls_is_consistent() {
        let signal = pulses(9, 30, 350);
        let mut whole = DripDetector::new(settings());
        whole.add_samples(&signal);

        let mut pieces = DripDetector::new(settings());
        for chunk in signal.chunks(37) {
            pieces.add_samples(chunk);
        }
        assert_eq!(whole.num_drips(), pieces.num_drips());
    }

    #[test]
    fn noise_below_threshold_ignored() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let threshold = i16::MAX - 400;
        let noise: Vec<i16> = (0..20_000)
            .map(|_| rng.gen_range(-threshold + 1..threshold))
            .collect();
        let mut d = DripDetector::new(settings());
        d.add_samples(&noise);
        assert_eq!(d.num_drips(), 0);
    }

    #[test]
    fn height_from_drips() {
        let mut d = DripDetector::new(settings());
        d.add_samples(&pulses(5, 10, 400));
        assert!((d.height() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rate_needs_five_intervals() {
        let mut d = DripDetector::new(settings());
        d.add_samples(&pulses(5, 10, 4790));
        assert!(d.drip_rate().is_none());
        d.add_samples(&pulses(1, 10, 4790));
        // One drip every 4800 samples at 48 kHz.
        let rate = d.drip_rate().unwrap();
        assert!((rate - 10.0).abs() < 0.01, "rate {rate}");
    }
}
