//! Modulators that carry normalized positions and laser state on the audio signal.
//!
//! Both schemes cache one period of their waveform. The cache is rebuilt, and
//! the cycle position reset to zero, whenever the sampling rate or the laser
//! state changes, so callers must only toggle at boundaries where a phase
//! reset is acceptable.

use std::f64::consts::PI;

use crate::error::{Channel, GeometryError};
use crate::tuning::ModulationScheme;

use super::Sample;

/// Lowest amplitude a position may map to before carrier multiplication.
pub const MIN_AMPLITUDE: f64 = 0.25;
/// Highest amplitude a position may map to before carrier multiplication.
pub const MAX_AMPLITUDE: f64 = 1.0;

/// Carrier divisor while the laser is on (carrier = rate / 4).
const LASER_ON_DIVISOR: u32 = 4;
/// Carrier divisor while the laser is off (carrier = rate / 8).
const LASER_OFF_DIVISOR: u32 = 8;

/// Direct-connection position gain.
pub const AUDIO_SCALE: f64 = 0.75;
/// Direct-connection side-tone amplitude.
pub const TONE_AMPLITUDE: f64 = 0.25;
/// Side-tone divisor (tone = rate / 8).
const TONE_DIVISOR: u32 = 8;

/// One cosine cycle sampled `period` times.
fn cosine_cycle(period: usize) -> Vec<f64> {
    (0..period)
        .map(|k| (2.0 * PI * k as f64 / period as f64).cos())
        .collect()
}

/// Period in samples of a tone at `rate / divisor`.
fn period_for(sampling_rate: u32, divisor: u32) -> usize {
    let carrier = sampling_rate as f64 / divisor as f64;
    ((sampling_rate as f64 / carrier).round() as usize).max(1)
}

/// Amplitude modulation on a carrier whose frequency encodes laser state.
#[derive(Debug, Clone)]
pub struct AmplitudeModulator {
    sampling_rate: u32,
    laser_enabled: bool,
    waveform: Vec<f64>,
    cycle: usize,
}

impl AmplitudeModulator {
    pub fn new(sampling_rate: u32) -> Self {
        let mut m = Self {
            sampling_rate,
            laser_enabled: false,
            waveform: Vec::new(),
            cycle: 0,
        };
        m.regenerate();
        m
    }

    fn regenerate(&mut self) {
        let divisor = if self.laser_enabled {
            LASER_ON_DIVISOR
        } else {
            LASER_OFF_DIVISOR
        };
        self.waveform = cosine_cycle(period_for(self.sampling_rate, divisor));
        self.cycle = 0;
    }

    /// Map a normalized value onto the amplitude band, failing outside it.
    fn amplitude(value: f64, channel: Channel) -> Result<f64, GeometryError> {
        let amplitude = MIN_AMPLITUDE + (value + 1.0) / 2.0 * (MAX_AMPLITUDE - MIN_AMPLITUDE);
        if !(MIN_AMPLITUDE..=MAX_AMPLITUDE).contains(&amplitude) {
            return Err(GeometryError::AmplitudeOutOfBand {
                channel,
                amplitude,
                min: MIN_AMPLITUDE,
                max: MAX_AMPLITUDE,
            });
        }
        Ok(amplitude)
    }

    pub fn modulate_values(&mut self, samples: &[Sample]) -> Result<Vec<Sample>, GeometryError> {
        let mut out = Vec::with_capacity(samples.len());
        for s in samples {
            let left = Self::amplitude(s.left, Channel::Left)?;
            let right = Self::amplitude(s.right, Channel::Right)?;
            let carrier = self.waveform[self.cycle];
            out.push(Sample::new(left * carrier, right * carrier));
            self.cycle = (self.cycle + 1) % self.waveform.len();
        }
        Ok(out)
    }
}

/// Direct connection: scaled pass-through plus a side-tone while lasing.
#[derive(Debug, Clone)]
pub struct DirectConnectionModulator {
    sampling_rate: u32,
    laser_enabled: bool,
    tone: Vec<f64>,
    cycle: usize,
}

impl DirectConnectionModulator {
    pub fn new(sampling_rate: u32) -> Self {
        let mut m = Self {
            sampling_rate,
            laser_enabled: false,
            tone: Vec::new(),
            cycle: 0,
        };
        m.regenerate();
        m
    }

    fn regenerate(&mut self) {
        self.tone = cosine_cycle(period_for(self.sampling_rate, TONE_DIVISOR))
            .into_iter()
            .map(|v| v * TONE_AMPLITUDE)
            .collect();
        self.cycle = 0;
    }

    pub fn modulate_values(&mut self, samples: &[Sample]) -> Vec<Sample> {
        samples
            .iter()
            .map(|s| {
                let tone = if self.laser_enabled {
                    self.tone[self.cycle]
                } else {
                    0.0
                };
                self.cycle = (self.cycle + 1) % self.tone.len();
                Sample::new(s.left * AUDIO_SCALE + tone, s.right * AUDIO_SCALE + tone)
            })
            .collect()
    }
}

/// The two modulation schemes behind one contract.
#[derive(Debug, Clone)]
pub enum Modulator {
    Amplitude(AmplitudeModulator),
    DirectConnection(DirectConnectionModulator),
}

impl Modulator {
    pub fn new(scheme: ModulationScheme, sampling_rate: u32) -> Self {
        match scheme {
            ModulationScheme::Amplitude => {
                Modulator::Amplitude(AmplitudeModulator::new(sampling_rate))
            }
            ModulationScheme::DirectConnection => {
                Modulator::DirectConnection(DirectConnectionModulator::new(sampling_rate))
            }
        }
    }

    pub fn sampling_rate(&self) -> u32 {
        match self {
            Modulator::Amplitude(m) => m.sampling_rate,
            Modulator::DirectConnection(m) => m.sampling_rate,
        }
    }

    /// Change the sampling rate, rebuilding the cached waveform.
    pub fn set_sampling_rate(&mut self, rate: u32) {
        match self {
            Modulator::Amplitude(m) => {
                m.sampling_rate = rate;
                m.regenerate();
            }
            Modulator::DirectConnection(m) => {
                m.sampling_rate = rate;
                m.regenerate();
            }
        }
    }

    pub fn laser_enabled(&self) -> bool {
        match self {
            Modulator::Amplitude(m) => m.laser_enabled,
            Modulator::DirectConnection(m) => m.laser_enabled,
        }
    }

    /// Switch the laser. A no-op when the state is unchanged; otherwise the
    /// waveform is rebuilt and its phase restarts.
    pub fn set_laser_enabled(&mut self, enabled: bool) {
        if self.laser_enabled() == enabled {
            return;
        }
        match self {
            Modulator::Amplitude(m) => {
                m.laser_enabled = enabled;
                m.regenerate();
            }
            Modulator::DirectConnection(m) => {
                m.laser_enabled = enabled;
                m.regenerate();
            }
        }
    }

    /// Samples in one full cycle of the current waveform.
    pub fn waveform_period(&self) -> usize {
        match self {
            Modulator::Amplitude(m) => m.waveform.len(),
            Modulator::DirectConnection(m) => m.tone.len(),
        }
    }

    pub fn modulate_values(&mut self, samples: &[Sample]) -> Result<Vec<Sample>, GeometryError> {
        match self {
            Modulator::Amplitude(m) => m.modulate_values(samples),
            Modulator::DirectConnection(m) => Ok(m.modulate_values(samples)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const RATE: u32 = 44100;

    fn constant(n: usize, left: f64, right: f64) -> Vec<Sample> {
        vec![Sample::new(left, right); n]
    }

    fn assert_tiles(mut m: Modulator, laser: bool) {
        m.set_laser_enabled(laser);
        let period = m.waveform_period();
        let input = constant(period, 0.3, -0.6);
        let first = m.modulate_values(&input).unwrap();
        let second = m.modulate_values(&input).unwrap();
        assert_eq!(first, second, "waveform must tile every {period} samples");
    }

    #[test]
    fn amplitude_waveform_tiles_laser_on_and_off() {
        assert_tiles(Modulator::new(ModulationScheme::Amplitude, RATE), true);
        assert_tiles(Modulator::new(ModulationScheme::Amplitude, RATE), false);
    }

    #[test]
    fn direct_waveform_tiles_laser_on_and_off() {
        assert_tiles(Modulator::new(ModulationScheme::DirectConnection, RATE), true);
        assert_tiles(Modulator::new(ModulationScheme::DirectConnection, RATE), false);
    }

    #[test]
    fn laser_on_carrier_is_higher_frequency() {
        let mut m = Modulator::new(ModulationScheme::Amplitude, RATE);
        let off_period = m.waveform_period();
        m.set_laser_enabled(true);
        let on_period = m.waveform_period();
        assert!(on_period < off_period);
        assert_eq!(on_period, 4);
        assert_eq!(off_period, 8);
    }

    #[test]
    fn amplitude_rejects_below_band() {
        for (l, r) in [(-1.01, 0.0), (0.0, -1.01)] {
            let mut m = AmplitudeModulator::new(RATE);
            let err = m.modulate_values(&constant(3, l, r)).unwrap_err();
            assert!(matches!(err, GeometryError::AmplitudeOutOfBand { amplitude, .. } if amplitude < MIN_AMPLITUDE));
        }
    }

    #[test]
    fn amplitude_rejects_above_band() {
        for (l, r) in [(1.01, 0.0), (0.0, 1.01)] {
            let mut m = AmplitudeModulator::new(RATE);
            let err = m.modulate_values(&constant(3, l, r)).unwrap_err();
            assert!(matches!(err, GeometryError::AmplitudeOutOfBand { amplitude, .. } if amplitude > MAX_AMPLITUDE));
        }
    }

    #[test]
    fn amplitude_band_edges_accepted() {
        let mut m = AmplitudeModulator::new(RATE);
        let out = m.modulate_values(&[Sample::new(-1.0, 1.0)]).unwrap();
        // First carrier value is cos(0) = 1.
        assert_approx_eq!(out[0].left, MIN_AMPLITUDE);
        assert_approx_eq!(out[0].right, MAX_AMPLITUDE);
    }

    #[test]
    fn direct_scales_without_tone_when_laser_off() {
        let mut m = Modulator::new(ModulationScheme::DirectConnection, RATE);
        let out = m.modulate_values(&constant(16, 0.4, -1.0)).unwrap();
        for s in out {
            assert_approx_eq!(s.left, 0.3);
            assert_approx_eq!(s.right, -0.75);
        }
    }

    #[test]
    fn direct_adds_tone_when_laser_on() {
        let mut m = Modulator::new(ModulationScheme::DirectConnection, RATE);
        m.set_laser_enabled(true);
        let out = m.modulate_values(&constant(8, 0.0, 0.0)).unwrap();
        assert_approx_eq!(out[0].left, TONE_AMPLITUDE);
        assert_approx_eq!(out[4].left, -TONE_AMPLITUDE);
        for s in &out {
            assert!(s.left.abs() <= TONE_AMPLITUDE + 1e-12);
        }
    }

    #[test]
    fn toggle_resets_phase_but_same_state_does_not() {
        let mut m = Modulator::new(ModulationScheme::Amplitude, RATE);
        m.modulate_values(&constant(3, 0.0, 0.0)).unwrap();
        m.set_laser_enabled(false); // unchanged
        let continued = m.modulate_values(&constant(1, 1.0, 1.0)).unwrap();
        // cycle 3 of an 8-sample cosine
        assert_approx_eq!(continued[0].left, (2.0 * PI * 3.0 / 8.0).cos());

        m.set_laser_enabled(true);
        let restarted = m.modulate_values(&constant(1, 1.0, 1.0)).unwrap();
        assert_approx_eq!(restarted[0].left, 1.0);
    }

    #[test]
    fn sampling_rate_change_rebuilds() {
        let mut m = Modulator::new(ModulationScheme::Amplitude, RATE);
        m.set_sampling_rate(48000);
        assert_eq!(m.sampling_rate(), 48000);
        assert_eq!(m.waveform_period(), 8);
    }
}
