//! Virtual drip source for demos and tests.
//!
//! Ignores sample values entirely; only the number of samples matters. The
//! count is derived from the total elapsed samples rather than summed per
//! call, so fractional rates never drift however the input is chunked.

use super::DripSensor;

#[derive(Debug, Clone)]
pub struct SimulatedDripDetector {
    sampling_rate: u32,
    drips_per_second: f64,
    drips_per_height: f64,
    elapsed_samples: u64,
    num_drips: u64,
}

impl SimulatedDripDetector {
    pub fn new(sampling_rate: u32, drips_per_second: f64, drips_per_height: f64) -> Self {
        Self {
            sampling_rate: sampling_rate.max(1),
            drips_per_second: drips_per_second.max(0.0),
            drips_per_height,
            elapsed_samples: 0,
            num_drips: 0,
        }
    }

    /// Fraction of the next drip already accumulated, in `[0, 1)`.
    pub fn remainder(&self) -> f64 {
        let exact = self.exact_drips();
        exact - exact.floor()
    }

    fn exact_drips(&self) -> f64 {
        self.elapsed_samples as f64 * self.drips_per_second / self.sampling_rate as f64
    }
}

impl DripSensor for SimulatedDripDetector {
    fn add_samples(&mut self, samples: &[i16]) {
        self.elapsed_samples += samples.len() as u64;
        let total = self.exact_drips().floor() as u64;
        if total > self.num_drips {
            tracing::trace!(from = self.num_drips, to = total, "virtual drips");
            self.num_drips = total;
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

    #[test]
    fn whole_rate() {
        let mut d = SimulatedDripDetector::new(1000, 5.0, 10.0);
        d.add_samples(&[0; 1000]);
        assert_eq!(d.num_drips(), 5);
        assert!((d.height() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fractional_rate_has_no_drift() {
        let mut d = SimulatedDripDetector::new(48000, 1.0 / 3.0, 1.0);
        for _ in 0..(48000 * 30 / 7) {
            d.add_samples(&[0; 7]);
        }
        // Just short of 30 seconds at a third of a drip per second.
        assert_eq!(d.num_drips(), 9);
        d.add_samples(&[0; 48000]);
        assert_eq!(d.num_drips(), 10);
    }

    #[test]
    fn chunking_does_not_matter() {
        let mut a = SimulatedDripDetector::new(44100, 2.5, 1.0);
        let mut b = SimulatedDripDetector::new(44100, 2.5, 1.0);
        a.add_samples(&vec![0; 441_000]);
        for _ in 0..1000 {
            b.add_samples(&[0; 441]);
        }
        assert_eq!(a.num_drips(), b.num_drips());
        assert_eq!(a.num_drips(), 25);
    }

    #[test]
    fn remainder_tracks_partial_drip() {
        let mut d = SimulatedDripDetector::new(100, 1.0, 1.0);
        d.add_samples(&[0; 150]);
        assert_eq!(d.num_drips(), 1);
        assert!((d.remainder() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_rate_never_drips() {
        let mut d = SimulatedDripDetector::new(100, 0.0, 1.0);
        d.add_samples(&[i16::MAX; 10_000]);
        assert_eq!(d.num_drips(), 0);
    }
}
