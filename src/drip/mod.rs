//! Drip sensing and drip-rate actuation.
//!
//! Build height is never measured directly: it is derived from the number of
//! resin drips heard by the microphone. [`DripSensor`] is the counting side,
//! [`DripActuator`] the valve that lets the player throttle the drip rate.

pub mod detector;
pub mod governor;
pub mod simulated;

pub use detector::{DetectorSettings, DripDetector};
pub use governor::{DripActuator, DripGovernor};
pub use simulated::SimulatedDripDetector;

/// A monotonic drip counter fed with mono PCM samples.
pub trait DripSensor {
    /// Consume captured samples, updating the drip count.
    fn add_samples(&mut self, samples: &[i16]);

    fn num_drips(&self) -> u64;

    fn drips_per_height(&self) -> f64;

    /// Height reached so far. Always derived from the count.
    fn height(&self) -> f64 {
        self.num_drips() as f64 / self.drips_per_height()
    }
}

impl<S: DripSensor + ?Sized> DripSensor for Box<S> {
    fn add_samples(&mut self, samples: &[i16]) {
        (**self).add_samples(samples)
    }

    fn num_drips(&self) -> u64 {
        (**self).num_drips()
    }

    fn drips_per_height(&self) -> f64 {
        (**self).drips_per_height()
    }
}
