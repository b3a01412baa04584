//! Exposure test pattern.
//!
//! Prints a solid base at one speed, then one square outline per layer with
//! the drawing speed stepped up each layer. Reading where the walls stop
//! curing gives the fastest usable feed rate for a resin.

use crate::error::ConfigError;

/// Parameters of the exposure test pattern. Speeds are G-code feed rates
/// (mm/min).
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureTest {
    /// Half the side of the square.
    pub size: f64,
    pub start_speed: f64,
    /// First speed that is no longer printed.
    pub max_speed: f64,
    pub speed_increment: f64,
    pub layers_per_unit: u32,
    /// Height of the base, in build units.
    pub base_height: f64,
    pub base_speed: f64,
}

impl Default for ExposureTest {
    fn default() -> Self {
        Self {
            size: 5.0,
            start_speed: 100.0,
            max_speed: 1000.0,
            speed_increment: 50.0,
            layers_per_unit: 100,
            base_height: 3.0,
            base_speed: 400.0,
        }
    }
}

impl ExposureTest {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("size", self.size),
            ("start_speed", self.start_speed),
            ("speed_increment", self.speed_increment),
            ("base_speed", self.base_speed),
            ("layers_per_unit", self.layers_per_unit as f64),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        if !(self.base_height.is_finite() && self.base_height >= 0.0) {
            return Err(ConfigError::NotPositive {
                field: "base_height",
                value: self.base_height,
            });
        }
        if !self.max_speed.is_finite() {
            return Err(ConfigError::NotPositive {
                field: "max_speed",
                value: self.max_speed,
            });
        }
        Ok(())
    }

    /// Number of base layers.
    pub fn base_layers(&self) -> u64 {
        (self.base_height * self.layers_per_unit as f64).ceil() as u64
    }

    /// Speeds of the test layers above the base, slowest first.
    pub fn speeds(&self) -> Vec<f64> {
        let mut speeds = Vec::new();
        if self.speed_increment <= 0.0 || self.speed_increment.is_nan() {
            return speeds;
        }
        let mut step = 0u32;
        loop {
            let speed = self.start_speed + step as f64 * self.speed_increment;
            if speed >= self.max_speed {
                return speeds;
            }
            speeds.push(speed);
            step += 1;
        }
    }

    /// Render the pattern as G-code.
    pub fn generate(&self) -> Result<String, ConfigError> {
        self.validate()?;
        let base = self.base_layers();
        let layers = (0..base)
            .map(|_| self.base_speed)
            .chain(self.speeds());

        let mut out = String::new();
        for (index, speed) in layers.enumerate() {
            let z = index as f64 / self.layers_per_unit as f64;
            self.push_layer(&mut out, z, speed);
        }
        tracing::debug!(
            base_layers = base,
            test_layers = self.speeds().len(),
            "exposure test generated"
        );
        Ok(out)
    }

    fn push_layer(&self, out: &mut String, z: f64, speed: f64) {
        let s = self.size;
        out.push_str("M103\n");
        out.push_str(&format!("G1 Z{z:.4} F{speed:.2}\n"));
        out.push_str("M101\n");
        for (x, y) in [(s, s), (s, -s), (-s, -s), (-s, s)] {
            out.push_str(&format!("G1 X{x:.2} Y{y:.2} F{speed:.2} E1\n"));
        }
    }
}
