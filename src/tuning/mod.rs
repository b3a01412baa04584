//! Tuning model: per-height calibration coefficients and build-volume bounds.
//!
//! A [`TuningCollection`] holds calibration points sorted by height. Heights
//! between two points interpolate every coefficient linearly; heights outside
//! the calibrated range clamp to the nearest endpoint.

pub mod file;

use std::cell::Cell;

use serde::{Deserialize, Serialize};

use crate::audio::modulation::Modulator;
use crate::error::{Axis, ConfigError};

pub use file::{default_tuning_path, load_tuning, save_tuning, tuning_path};

/// Calibration coefficients valid at a single height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuningPoint {
    pub height: f64,
    pub x_offset: f64,
    pub y_offset: f64,
    pub x_scale: f64,
    pub y_scale: f64,
    /// Degrees, counter-clockwise positive.
    pub rotation: f64,
    pub x_shear: f64,
    pub y_shear: f64,
    pub x_trapezoid: f64,
    pub y_trapezoid: f64,
}

impl TuningPoint {
    /// Identity coefficients at the given height.
    pub fn identity(height: f64) -> Self {
        Self {
            height,
            x_offset: 0.0,
            y_offset: 0.0,
            x_scale: 1.0,
            y_scale: 1.0,
            rotation: 0.0,
            x_shear: 0.0,
            y_shear: 0.0,
            x_trapezoid: 0.0,
            y_trapezoid: 0.0,
        }
    }

    /// Component-wise `self * (1 - ratio) + other * ratio`.
    fn lerp(&self, other: &TuningPoint, ratio: f64) -> TuningPoint {
        let mix = |a: f64, b: f64| a * (1.0 - ratio) + b * ratio;
        TuningPoint {
            height: mix(self.height, other.height),
            x_offset: mix(self.x_offset, other.x_offset),
            y_offset: mix(self.y_offset, other.y_offset),
            x_scale: mix(self.x_scale, other.x_scale),
            y_scale: mix(self.y_scale, other.y_scale),
            rotation: mix(self.rotation, other.rotation),
            x_shear: mix(self.x_shear, other.x_shear),
            y_shear: mix(self.y_shear, other.y_shear),
            x_trapezoid: mix(self.x_trapezoid, other.x_trapezoid),
            y_trapezoid: mix(self.y_trapezoid, other.y_trapezoid),
        }
    }
}

/// How normalized positions are carried on the audio signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModulationScheme {
    /// Both channels amplitude-modulate a carrier; laser state picks the carrier.
    Amplitude,
    /// Near-direct position signal with a side-tone while the laser is on.
    DirectConnection,
}

/// All calibration data for one printer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuningCollection {
    pub build_x_min: f64,
    pub build_x_max: f64,
    pub build_y_min: f64,
    pub build_y_max: f64,
    pub dwell_x: f64,
    pub dwell_y: f64,
    /// mm/s
    pub velocity_x_max: f64,
    /// mm/s
    pub velocity_y_max: f64,
    pub drips_per_height: f64,
    pub sublayer_height: f64,
    pub modulation: ModulationScheme,
    tuning_parameters: Vec<TuningPoint>,
    /// Last queried height and its resolved coefficients.
    #[serde(skip)]
    cache: Cell<Option<TuningPoint>>,
}

impl TuningCollection {
    /// A collection with a single identity point at height 0 and a `[-1, 1]`
    /// build volume.
    pub fn new(modulation: ModulationScheme) -> Self {
        Self {
            build_x_min: -1.0,
            build_x_max: 1.0,
            build_y_min: -1.0,
            build_y_max: 1.0,
            dwell_x: 0.0,
            dwell_y: 0.0,
            velocity_x_max: 400.0,
            velocity_y_max: 400.0,
            drips_per_height: 100.0,
            sublayer_height: 0.01,
            modulation,
            tuning_parameters: vec![TuningPoint::identity(0.0)],
            cache: Cell::new(None),
        }
    }

    /// Calibration points, sorted by height.
    pub fn points(&self) -> &[TuningPoint] {
        &self.tuning_parameters
    }

    /// Add a calibration point. Heights must be unique.
    pub fn insert(&mut self, point: TuningPoint) -> Result<(), ConfigError> {
        if self.tuning_parameters.iter().any(|p| p.height == point.height) {
            return Err(ConfigError::DuplicateHeight(point.height));
        }
        let idx = self
            .tuning_parameters
            .partition_point(|p| p.height < point.height);
        self.tuning_parameters.insert(idx, point);
        self.cache.set(None);
        Ok(())
    }

    /// Remove every calibration point and install `points` instead.
    pub fn replace_points(&mut self, points: Vec<TuningPoint>) -> Result<(), ConfigError> {
        self.tuning_parameters.clear();
        self.cache.set(None);
        for point in points {
            self.insert(point)?;
        }
        Ok(())
    }

    /// Resolve the coefficients at `height`.
    ///
    /// An exact match returns that point unchanged. Below the lowest or above
    /// the highest point the nearest endpoint is returned with `height`
    /// rewritten. In between, every field is linearly interpolated.
    pub fn point_at(&self, height: f64) -> TuningPoint {
        if let Some(cached) = self.cache.get() {
            if cached.height == height {
                return cached;
            }
        }
        let resolved = self.resolve(height);
        self.cache.set(Some(resolved));
        resolved
    }

    fn resolve(&self, height: f64) -> TuningPoint {
        let points = &self.tuning_parameters;
        let (first, last) = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return TuningPoint::identity(height),
        };
        if height <= first.height {
            return TuningPoint { height, ..*first };
        }
        if height >= last.height {
            return TuningPoint { height, ..*last };
        }
        let upper = points.partition_point(|p| p.height < height);
        let higher = &points[upper];
        if higher.height == height {
            return *higher;
        }
        let lower = &points[upper - 1];
        let ratio = (height - lower.height) / (higher.height - lower.height);
        TuningPoint {
            height,
            ..lower.lerp(higher, ratio)
        }
    }

    /// Whether `(x, y)` lies inside the build volume.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        (self.build_x_min..=self.build_x_max).contains(&x)
            && (self.build_y_min..=self.build_y_max).contains(&y)
    }

    /// Build the configured modulator at `sampling_rate`.
    pub fn modulator(&self, sampling_rate: u32) -> Modulator {
        Modulator::new(self.modulation, sampling_rate)
    }

    /// Check the invariants a loaded collection must satisfy.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.tuning_parameters.is_empty() {
            return Err(ConfigError::NoTuningPoints);
        }
        let points = std::mem::take(&mut self.tuning_parameters);
        self.replace_points(points)?;

        if self.build_x_min >= self.build_x_max {
            return Err(ConfigError::BuildVolume {
                axis: Axis::X,
                min: self.build_x_min,
                max: self.build_x_max,
            });
        }
        if self.build_y_min >= self.build_y_max {
            return Err(ConfigError::BuildVolume {
                axis: Axis::Y,
                min: self.build_y_min,
                max: self.build_y_max,
            });
        }
        for (field, value) in [
            ("velocity_x_max", self.velocity_x_max),
            ("velocity_y_max", self.velocity_y_max),
            ("drips_per_height", self.drips_per_height),
            ("sublayer_height", self.sublayer_height),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { field, value });
            }
        }
        if !self.contains(self.dwell_x, self.dwell_y) {
            return Err(ConfigError::DwellOutsideVolume {
                x: self.dwell_x,
                y: self.dwell_y,
            });
        }
        Ok(())
    }
}

impl PartialEq for TuningCollection {
    fn eq(&self, other: &Self) -> bool {
        self.build_x_min == other.build_x_min
            && self.build_x_max == other.build_x_max
            && self.build_y_min == other.build_y_min
            && self.build_y_max == other.build_y_max
            && self.dwell_x == other.dwell_x
            && self.dwell_y == other.dwell_y
            && self.velocity_x_max == other.velocity_x_max
            && self.velocity_y_max == other.velocity_y_max
            && self.drips_per_height == other.drips_per_height
            && self.sublayer_height == other.sublayer_height
            && self.modulation == other.modulation
            && self.tuning_parameters == other.tuning_parameters
    }
}
