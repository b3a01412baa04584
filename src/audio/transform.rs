//! Position-to-audio transformer.
//!
//! Maps build-volume coordinates to normalized stereo values:
//! normalize → offset → scale → rotate → shear → trapezoid.

use crate::tuning::{TuningCollection, TuningPoint};

use super::Sample;

/// A position in build-volume units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Coefficients resolved once per run of points sharing a height.
struct Coefficients {
    x_offset: f64,
    y_offset: f64,
    x_scale: f64,
    y_scale: f64,
    cos: f64,
    sin: f64,
    x_shear: f64,
    y_shear: f64,
    x_trapezoid: f64,
    y_trapezoid: f64,
}

impl From<TuningPoint> for Coefficients {
    fn from(tp: TuningPoint) -> Self {
        let radians = tp.rotation.to_radians();
        Self {
            x_offset: tp.x_offset,
            y_offset: tp.y_offset,
            x_scale: tp.x_scale,
            y_scale: tp.y_scale,
            cos: radians.cos(),
            sin: radians.sin(),
            x_shear: tp.x_shear,
            y_shear: tp.y_shear,
            x_trapezoid: tp.x_trapezoid,
            y_trapezoid: tp.y_trapezoid,
        }
    }
}

/// Converts positions to stereo values using a borrowed tuning collection.
pub struct PositionTransformer<'a> {
    tuning: &'a TuningCollection,
}

impl<'a> PositionTransformer<'a> {
    pub fn new(tuning: &'a TuningCollection) -> Self {
        Self { tuning }
    }

    /// Transform a batch of points.
    ///
    /// Points are processed in runs of equal `z`; tuning is resolved once per
    /// run. The result is identical to calling [`transform_point`](Self::transform_point)
    /// on each point.
    pub fn transform(&self, points: &[Point3]) -> Vec<Sample> {
        let mut out = Vec::with_capacity(points.len());
        let mut start = 0;
        while start < points.len() {
            let z = points[start].z;
            let run_len = points[start..]
                .iter()
                .take_while(|p| p.z == z)
                .count();
            let coeffs = Coefficients::from(self.tuning.point_at(z));
            out.extend(
                points[start..start + run_len]
                    .iter()
                    .map(|p| self.apply(&coeffs, p)),
            );
            start += run_len;
        }
        out
    }

    /// Transform a single point.
    pub fn transform_point(&self, point: Point3) -> Sample {
        let coeffs = Coefficients::from(self.tuning.point_at(point.z));
        self.apply(&coeffs, &point)
    }

    fn apply(&self, c: &Coefficients, point: &Point3) -> Sample {
        let tc = self.tuning;
        let left = normalize(point.x, tc.build_x_min, tc.build_x_max);
        let right = normalize(point.y, tc.build_y_min, tc.build_y_max);

        let left = (left + c.x_offset) * c.x_scale;
        let right = (right + c.y_offset) * c.y_scale;

        let (left, right) = (left * c.cos - right * c.sin, left * c.sin + right * c.cos);

        // Shear and trapezoid each use the pair from before the step.
        let (left, right) = (left + right * c.x_shear, right + left * c.y_shear);
        let (left, right) = (
            left * (1.0 + right * c.x_trapezoid),
            right * (1.0 + left * c.y_trapezoid),
        );

        Sample::new(left, right)
    }
}

/// Map `value` from `[min, max]` onto `[-1, 1]`.
fn normalize(value: f64, min: f64, max: f64) -> f64 {
    2.0 * (value - min) / (max - min) - 1.0
}
