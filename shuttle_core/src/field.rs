//! Position ↔ magnetic field mapping above the magnet.
//!
//! Distances are in cm above the magnet centre, fields in mT. Two models are
//! supported: the analytic fit `B(z) = B0 / (1 + (z/b)^a)` and a measured
//! table with linear interpolation. Both are monotonically decreasing in `z`.

use crate::error::ShuttleError;

/// Analytic fit parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldFit {
    pub b0_mt: f64,
    pub a: f64,
    pub b: f64,
}

impl FieldFit {
    #[must_use]
    pub fn field_at(&self, z_cm: f64) -> f64 {
        self.b0_mt / (1.0 + (z_cm / self.b).powf(self.a))
    }

    /// Closed-form inverse; NaN or infinite when the field is not reachable.
    #[must_use]
    pub fn distance_for(&self, field_mt: f64) -> f64 {
        self.b * (self.b0_mt / field_mt - 1.0).powf(1.0 / self.a)
    }
}

/// Measured distance/field table, distance strictly ascending and field
/// strictly descending.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTable {
    distance_cm: Vec<f64>,
    field_mt: Vec<f64>,
}

impl FieldTable {
    pub fn from_points(points: &[(f64, f64)]) -> Result<Self, ShuttleError> {
        if points.len() < 2 {
            return Err(ShuttleError::Configuration(format!(
                "field table needs at least two rows, got {}",
                points.len()
            )));
        }
        if points.iter().any(|(d, b)| !(d.is_finite() && b.is_finite())) {
            return Err(ShuttleError::Configuration(
                "field table contains non-finite values".into(),
            ));
        }
        for w in points.windows(2) {
            if w[1].0 <= w[0].0 || w[1].1 >= w[0].1 {
                return Err(ShuttleError::Configuration(
                    "field table must have increasing distance and decreasing field".into(),
                ));
            }
        }
        Ok(Self {
            distance_cm: points.iter().map(|p| p.0).collect(),
            field_mt: points.iter().map(|p| p.1).collect(),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.distance_cm.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.distance_cm.is_empty()
    }

    /// Distance span covered by the table.
    #[must_use]
    pub fn distance_range(&self) -> (f64, f64) {
        (self.distance_cm[0], self.distance_cm[self.len() - 1])
    }

    pub fn field_at(&self, z_cm: f64) -> Result<f64, ShuttleError> {
        let (lo, hi) = self.distance_range();
        if !(z_cm >= lo && z_cm <= hi) {
            return Err(ShuttleError::OutOfRange(format!(
                "distance {z_cm:.3} cm outside field table [{lo}, {hi}]"
            )));
        }
        let idx = self.distance_cm.partition_point(|d| *d < z_cm);
        if idx == 0 {
            return Ok(self.field_mt[0]);
        }
        Ok(lerp(
            z_cm,
            (self.distance_cm[idx - 1], self.field_mt[idx - 1]),
            (self.distance_cm[idx], self.field_mt[idx]),
        ))
    }

    pub fn distance_for(&self, field_mt: f64) -> Result<f64, ShuttleError> {
        let top = self.field_mt[0];
        let bottom = self.field_mt[self.len() - 1];
        if !(field_mt <= top && field_mt >= bottom) {
            return Err(ShuttleError::OutOfRange(format!(
                "field {field_mt} mT outside field table [{bottom}, {top}]"
            )));
        }
        // Fields descend, so the prefix strictly above the target is contiguous.
        let idx = self.field_mt.partition_point(|b| *b > field_mt);
        if idx == 0 {
            return Ok(self.distance_cm[0]);
        }
        Ok(lerp(
            field_mt,
            (self.field_mt[idx - 1], self.distance_cm[idx - 1]),
            (self.field_mt[idx], self.distance_cm[idx]),
        ))
    }
}

#[inline]
fn lerp(x: f64, (x0, y0): (f64, f64), (x1, y1): (f64, f64)) -> f64 {
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldModel {
    Analytic(FieldFit),
    Table(FieldTable),
}

/// Field model bounded by the shuttle's travel.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPositionModel {
    pub model: FieldModel,
    pub max_height_cm: f64,
}

impl FieldPositionModel {
    #[must_use]
    pub fn new(model: FieldModel, max_height_cm: f64) -> Self {
        Self {
            model,
            max_height_cm,
        }
    }

    /// Field at distance `z`. Negative or non-finite distances are rejected;
    /// table lookups outside the measured span are rejected.
    pub fn field_for_distance(&self, z_cm: f64) -> Result<f64, ShuttleError> {
        if !z_cm.is_finite() || z_cm < 0.0 {
            return Err(ShuttleError::OutOfRange(format!(
                "distance {z_cm} cm is not a valid position"
            )));
        }
        match &self.model {
            FieldModel::Analytic(fit) => Ok(fit.field_at(z_cm)),
            FieldModel::Table(t) => t.field_at(z_cm),
        }
    }

    /// Distance at which the field equals `field_mt`, within `[0, max_height]`.
    pub fn distance_for_field(&self, field_mt: f64) -> Result<f64, ShuttleError> {
        let z = match &self.model {
            FieldModel::Analytic(fit) => fit.distance_for(field_mt),
            FieldModel::Table(t) => t.distance_for(field_mt)?,
        };
        if !z.is_finite() || z < 0.0 || z > self.max_height_cm {
            return Err(ShuttleError::OutOfRange(format!(
                "field {field_mt} mT requires distance {z:.3} cm, outside [0, {}]",
                self.max_height_cm
            )));
        }
        Ok(z)
    }
}
