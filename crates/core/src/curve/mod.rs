//! Velocity curves.
//!
//! A curve is a 128-entry table remapping a linear 0..=127 velocity to a
//! perceptual one. Tables are generated once when the kit is assembled and
//! are read-only afterwards.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::protocol::{Command, Frame};
use crate::{EdrumError, Result};

/// Number of entries in a velocity table.
pub const CURVE_LENGTH: usize = 128;

/// Largest value a velocity table holds.
pub const CURVE_MAX: u8 = 127;

/// Width of the name field in the send-curve frame.
const NAME_WIDTH: usize = 9;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum CurveShape {
    Linear = 0,
    Exp1 = 1,
    Exp2 = 2,
    Log1 = 3,
    Log2 = 4,
    Loud1 = 5,
    Loud2 = 6,
    Spline = 7,
}

impl CurveShape {
    pub const ALL: [CurveShape; 8] = [
        CurveShape::Linear,
        CurveShape::Exp1,
        CurveShape::Exp2,
        CurveShape::Log1,
        CurveShape::Log2,
        CurveShape::Loud1,
        CurveShape::Loud2,
        CurveShape::Spline,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn from_id(id: u8) -> Result<Self> {
        Self::try_from(id).map_err(|_| EdrumError::UnknownCurve(id))
    }

    pub fn id(self) -> u8 {
        self.into()
    }

    pub fn name(self) -> &'static str {
        match self {
            CurveShape::Linear => "Linear",
            CurveShape::Exp1 => "Exp1",
            CurveShape::Exp2 => "Exp2",
            CurveShape::Log1 => "Log1",
            CurveShape::Log2 => "Log2",
            CurveShape::Loud1 => "Loud1",
            CurveShape::Loud2 => "Loud2",
            CurveShape::Spline => "Spline",
        }
    }

    /// Shape function over the normalised abscissa `x ∈ [0, 1]`.
    fn eval(self, x: f64) -> f64 {
        match self {
            CurveShape::Linear => x,
            CurveShape::Exp1 => x.exp_m1(),
            CurveShape::Exp2 => x.exp_m1() * x.exp_m1(),
            CurveShape::Log1 => (1.0 + x).log2(),
            CurveShape::Log2 => (1.0 + x).log2() * (1.0 + x).log2(),
            CurveShape::Loud1 => 0.25 + 0.75 * x,
            CurveShape::Loud2 => 0.75 + 0.25 * x,
            CurveShape::Spline => 1.0 / (1.0 + (-12.0 * (x - 0.5)).exp()),
        }
    }
}

/// Generates a normalised curve of `length` points with values in `[0, 1]`
/// whose last point is exactly `1.0`.
pub fn generate(shape: CurveShape, length: usize) -> Vec<f64> {
    let ramp: Vec<f64> = (0..length).map(|i| i as f64).collect();
    let abscissa = normalize(ramp);
    normalize(abscissa.into_iter().map(|x| shape.eval(x)).collect())
}

/// Quantises normalised values to integers in `0..=max`, rounding down.
pub fn quantize(values: &[f64], max: u8) -> Vec<u8> {
    values
        .iter()
        .map(|v| (f64::from(max) * v.clamp(0.0, 1.0)).floor() as u8)
        .collect()
}

/// Looks up `index` in `table`, clamping to the last entry.
pub fn apply(table: &[u8], index: usize) -> u8 {
    match table.len() {
        0 => 0,
        len => table[index.min(len - 1)],
    }
}

fn normalize(values: Vec<f64>) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    if max <= 0.0 {
        return values;
    }
    values.into_iter().map(|v| v / max).collect()
}

/// Immutable velocity table for one curve shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curve {
    shape: CurveShape,
    table: [u8; CURVE_LENGTH],
}

impl Curve {
    pub fn new(shape: CurveShape) -> Self {
        let mut table = [0; CURVE_LENGTH];
        table.copy_from_slice(&quantize(&generate(shape, CURVE_LENGTH), CURVE_MAX));
        Self { shape, table }
    }

    pub fn shape(&self) -> CurveShape {
        self.shape
    }

    pub fn table(&self) -> &[u8; CURVE_LENGTH] {
        &self.table
    }

    pub fn apply(&self, velocity: u8) -> u8 {
        apply(&self.table, velocity as usize)
    }

    /// Builds the send-curve frame: id, 9-byte name, then the full table.
    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::new(Command::SendCurve);
        frame.push_byte(self.shape.id());
        frame.push_text(self.shape.name(), NAME_WIDTH);
        for value in self.table {
            frame.push_byte(value);
        }
        frame
    }
}
