//! Cutoff curve interpolation
//!
//! Piecewise cubic Hermite interpolation through measured (FC, Hz) points.
//! The slope at an interior point is the chord slope between its two
//! neighbours. A point given twice marks an end where the second derivative
//! is zero; two such ends in one segment give a straight line.

use serde::{Deserialize, Serialize};

use super::constants::CUTOFF_STEPS;
use crate::{Result, SidError};

/// One cutoff calibration point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutoffPoint {
    /// 11-bit FC register value
    pub cutoff: u16,
    /// Measured cutoff frequency in Hz
    pub frequency: u32,
}

impl CutoffPoint {
    /// Create a calibration point
    pub fn new(cutoff: u16, frequency: u32) -> Self {
        Self { cutoff, frequency }
    }
}

/// Cubic a*x^3 + b*x^2 + c*x + d through (x1, y1), (x2, y2) with end slopes k1, k2
fn cubic_coefficients(x1: f64, y1: f64, x2: f64, y2: f64, k1: f64, k2: f64) -> [f64; 4] {
    let dx = x2 - x1;
    let dy = y2 - y1;

    let a = ((k1 + k2) - 2.0 * dy / dx) / (dx * dx);
    let b = ((k2 - k1) / dx - 3.0 * (x1 + x2) * a) / 2.0;
    let c = k1 - (3.0 * x1 * a + 2.0 * b) * x1;
    let d = y1 - ((x1 * a + b) * x1 + c) * x1;

    [a, b, c, d]
}

/// Run the spline through `points` and hand every integer x in each
/// segment to `plot`
///
/// `points` must already carry the repeated end points.
pub fn interpolate<F>(points: &[(i32, i32)], mut plot: F)
where
    F: FnMut(i32, f64),
{
    for window in points.windows(4) {
        let [(x0, y0), (x1, y1), (x2, y2), (x3, y3)] =
            [window[0], window[1], window[2], window[3]].map(|(x, y)| (x as f64, y as f64));

        if x1 == x2 {
            continue;
        }

        let (k1, k2) = if x0 == x1 && x2 == x3 {
            let k = (y2 - y1) / (x2 - x1);
            (k, k)
        } else if x0 == x1 {
            let k2 = (y3 - y1) / (x3 - x1);
            ((3.0 * (y2 - y1) / (x2 - x1) - k2) / 2.0, k2)
        } else if x2 == x3 {
            let k1 = (y2 - y0) / (x2 - x0);
            (k1, (3.0 * (y2 - y1) / (x2 - x1) - k1) / 2.0)
        } else {
            ((y2 - y0) / (x2 - x0), (y3 - y1) / (x3 - x1))
        };

        let [a, b, c, d] = cubic_coefficients(x1, y1, x2, y2, k1, k2);
        for x in window[1].0..=window[2].0 {
            let xf = x as f64;
            plot(x, ((a * xf + b) * xf + c) * xf + d);
        }
    }
}

/// Build the cutoff table from points that already carry repeated ends
///
/// Values are rounded to the nearest Hz and negative overshoot is clipped.
pub fn cutoff_table(points: &[(i32, i32)]) -> [i32; CUTOFF_STEPS] {
    let mut table = [0i32; CUTOFF_STEPS];
    interpolate(points, |x, y| {
        if let Some(slot) = usize::try_from(x).ok().and_then(|i| table.get_mut(i)) {
            *slot = y.max(0.0).round() as i32;
        }
    });
    table
}

/// Check user calibration points and build the cutoff table
///
/// Points must be strictly increasing on both axes and lie within the
/// 11-bit register range. Below the first and above the last point the
/// curve is held flat.
pub fn calibrated_cutoff_table(points: &[CutoffPoint]) -> Result<[i32; CUTOFF_STEPS]> {
    if points.len() < 2 || points.len() > CUTOFF_STEPS {
        return Err(SidError::CalibrationError(format!(
            "expected 2 to {CUTOFF_STEPS} points, got {}",
            points.len()
        )));
    }
    for pair in points.windows(2) {
        if pair[1].cutoff <= pair[0].cutoff || pair[1].frequency <= pair[0].frequency {
            return Err(SidError::CalibrationError(format!(
                "points must be strictly increasing, got ({}, {}) then ({}, {})",
                pair[0].cutoff, pair[0].frequency, pair[1].cutoff, pair[1].frequency
            )));
        }
    }
    let (first, last) = (points[0], points[points.len() - 1]);
    if last.cutoff as usize >= CUTOFF_STEPS {
        return Err(SidError::CalibrationError(format!(
            "cutoff {} outside the 11-bit register range",
            last.cutoff
        )));
    }
    if last.frequency > i32::MAX as u32 {
        return Err(SidError::CalibrationError(format!(
            "frequency {} Hz out of range",
            last.frequency
        )));
    }

    let mut padded = Vec::with_capacity(points.len() + 2);
    padded.push((first.cutoff as i32, first.frequency as i32));
    padded.extend(points.iter().map(|p| (p.cutoff as i32, p.frequency as i32)));
    padded.push((last.cutoff as i32, last.frequency as i32));

    let mut table = cutoff_table(&padded);
    for entry in &mut table[..first.cutoff as usize] {
        *entry = first.frequency as i32;
    }
    for entry in &mut table[last.cutoff as usize + 1..] {
        *entry = last.frequency as i32;
    }
    Ok(table)
}
