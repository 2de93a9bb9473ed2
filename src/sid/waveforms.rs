//! Combined waveform tables
//!
//! Selecting more than one waveform at once wires the waveform outputs
//! together; bits pull each other down and the result is not a simple AND.
//! The tables here are generated from a parametric pulldown model fitted to
//! sampled chip output and cached process-wide per chip model.

use std::fmt;
use std::sync::OnceLock;

use crate::config::ChipModel;

/// Entries in the tables indexed by the 12-bit sawtooth value
pub const SAW_TABLE_SIZE: usize = 4096;

/// Entries in the pulse+triangle table, indexed by the triangle value >> 1
pub const TRIANGLE_TABLE_SIZE: usize = 2048;

/// Pulldown model parameters for one waveform combination
#[derive(Debug, Clone, Copy)]
struct PulldownConfig {
    threshold: f64,
    pulse_strength: f64,
    distance_low: f64,
    distance_high: f64,
}

impl PulldownConfig {
    const fn new(threshold: f64, pulse_strength: f64, distance_low: f64, distance_high: f64) -> Self {
        Self {
            threshold,
            pulse_strength,
            distance_low,
            distance_high,
        }
    }
}

// Order: saw+triangle, pulse+triangle, pulse+saw, pulse+saw+triangle
const CONFIG_6581: [PulldownConfig; 4] = [
    PulldownConfig::new(0.862147212, 0.0, 10.8962431, 2.50848103),
    PulldownConfig::new(0.932746708, 2.07508397, 1.03668225, 1.14876997),
    PulldownConfig::new(0.860927045, 2.43506575, 0.908603609, 1.07907593),
    PulldownConfig::new(0.890159488, 1.16548145, 0.935303569, 1.12645614),
];

const CONFIG_8580: [PulldownConfig; 4] = [
    PulldownConfig::new(0.715788841, 0.0, 1.32999945, 2.2172699),
    PulldownConfig::new(0.93500334, 1.05977178, 1.08629429, 1.43518543),
    PulldownConfig::new(0.920648575, 0.943601072, 1.13034654, 1.41881108),
    PulldownConfig::new(0.90921098, 0.979807794, 0.942194462, 1.40958893),
];

/// Combined waveform lookup tables for one chip model
///
/// Entries hold the upper 8 bits of the 12-bit result; the lower 4 bits are
/// always zero.
pub struct WaveformTables {
    saw_triangle: [u8; SAW_TABLE_SIZE],
    pulse_triangle: [u8; TRIANGLE_TABLE_SIZE],
    pulse_saw: [u8; SAW_TABLE_SIZE],
    pulse_saw_triangle: [u8; SAW_TABLE_SIZE],
}

impl WaveformTables {
    fn generate(configs: &[PulldownConfig; 4]) -> Self {
        let mut tables = Self {
            saw_triangle: [0; SAW_TABLE_SIZE],
            pulse_triangle: [0; TRIANGLE_TABLE_SIZE],
            pulse_saw: [0; SAW_TABLE_SIZE],
            pulse_saw_triangle: [0; SAW_TABLE_SIZE],
        };

        for acc in 0..SAW_TABLE_SIZE as u32 {
            tables.saw_triangle[acc as usize] = (pulldown(&configs[0], 0x3, acc) >> 4) as u8;
            tables.pulse_saw[acc as usize] = (pulldown(&configs[2], 0x6, acc) >> 4) as u8;
            tables.pulse_saw_triangle[acc as usize] = (pulldown(&configs[3], 0x7, acc) >> 4) as u8;
        }
        // The triangle output for accumulator t < 0x800 is t << 1, so
        // evaluating at t gives the entry for triangle >> 1 == t.
        for t in 0..TRIANGLE_TABLE_SIZE as u32 {
            tables.pulse_triangle[t as usize] = (pulldown(&configs[1], 0x5, t) >> 4) as u8;
        }

        tables
    }

    /// Sawtooth + triangle, indexed by the sawtooth output
    #[inline]
    pub fn saw_triangle(&self, saw: u16) -> u16 {
        (self.saw_triangle[(saw & 0xfff) as usize] as u16) << 4
    }

    /// Pulse + triangle (before the pulse AND), indexed by the triangle output
    #[inline]
    pub fn pulse_triangle(&self, triangle: u16) -> u16 {
        (self.pulse_triangle[((triangle & 0xfff) >> 1) as usize] as u16) << 4
    }

    /// Pulse + sawtooth (before the pulse AND), indexed by the sawtooth output
    #[inline]
    pub fn pulse_saw(&self, saw: u16) -> u16 {
        (self.pulse_saw[(saw & 0xfff) as usize] as u16) << 4
    }

    /// Pulse + sawtooth + triangle (before the pulse AND)
    #[inline]
    pub fn pulse_saw_triangle(&self, saw: u16) -> u16 {
        (self.pulse_saw_triangle[(saw & 0xfff) as usize] as u16) << 4
    }
}

impl fmt::Debug for WaveformTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaveformTables").finish_non_exhaustive()
    }
}

/// Evaluate the pulldown model for one 12-bit accumulator value
///
/// `waveform` uses the control register nibble layout (T=1, S=2, P=4).
fn pulldown(config: &PulldownConfig, waveform: u8, accumulator: u32) -> u16 {
    let mut o = [0.0f64; 12];
    for (i, bit) in o.iter_mut().enumerate() {
        *bit = if (accumulator >> i) & 1 != 0 { 1.0 } else { 0.0 };
    }

    // Triangle without sawtooth: fold and shift up one bit
    if waveform & 3 == 1 {
        let top = accumulator & 0x800 != 0;
        for i in (1..12).rev() {
            o[i] = if top { 1.0 - o[i - 1] } else { o[i - 1] };
        }
        o[0] = 0.0;
    }

    let mut distance = [0.0f64; 25];
    distance[12] = 1.0;
    for i in 1..=12 {
        distance[12 - i] = 1.0 / config.distance_low.powi(i as i32);
        distance[12 + i] = 1.0 / config.distance_high.powi(i as i32);
    }

    let mut value = 0u16;
    for i in 0..12 {
        let mut avg = 0.0;
        let mut n = 0.0;
        for (j, &bit) in o.iter().enumerate() {
            let weight = distance[i + 12 - j];
            avg += bit * weight;
            n += weight;
        }
        if waveform > 4 {
            // Pulse acts as an extra bit just above the top
            let weight = distance[i];
            avg += config.pulse_strength * weight;
            n += weight;
        }
        if (o[i] + avg / n) * 0.5 > config.threshold {
            value |= 1 << i;
        }
    }
    value
}

static TABLES_6581: OnceLock<WaveformTables> = OnceLock::new();
static TABLES_8580: OnceLock<WaveformTables> = OnceLock::new();

/// Shared read-only tables for a chip model, built on first use
pub fn tables(model: ChipModel) -> &'static WaveformTables {
    match model {
        ChipModel::Mos6581 => TABLES_6581.get_or_init(|| WaveformTables::generate(&CONFIG_6581)),
        ChipModel::Mos8580 => TABLES_8580.get_or_init(|| WaveformTables::generate(&CONFIG_8580)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_shared() {
        let a = tables(ChipModel::Mos6581) as *const WaveformTables;
        let b = tables(ChipModel::Mos6581) as *const WaveformTables;
        assert_eq!(a, b);
    }

    #[test]
    fn test_saw_triangle_extremes() {
        for model in [ChipModel::Mos6581, ChipModel::Mos8580] {
            let t = tables(model);
            assert_eq!(t.saw_triangle(0), 0);
            assert_eq!(t.saw_triangle(0xfff), 0xff0);
        }
    }

    #[test]
    fn test_pulse_combinations_silent_at_zero() {
        let t = tables(ChipModel::Mos6581);
        assert_eq!(t.pulse_saw(0), 0);
        assert_eq!(t.pulse_saw_triangle(0), 0);
        assert_eq!(t.pulse_triangle(0), 0);
    }

    #[test]
    fn test_combinations_never_exceed_plain_saw() {
        // Pulldown only ever removes bits from the strongest waveform
        let t = tables(ChipModel::Mos8580);
        let mut nonzero = 0;
        for saw in 0..0x1000u16 {
            let combined = t.pulse_saw(saw);
            assert!(combined <= 0xff0);
            if combined != 0 {
                nonzero += 1;
            }
        }
        assert!(nonzero > 0);
    }

    #[test]
    fn test_models_differ() {
        let a = tables(ChipModel::Mos6581);
        let b = tables(ChipModel::Mos8580);
        let differs = (0..0x1000u16).any(|s| a.saw_triangle(s) != b.saw_triangle(s));
        assert!(differs);
    }

    #[test]
    fn test_pinned_6581_values() {
        let t = tables(ChipModel::Mos6581);
        assert_eq!(t.saw_triangle(0x3ff), 0x3f0);
        assert_eq!(t.saw_triangle(0x7ff), 0x7f0);
        assert_eq!(t.saw_triangle(0xe00), 0xc00);
        assert_eq!(t.saw_triangle(0xff0), 0xfe0);
        assert_eq!(t.pulse_saw(0x7ff), 0x7f0);
        assert_eq!(t.pulse_saw(0xf00), 0x000);
        assert_eq!(t.pulse_saw(0xf80), 0xf80);
        assert_eq!(t.pulse_saw_triangle(0xfc0), 0x000);
        assert_eq!(t.pulse_saw_triangle(0xfff), 0xff0);
        assert_eq!(t.pulse_triangle(0x7fe), 0x7f0);
        assert_eq!(t.pulse_triangle(0x800), 0x000);
        assert_eq!(t.pulse_triangle(0xffe), 0xff0);
    }

    #[test]
    fn test_pinned_8580_values() {
        let t = tables(ChipModel::Mos8580);
        assert_eq!(t.saw_triangle(0x3ff), 0x3f0);
        assert_eq!(t.saw_triangle(0x7f0), 0x7f0);
        assert_eq!(t.saw_triangle(0xe00), 0xe00);
        assert_eq!(t.saw_triangle(0xf80), 0xf80);
        assert_eq!(t.pulse_saw(0x7ff), 0x3f0);
        assert_eq!(t.pulse_saw(0xf00), 0x000);
        assert_eq!(t.pulse_saw(0xf80), 0x800);
        assert_eq!(t.pulse_saw_triangle(0xfc0), 0xf80);
        assert_eq!(t.pulse_triangle(0x7fe), 0x1f0);
        assert_eq!(t.pulse_triangle(0xf80), 0x800);
    }
}
