//! Output stage filter
//!
//! The C64 audio output passes a low-pass (about 16 kHz) and a DC-blocking
//! high-pass (about 16 Hz) RC stage. With the stage disabled the chip DC
//! level is simply subtracted.

use serde::{Deserialize, Serialize};

use super::constants::{EXTERNAL_MAX_STEP, EXTERNAL_W0_HIGHPASS, EXTERNAL_W0_LOWPASS};
use crate::config::ChipModel;

/// Snapshot of every mutable output stage field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExternalFilterState {
    /// Stage enabled
    pub enabled: bool,
    /// Low-pass state
    pub vlp: i32,
    /// High-pass state
    pub vhp: i32,
    /// Output
    pub vo: i32,
}

/// C64 output stage (RC low-pass + RC high-pass)
#[derive(Clone, Debug)]
pub struct ExternalFilter {
    enabled: bool,
    output_dc: i32,
    vlp: i32,
    vhp: i32,
    vo: i32,
}

impl ExternalFilter {
    /// Create an enabled output stage for the given model
    pub fn new(model: ChipModel) -> Self {
        Self {
            enabled: true,
            output_dc: model.output_dc(),
            vlp: 0,
            vhp: 0,
            vo: 0,
        }
    }

    /// Switch the DC level removed in bypass mode
    pub fn set_chip_model(&mut self, model: ChipModel) {
        self.output_dc = model.output_dc();
    }

    /// Bypass the RC stages when `false`
    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Clear the filter state
    pub fn reset(&mut self) {
        self.vlp = 0;
        self.vhp = 0;
        self.vo = 0;
    }

    /// Advance one cycle with mixer output `vi`
    #[inline]
    pub fn clock(&mut self, vi: i32) {
        if !self.enabled {
            self.vlp = 0;
            self.vhp = 0;
            self.vo = vi.wrapping_sub(self.output_dc);
            return;
        }

        let vi = vi as i64;
        let vlp = self.vlp as i64;
        let vhp = self.vhp as i64;
        let dvlp = ((EXTERNAL_W0_LOWPASS as i64 >> 8) * (vi - vlp)) >> 12;
        let dvhp = (EXTERNAL_W0_HIGHPASS as i64 * (vlp - vhp)) >> 20;
        self.vo = (vlp - vhp) as i32;
        self.vlp = (vlp + dvlp) as i32;
        self.vhp = (vhp + dvhp) as i32;
    }

    /// Advance `delta` cycles with constant input, in steps of up to 8 cycles
    pub fn clock_delta(&mut self, mut delta: u32, vi: i32) {
        if !self.enabled {
            self.vlp = 0;
            self.vhp = 0;
            self.vo = vi.wrapping_sub(self.output_dc);
            return;
        }

        let vi = vi as i64;
        let mut step = EXTERNAL_MAX_STEP;
        while delta != 0 {
            if delta < step {
                step = delta;
            }
            let vlp = self.vlp as i64;
            let vhp = self.vhp as i64;
            let dvlp = (((EXTERNAL_W0_LOWPASS as i64 * step as i64) >> 8) * (vi - vlp)) >> 12;
            let dvhp = (EXTERNAL_W0_HIGHPASS as i64 * step as i64 * (vlp - vhp)) >> 20;
            self.vo = (vlp - vhp) as i32;
            self.vlp = (vlp + dvlp) as i32;
            self.vhp = (vhp + dvhp) as i32;
            delta -= step;
        }
    }

    /// Current output
    #[inline]
    pub fn output(&self) -> i32 {
        self.vo
    }

    /// Capture every mutable field
    pub fn read_state(&self) -> ExternalFilterState {
        ExternalFilterState {
            enabled: self.enabled,
            vlp: self.vlp,
            vhp: self.vhp,
            vo: self.vo,
        }
    }

    /// Restore every mutable field
    pub fn write_state(&mut self, state: &ExternalFilterState) {
        self.enabled = state.enabled;
        self.vlp = state.vlp;
        self.vhp = state.vhp;
        self.vo = state.vo;
    }
}

impl Default for ExternalFilter {
    fn default() -> Self {
        Self::new(ChipModel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bypass_removes_dc() {
        let mut ext = ExternalFilter::new(ChipModel::Mos6581);
        ext.enable(false);
        let dc = ChipModel::Mos6581.output_dc();
        ext.clock(dc + 1234);
        assert_eq!(ext.output(), 1234);
        ext.clock_delta(100, dc);
        assert_eq!(ext.output(), 0);
    }

    #[test]
    fn test_blocks_dc() {
        let mut ext = ExternalFilter::new(ChipModel::Mos8580);
        ext.clock_delta(2_000, 100_000);
        assert!(ext.output() > 50_000, "step response too slow: {}", ext.output());
        // High-pass time constant is about 10 ms; give it a few
        ext.clock_delta(2_000_000, 100_000);
        assert!(ext.output().abs() < 2_000, "DC leaked: {}", ext.output());
    }

    #[test]
    fn test_single_and_bulk_follow_same_response() {
        let mut a = ExternalFilter::new(ChipModel::Mos8580);
        let mut b = ExternalFilter::new(ChipModel::Mos8580);
        for _ in 0..4000 {
            a.clock(20_000);
        }
        b.clock_delta(4000, 20_000);
        for out in [a.output(), b.output()] {
            assert!(out > 10_000 && out <= 20_000, "output {out}");
        }
    }
}
