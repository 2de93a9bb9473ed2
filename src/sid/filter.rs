//! Two-integrator-loop filter
//!
//! Fixed-point model of the state variable filter: each cycle the
//! band-pass and low-pass integrators advance by w0 times their input and a
//! new high-pass value is formed from the resonance feedback. Routed voices
//! go through the filter, the rest bypass it, and the two paths are mixed
//! and scaled by the master volume.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::constants::{
    CUTOFF_STEPS, F0_POINTS_6581, F0_POINTS_8580, FILTER_STATE_LIMIT, W0_MAX_DELTA_HZ,
    W0_MAX_SINGLE_HZ, W0_SCALE,
};
use super::registers::{FilterMode, FilterRouting, VOICE3_OFF};
use super::spline;
use crate::config::{ChipModel, FilterDistortion};

/// Snapshot of every mutable filter field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterState {
    /// Filter enabled (not bypassed)
    pub enabled: bool,
    /// 11-bit cutoff register
    pub cutoff: u16,
    /// 4-bit resonance
    pub resonance: u8,
    /// Routing bits (v1, v2, v3, ext)
    pub routing: u8,
    /// Voice 3 disconnected when not routed
    pub voice3_off: bool,
    /// Mode bits (LP, BP, HP)
    pub mode: u8,
    /// Master volume
    pub volume: u8,
    /// High-pass node
    pub vhp: i32,
    /// Band-pass integrator
    pub vbp: i32,
    /// Low-pass integrator
    pub vlp: i32,
    /// Unfiltered sum
    pub vnf: i32,
}

/// SID analog filter
#[derive(Clone)]
pub struct Filter {
    enabled: bool,
    cutoff: u16,
    resonance: u8,
    routing: FilterRouting,
    voice3_off: bool,
    mode: FilterMode,
    volume: u8,

    mixer_dc: i32,
    distortion: FilterDistortion,

    vhp: i32,
    vbp: i32,
    vlp: i32,
    vnf: i32,

    w0_ceil_single: i32,
    w0_ceil_delta: i32,
    q_1024_div: i32,

    w0_max_single: i32,
    w0_max_delta: i32,
    q_1024_div_table: [i32; 16],

    f0: [i32; CUTOFF_STEPS],
    w0: [i32; CUTOFF_STEPS],
}

/// Fixed-point angular frequency for a cutoff in Hz
fn angular_frequency(hz: f64) -> i32 {
    (2.0 * std::f64::consts::PI * hz * W0_SCALE) as i32
}

/// 1024/Q for the 16 resonance settings; Q runs from 0.707 to 1.707
fn q_1024_div_table() -> [i32; 16] {
    std::array::from_fn(|resonance| (1024.0 / (0.707 + resonance as f64 / 15.0)) as i32)
}

impl Filter {
    /// Create a filter with the factory cutoff curve of `model`
    pub fn new(model: ChipModel) -> Self {
        Self::with_distortion(model, FilterDistortion::None)
    }

    /// Create a filter with a specific integrator behaviour
    pub fn with_distortion(model: ChipModel, distortion: FilterDistortion) -> Self {
        let mut filter = Self {
            enabled: true,
            cutoff: 0,
            resonance: 0,
            routing: FilterRouting::empty(),
            voice3_off: false,
            mode: FilterMode::empty(),
            volume: 0,
            mixer_dc: 0,
            distortion,
            vhp: 0,
            vbp: 0,
            vlp: 0,
            vnf: 0,
            w0_ceil_single: 0,
            w0_ceil_delta: 0,
            q_1024_div: 0,
            w0_max_single: angular_frequency(W0_MAX_SINGLE_HZ),
            w0_max_delta: angular_frequency(W0_MAX_DELTA_HZ),
            q_1024_div_table: q_1024_div_table(),
            f0: [0; CUTOFF_STEPS],
            w0: [0; CUTOFF_STEPS],
        };
        filter.set_chip_model(model);
        filter
    }

    /// Switch DC level and revert to the model's factory cutoff curve
    pub fn set_chip_model(&mut self, model: ChipModel) {
        self.mixer_dc = model.mixer_dc();
        let table = match model {
            ChipModel::Mos6581 => spline::cutoff_table(&F0_POINTS_6581),
            ChipModel::Mos8580 => spline::cutoff_table(&F0_POINTS_8580),
        };
        self.set_cutoff_table(table);
        self.set_q();
    }

    /// Install a cutoff curve (FC register value -> Hz)
    ///
    /// The angular frequency table is derived here; register writes and
    /// clocking only index it.
    pub fn set_cutoff_table(&mut self, table: [i32; CUTOFF_STEPS]) {
        self.f0 = table;
        for (w0, &hz) in self.w0.iter_mut().zip(self.f0.iter()) {
            *w0 = angular_frequency(hz as f64);
        }
        self.set_w0();
    }

    /// Cutoff frequency in Hz for an FC register value
    pub fn cutoff_frequency(&self, cutoff: u16) -> i32 {
        self.f0[(cutoff as usize) & (CUTOFF_STEPS - 1)]
    }

    /// Bypass the filter (all inputs summed unfiltered) when `false`
    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Reset registers and integrator state
    pub fn reset(&mut self) {
        self.cutoff = 0;
        self.resonance = 0;
        self.routing = FilterRouting::empty();
        self.voice3_off = false;
        self.mode = FilterMode::empty();
        self.volume = 0;

        self.vhp = 0;
        self.vbp = 0;
        self.vlp = 0;
        self.vnf = 0;

        self.set_w0();
        self.set_q();
    }

    /// Write FC bits 0-2
    pub fn write_cutoff_lo(&mut self, value: u8) {
        self.cutoff = (self.cutoff & 0x7f8) | (value as u16 & 0x007);
        self.set_w0();
    }

    /// Write FC bits 3-10
    pub fn write_cutoff_hi(&mut self, value: u8) {
        self.cutoff = (((value as u16) << 3) & 0x7f8) | (self.cutoff & 0x007);
        self.set_w0();
    }

    /// Write resonance and routing
    pub fn write_resonance_routing(&mut self, value: u8) {
        self.resonance = (value >> 4) & 0x0f;
        self.set_q();
        self.routing = FilterRouting::from_bits_truncate(value);
    }

    /// Write mode, voice 3 disconnect and volume
    pub fn write_mode_volume(&mut self, value: u8) {
        self.voice3_off = value & VOICE3_OFF != 0;
        self.mode = FilterMode::from_bits_truncate((value >> 4) & 0x07);
        self.volume = value & 0x0f;
    }

    #[inline]
    fn set_w0(&mut self) {
        let w0 = self.w0[(self.cutoff as usize) & (CUTOFF_STEPS - 1)];
        self.w0_ceil_single = w0.min(self.w0_max_single);
        self.w0_ceil_delta = w0.min(self.w0_max_delta);
    }

    #[inline]
    fn set_q(&mut self) {
        self.q_1024_div = self.q_1024_div_table[(self.resonance & 0x0f) as usize];
    }

    /// Split the scaled inputs into filtered (`Vi`) and unfiltered sums
    #[inline]
    fn route(&mut self, voice1: i32, voice2: i32, voice3: i32, ext_in: i32) -> Option<i32> {
        let v1 = voice1 >> 7;
        let v2 = voice2 >> 7;
        let v3 = if self.voice3_off && !self.routing.contains(FilterRouting::VOICE3) {
            0
        } else {
            voice3 >> 7
        };
        let ext = ext_in >> 7;

        if !self.enabled {
            self.vnf = v1 + v2 + v3 + ext;
            self.vhp = 0;
            self.vbp = 0;
            self.vlp = 0;
            return None;
        }

        let mut vi = 0;
        let mut vnf = 0;
        for (flag, v) in [
            (FilterRouting::VOICE1, v1),
            (FilterRouting::VOICE2, v2),
            (FilterRouting::VOICE3, v3),
            (FilterRouting::EXT_IN, ext),
        ] {
            if self.routing.contains(flag) {
                vi += v;
            } else {
                vnf += v;
            }
        }
        self.vnf = vnf;
        Some(vi)
    }

    #[inline]
    fn limit(&self, value: i64) -> i32 {
        match self.distortion {
            FilterDistortion::None => value as i32,
            FilterDistortion::Clamped => {
                value.clamp(-(FILTER_STATE_LIMIT as i64), FILTER_STATE_LIMIT as i64) as i32
            }
        }
    }

    #[inline]
    fn integrate(&mut self, w0: i32, vi: i32) {
        let dvbp = (w0 as i64 * self.vhp as i64) >> 20;
        let dvlp = (w0 as i64 * self.vbp as i64) >> 20;
        let vbp = self.limit(self.vbp as i64 - dvbp);
        let vlp = self.limit(self.vlp as i64 - dvlp);
        self.vbp = vbp;
        self.vlp = vlp;
        self.vhp =
            self.limit(((vbp as i64 * self.q_1024_div as i64) >> 10) - vlp as i64 - vi as i64);
    }

    /// Advance one cycle with the given 20-bit voice outputs and external input
    #[inline]
    pub fn clock(&mut self, voice1: i32, voice2: i32, voice3: i32, ext_in: i32) {
        if let Some(vi) = self.route(voice1, voice2, voice3, ext_in) {
            self.integrate(self.w0_ceil_single, vi);
        }
    }

    /// Advance `delta` cycles with constant inputs
    ///
    /// Runs one integration step per cycle with the cutoff capped at 4 kHz,
    /// so it matches `delta` single clocks whenever the cutoff lies below
    /// that cap. The cost is linear in `delta`; above the cap the result
    /// drifts slightly from single clocking.
    pub fn clock_delta(&mut self, delta: u32, voice1: i32, voice2: i32, voice3: i32, ext_in: i32) {
        if delta == 0 {
            return;
        }
        if let Some(vi) = self.route(voice1, voice2, voice3, ext_in) {
            for _ in 0..delta {
                self.integrate(self.w0_ceil_delta, vi);
            }
        }
    }

    /// Mixed and volume-scaled output
    #[inline]
    pub fn output(&self) -> i32 {
        let volume = self.volume as i64;
        if !self.enabled {
            return clamp_i32((self.vnf as i64 + self.mixer_dc as i64) * volume);
        }

        let mut vf = 0i64;
        if self.mode.contains(FilterMode::LOWPASS) {
            vf += self.vlp as i64;
        }
        if self.mode.contains(FilterMode::BANDPASS) {
            vf += self.vbp as i64;
        }
        if self.mode.contains(FilterMode::HIGHPASS) {
            vf += self.vhp as i64;
        }

        clamp_i32((self.vnf as i64 + vf + self.mixer_dc as i64) * volume)
    }

    /// Capture every mutable field
    pub fn read_state(&self) -> FilterState {
        FilterState {
            enabled: self.enabled,
            cutoff: self.cutoff,
            resonance: self.resonance,
            routing: self.routing.bits(),
            voice3_off: self.voice3_off,
            mode: self.mode.bits(),
            volume: self.volume,
            vhp: self.vhp,
            vbp: self.vbp,
            vlp: self.vlp,
            vnf: self.vnf,
        }
    }

    /// Restore every mutable field and recompute the derived coefficients
    pub fn write_state(&mut self, state: &FilterState) {
        self.enabled = state.enabled;
        self.cutoff = state.cutoff & 0x7ff;
        self.resonance = state.resonance & 0x0f;
        self.routing = FilterRouting::from_bits_truncate(state.routing);
        self.voice3_off = state.voice3_off;
        self.mode = FilterMode::from_bits_truncate(state.mode);
        self.volume = state.volume & 0x0f;
        self.vhp = state.vhp;
        self.vbp = state.vbp;
        self.vlp = state.vlp;
        self.vnf = state.vnf;
        self.set_w0();
        self.set_q();
    }
}

#[inline]
fn clamp_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl Default for Filter {
    fn default() -> Self {
        Self::new(ChipModel::default())
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("enabled", &self.enabled)
            .field("cutoff", &self.cutoff)
            .field("resonance", &self.resonance)
            .field("routing", &self.routing)
            .field("mode", &self.mode)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}
