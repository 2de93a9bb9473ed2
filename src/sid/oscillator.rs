//! Oscillator (waveform generator)
//!
//! A 24-bit phase accumulator drives the triangle, sawtooth and pulse
//! outputs; bit 19 of the accumulator clocks a 23-bit LFSR for noise. The
//! oscillator also takes part in hard sync and ring modulation with its
//! neighbour in the voice ring, which is passed in by the chip.

use serde::{Deserialize, Serialize};

use super::constants::{
    ACCUMULATOR_MASK, ACCUMULATOR_MSB, NOISE_CLOCK_BIT, NOISE_RESEED, SHIFT_REGISTER_MASK,
};
use super::registers::ControlFlags;
use super::waveforms::{self, WaveformTables};
use crate::config::{ChipModel, NoiseReseed};

/// Snapshot of every mutable oscillator field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OscillatorState {
    /// Phase accumulator (24 bits)
    pub accumulator: u32,
    /// Noise LFSR (23 bits)
    pub shift_register: u32,
    /// Frequency register
    pub freq: u16,
    /// Pulse width register (12 bits)
    pub pulse_width: u16,
    /// Waveform selector nibble
    pub waveform: u8,
    /// Test bit
    pub test: bool,
    /// Ring modulation bit
    pub ring_mod: bool,
    /// Hard sync bit
    pub sync: bool,
    /// Accumulator MSB went 0 -> 1 on the last clock
    pub msb_rising: bool,
}

/// SID waveform generator
#[derive(Clone, Debug)]
pub struct Oscillator {
    accumulator: u32,
    shift_register: u32,
    freq: u16,
    pulse_width: u16,
    waveform: u8,
    test: bool,
    ring_mod: bool,
    sync: bool,
    msb_rising: bool,
    noise_reseed: NoiseReseed,
    tables: &'static WaveformTables,
}

impl Oscillator {
    /// Create an oscillator for the given chip model
    pub fn new(model: ChipModel) -> Self {
        Self::with_noise_reseed(model, NoiseReseed::Classic)
    }

    /// Create an oscillator with a specific test-bit noise behaviour
    pub fn with_noise_reseed(model: ChipModel, noise_reseed: NoiseReseed) -> Self {
        let mut osc = Self {
            accumulator: 0,
            shift_register: NOISE_RESEED,
            freq: 0,
            pulse_width: 0,
            waveform: 0,
            test: false,
            ring_mod: false,
            sync: false,
            msb_rising: false,
            noise_reseed,
            tables: waveforms::tables(model),
        };
        osc.reset();
        osc
    }

    /// Select the combined waveform tables of a chip model
    pub fn set_chip_model(&mut self, model: ChipModel) {
        self.tables = waveforms::tables(model);
    }

    /// Reset to power-on state
    pub fn reset(&mut self) {
        self.accumulator = 0;
        self.shift_register = NOISE_RESEED;
        self.freq = 0;
        self.pulse_width = 0;
        self.waveform = 0;
        self.test = false;
        self.ring_mod = false;
        self.sync = false;
        self.msb_rising = false;
    }

    /// Write the frequency low byte
    pub fn write_freq_lo(&mut self, value: u8) {
        self.freq = (self.freq & 0xff00) | value as u16;
    }

    /// Write the frequency high byte
    pub fn write_freq_hi(&mut self, value: u8) {
        self.freq = ((value as u16) << 8) | (self.freq & 0x00ff);
    }

    /// Write the pulse width low byte
    pub fn write_pw_lo(&mut self, value: u8) {
        self.pulse_width = (self.pulse_width & 0x0f00) | value as u16;
    }

    /// Write the pulse width high nibble
    pub fn write_pw_hi(&mut self, value: u8) {
        self.pulse_width = (((value as u16) << 8) & 0x0f00) | (self.pulse_width & 0x00ff);
    }

    /// Write the waveform part of a voice control register
    ///
    /// Setting the test bit holds the accumulator at zero. With
    /// [`NoiseReseed::Classic`] the shift register is cleared as well and is
    /// reloaded with 0x7FFFF8 when the test bit is released.
    pub fn write_control(&mut self, value: u8) {
        let control = ControlFlags::from_bits_retain(value);
        let test_next = control.contains(ControlFlags::TEST);

        self.waveform = control.waveform();
        self.ring_mod = control.contains(ControlFlags::RING_MOD);
        self.sync = control.contains(ControlFlags::SYNC);

        match self.noise_reseed {
            NoiseReseed::Classic => {
                if test_next {
                    self.accumulator = 0;
                    self.shift_register = 0;
                } else if self.test {
                    self.shift_register = NOISE_RESEED;
                }
            }
            NoiseReseed::Saturating => {
                if test_next {
                    self.accumulator = 0;
                    self.shift_register = SHIFT_REGISTER_MASK;
                }
            }
        }

        self.test = test_next;
    }

    /// Advance one cycle
    #[inline]
    pub fn clock(&mut self) {
        if self.test {
            return;
        }

        let previous = self.accumulator;
        self.accumulator = (self.accumulator + self.freq as u32) & ACCUMULATOR_MASK;

        self.msb_rising = previous & ACCUMULATOR_MSB == 0 && self.accumulator & ACCUMULATOR_MSB != 0;

        if previous & NOISE_CLOCK_BIT == 0 && self.accumulator & NOISE_CLOCK_BIT != 0 {
            self.shift_noise();
        }
    }

    /// Advance `delta` cycles in one go
    ///
    /// Produces the same accumulator, shift register and `msb_rising` as
    /// `delta` calls to [`clock`](Self::clock). The shift register is
    /// stepped once for every bit 19 rising edge passed, counted back from
    /// the final accumulator value.
    pub fn clock_delta(&mut self, delta: u32) {
        if self.test || delta == 0 {
            return;
        }

        let mut delta_accumulator = delta as u64 * self.freq as u64;
        self.accumulator =
            ((self.accumulator as u64 + delta_accumulator) & ACCUMULATOR_MASK as u64) as u32;

        let previous = self.accumulator.wrapping_sub(self.freq as u32) & ACCUMULATOR_MASK;
        self.msb_rising = previous & ACCUMULATOR_MSB == 0 && self.accumulator & ACCUMULATOR_MSB != 0;

        // Bit 19 rises exactly once in every 0x100000 of accumulator travel
        let mut shift_period: u64 = 0x100000;
        while delta_accumulator != 0 {
            if delta_accumulator < shift_period {
                shift_period = delta_accumulator;
                let start = self.accumulator.wrapping_sub(shift_period as u32);
                let start_high = start & NOISE_CLOCK_BIT != 0;
                let end_high = self.accumulator & NOISE_CLOCK_BIT != 0;
                if shift_period <= 0x80000 {
                    if start_high || !end_high {
                        break;
                    }
                } else if start_high && !end_high {
                    break;
                }
            }

            self.shift_noise();
            delta_accumulator -= shift_period;
        }
    }

    #[inline]
    fn shift_noise(&mut self) {
        let bit0 = ((self.shift_register >> 22) ^ (self.shift_register >> 17)) & 0x1;
        self.shift_register = ((self.shift_register << 1) & SHIFT_REGISTER_MASK) | bit0;
    }

    /// Whether this oscillator's MSB edge resets `destination` this cycle
    ///
    /// A destination that is itself being synced by this oscillator's own
    /// source on the same cycle does not get reset (the two edges cancel).
    #[inline]
    pub fn syncs(&self, destination: &Oscillator, own_source: &Oscillator) -> bool {
        self.msb_rising && destination.sync && !(self.sync && own_source.msb_rising)
    }

    /// Zero the accumulator (hard sync)
    #[inline]
    pub fn hard_sync(&mut self) {
        self.accumulator = 0;
    }

    /// Whether this oscillator drives a hard sync on `destination`
    #[inline]
    pub fn is_sync_source_for(&self, destination: &Oscillator) -> bool {
        destination.sync && self.freq != 0
    }

    /// Cycles until the accumulator MSB next toggles
    ///
    /// Only meaningful for a non-zero frequency.
    #[inline]
    pub fn cycles_to_msb_toggle(&self) -> u32 {
        let target = if self.accumulator & ACCUMULATOR_MSB != 0 {
            0x1000000
        } else {
            0x800000
        };
        let distance = target - self.accumulator;
        let freq = (self.freq as u32).max(1);
        distance.div_ceil(freq)
    }

    #[inline]
    fn triangle(&self, sync_source: &Oscillator) -> u16 {
        let phase = if self.ring_mod {
            self.accumulator ^ sync_source.accumulator
        } else {
            self.accumulator
        };
        let folded = if phase & ACCUMULATOR_MSB != 0 {
            !self.accumulator
        } else {
            self.accumulator
        };
        ((folded >> 11) & 0xfff) as u16
    }

    #[inline]
    fn sawtooth(&self) -> u16 {
        (self.accumulator >> 12) as u16
    }

    #[inline]
    fn pulse(&self) -> u16 {
        if self.test || (self.accumulator >> 12) as u16 >= self.pulse_width {
            0xfff
        } else {
            0x000
        }
    }

    #[inline]
    fn noise(&self) -> u16 {
        let sr = self.shift_register;
        (((sr & 0x400000) >> 11)
            | ((sr & 0x100000) >> 10)
            | ((sr & 0x010000) >> 7)
            | ((sr & 0x002000) >> 5)
            | ((sr & 0x000800) >> 4)
            | ((sr & 0x000080) >> 1)
            | ((sr & 0x000010) << 1)
            | ((sr & 0x000004) << 2)) as u16
    }

    /// 12-bit waveform output
    ///
    /// `sync_source` is the previous oscillator in the ring; its MSB is
    /// used for ring modulation of the triangle.
    #[inline]
    pub fn output(&self, sync_source: &Oscillator) -> u16 {
        match self.waveform {
            0x1 => self.triangle(sync_source),
            0x2 => self.sawtooth(),
            0x3 => self.tables.saw_triangle(self.sawtooth()),
            0x4 => self.pulse(),
            0x5 => self.tables.pulse_triangle(self.triangle(sync_source)) & self.pulse(),
            0x6 => self.tables.pulse_saw(self.sawtooth()) & self.pulse(),
            0x7 => self.tables.pulse_saw_triangle(self.sawtooth()) & self.pulse(),
            0x8 => self.noise(),
            // Nothing selected, or noise combined with anything else
            _ => 0,
        }
    }

    /// Upper 8 bits of the waveform output (OSC3 register)
    #[inline]
    pub fn read_osc(&self, sync_source: &Oscillator) -> u8 {
        (self.output(sync_source) >> 4) as u8
    }

    /// Phase accumulator
    pub fn accumulator(&self) -> u32 {
        self.accumulator
    }

    /// Noise shift register
    pub fn shift_register(&self) -> u32 {
        self.shift_register
    }

    /// Frequency register
    pub fn freq(&self) -> u16 {
        self.freq
    }

    /// Pulse width register
    pub fn pulse_width(&self) -> u16 {
        self.pulse_width
    }

    /// Whether the MSB rose on the last clock
    pub fn msb_rising(&self) -> bool {
        self.msb_rising
    }

    /// Whether hard sync is enabled
    pub fn sync_enabled(&self) -> bool {
        self.sync
    }

    /// Whether the test bit is set
    pub fn test(&self) -> bool {
        self.test
    }

    /// Capture every mutable field
    pub fn read_state(&self) -> OscillatorState {
        OscillatorState {
            accumulator: self.accumulator,
            shift_register: self.shift_register,
            freq: self.freq,
            pulse_width: self.pulse_width,
            waveform: self.waveform,
            test: self.test,
            ring_mod: self.ring_mod,
            sync: self.sync,
            msb_rising: self.msb_rising,
        }
    }

    /// Restore every mutable field; values are masked to register width
    pub fn write_state(&mut self, state: &OscillatorState) {
        self.accumulator = state.accumulator & ACCUMULATOR_MASK;
        self.shift_register = state.shift_register & SHIFT_REGISTER_MASK;
        self.freq = state.freq;
        self.pulse_width = state.pulse_width & 0x0fff;
        self.waveform = state.waveform & 0x0f;
        self.test = state.test;
        self.ring_mod = state.ring_mod;
        self.sync = state.sync;
        self.msb_rising = state.msb_rising;
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new(ChipModel::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn osc_with_freq(freq: u16) -> Oscillator {
        let mut osc = Oscillator::default();
        osc.write_freq_lo((freq & 0xff) as u8);
        osc.write_freq_hi((freq >> 8) as u8);
        osc
    }

    #[test]
    fn test_accumulator_wraps() {
        let mut osc = osc_with_freq(0xffff);
        for _ in 0..300 {
            osc.clock();
        }
        assert_eq!(osc.accumulator(), (300 * 0xffff) & 0xffffff);
    }

    #[test]
    fn test_test_bit_freezes_accumulator() {
        let mut osc = osc_with_freq(0x1234);
        for _ in 0..1000 {
            osc.clock();
        }
        osc.write_control(0x08);
        assert_eq!(osc.accumulator(), 0);
        for _ in 0..1000 {
            osc.clock();
        }
        osc.clock_delta(5000);
        assert_eq!(osc.accumulator(), 0);
    }

    #[test]
    fn test_test_bit_release_reseeds_noise() {
        let mut osc = osc_with_freq(0x8000);
        osc.write_control(0x80);
        for _ in 0..10_000 {
            osc.clock();
        }
        assert_ne!(osc.shift_register(), NOISE_RESEED);
        osc.write_control(0x88);
        assert_eq!(osc.shift_register(), 0);
        osc.write_control(0x80);
        assert_eq!(osc.shift_register(), 0x7ffff8);
    }

    #[test]
    fn test_saturating_noise_reseed() {
        let mut osc = Oscillator::with_noise_reseed(ChipModel::Mos6581, NoiseReseed::Saturating);
        osc.write_control(0x88);
        assert_eq!(osc.shift_register(), 0x7fffff);
        osc.write_control(0x80);
        assert_eq!(osc.shift_register(), 0x7fffff);
        assert_eq!(osc.output(&Oscillator::default()), 0xff0);
    }

    #[test]
    fn test_msb_rising_flag() {
        let mut osc = osc_with_freq(0x8000);
        // 0x800000 / 0x8000 = 256 cycles to the first MSB rise
        for _ in 0..255 {
            osc.clock();
            assert!(!osc.msb_rising());
        }
        osc.clock();
        assert!(osc.msb_rising());
        osc.clock();
        assert!(!osc.msb_rising());
    }

    #[test]
    fn test_clock_delta_matches_single_steps() {
        for &(freq, cycles) in &[(0x0001u16, 70_000u32), (0x1234, 12_345), (0xffff, 100_000), (0x8000, 32)] {
            let mut a = osc_with_freq(freq);
            let mut b = osc_with_freq(freq);
            for _ in 0..cycles {
                a.clock();
            }
            b.clock_delta(cycles);
            assert_eq!(a.read_state(), b.read_state(), "freq {freq:#06x}");
        }
    }

    #[test]
    fn test_sawtooth_and_pulse_outputs() {
        let src = Oscillator::default();
        let mut osc = osc_with_freq(0x1000);
        osc.write_pw_lo(0x00);
        osc.write_pw_hi(0x08);
        osc.write_control(0x20);
        osc.clock_delta(0x400);
        assert_eq!(osc.accumulator(), 0x400000);
        assert_eq!(osc.output(&src), 0x400);

        osc.write_control(0x40);
        assert_eq!(osc.output(&src), 0x000);
        osc.clock_delta(0x400);
        assert_eq!(osc.output(&src), 0xfff);
    }

    #[test]
    fn test_triangle_folds_and_ring_modulates() {
        let mut src = Oscillator::default();
        let mut osc = osc_with_freq(0x1000);
        osc.write_control(0x10);
        osc.clock_delta(0x400); // acc = 0x400000
        assert_eq!(osc.output(&src), 0x800);
        osc.clock_delta(0x600); // acc = 0xa00000, falling half
        assert_eq!(osc.output(&src), (!0xa00000u32 >> 11) as u16 & 0xfff);

        // Ring modulation inverts the fold when the source MSB is set
        osc.write_control(0x14);
        src.write_state(&OscillatorState {
            accumulator: 0x800000,
            ..OscillatorState::default()
        });
        assert_eq!(osc.output(&src), ((0xa00000u32 >> 11) & 0xfff) as u16);
    }

    #[test]
    fn test_noise_combined_is_silent() {
        let src = Oscillator::default();
        let mut osc = osc_with_freq(0x4000);
        osc.clock_delta(1000);
        for waveform in [0x9u8, 0xa, 0xc, 0xf] {
            osc.write_control(waveform << 4);
            assert_eq!(osc.output(&src), 0);
        }
    }

    #[test]
    fn test_pulse_forced_high_under_test() {
        let src = Oscillator::default();
        let mut osc = Oscillator::default();
        osc.write_pw_hi(0x0f);
        osc.write_control(0x48);
        assert_eq!(osc.output(&src), 0xfff);
        assert_eq!(osc.read_osc(&src), 0xff);
    }

    #[test]
    fn test_cycles_to_msb_toggle() {
        let mut osc = osc_with_freq(0x1000);
        assert_eq!(osc.cycles_to_msb_toggle(), 0x800);
        osc.clock_delta(0x800);
        assert_eq!(osc.cycles_to_msb_toggle(), 0x800);
        osc.write_freq_lo(0x01);
        osc.clock();
        assert_eq!(osc.cycles_to_msb_toggle(), (0x800000 - 0x1001 + 0x1000) / 0x1001);
    }
}
