//! ADSR envelope generator
//!
//! An 8-bit counter stepped by a 15-bit rate counter. Decay and release are
//! slowed down further by an exponential divider whose period changes at
//! fixed counter values. The rate counter is compared for equality only, so
//! lowering the period below the current count makes it run through the
//! full 15-bit range first (the "ADSR delay bug").

use serde::{Deserialize, Serialize};

use super::constants::{
    exponential_period_at, EXPONENTIAL_PERIODS, RATE_COUNTER_MASK, RATE_COUNTER_PERIOD,
    SUSTAIN_LEVEL,
};
use crate::{Result, SidError};

/// Envelope phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnvelopePhase {
    /// Counting up to 0xFF
    Attack,
    /// Counting down to the sustain level and holding there
    DecaySustain,
    /// Counting down to zero
    #[default]
    Release,
}

/// Snapshot of every mutable envelope field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnvelopeState {
    /// Attack nibble
    pub attack: u8,
    /// Decay nibble
    pub decay: u8,
    /// Sustain nibble
    pub sustain: u8,
    /// Release nibble
    pub release: u8,
    /// Gate bit
    pub gate: bool,
    /// Current phase
    pub phase: EnvelopePhase,
    /// Envelope output
    pub envelope_counter: u8,
    /// 15-bit rate counter
    pub rate_counter: u16,
    /// Current rate counter period
    pub rate_period: u16,
    /// Exponential divider counter
    pub exponential_counter: u16,
    /// Exponential divider period
    pub exponential_counter_period: u16,
    /// Counter frozen at zero
    pub hold_zero: bool,
}

impl EnvelopeState {
    /// Check that both periods are ones the chip can actually be in
    ///
    /// # Errors
    ///
    /// `SnapshotError` for a rate period outside the rate table or an
    /// exponential divider period the divider never selects.
    pub fn validate(&self) -> Result<()> {
        if !RATE_COUNTER_PERIOD.contains(&self.rate_period) {
            return Err(SidError::SnapshotError(format!(
                "envelope rate period {} is not a rate table entry",
                self.rate_period
            )));
        }
        if !EXPONENTIAL_PERIODS.contains(&self.exponential_counter_period) {
            return Err(SidError::SnapshotError(format!(
                "exponential divider period {} is out of range",
                self.exponential_counter_period
            )));
        }
        Ok(())
    }
}

/// SID ADSR envelope generator
#[derive(Clone, Debug)]
pub struct Envelope {
    attack: u8,
    decay: u8,
    sustain: u8,
    release: u8,
    gate: bool,
    phase: EnvelopePhase,
    envelope_counter: u8,
    rate_counter: u16,
    rate_period: u16,
    exponential_counter: u16,
    exponential_counter_period: u16,
    hold_zero: bool,
}

impl Envelope {
    /// Create an envelope in the released, silent state
    pub fn new() -> Self {
        let mut env = Self {
            attack: 0,
            decay: 0,
            sustain: 0,
            release: 0,
            gate: false,
            phase: EnvelopePhase::Release,
            envelope_counter: 0,
            rate_counter: 0,
            rate_period: 0,
            exponential_counter: 0,
            exponential_counter_period: 1,
            hold_zero: true,
        };
        env.reset();
        env
    }

    /// Reset to power-on state
    pub fn reset(&mut self) {
        self.envelope_counter = 0;
        self.attack = 0;
        self.decay = 0;
        self.sustain = 0;
        self.release = 0;
        self.gate = false;
        self.rate_counter = 0;
        self.exponential_counter = 0;
        self.exponential_counter_period = 1;
        self.phase = EnvelopePhase::Release;
        self.rate_period = RATE_COUNTER_PERIOD[self.release as usize];
        self.hold_zero = true;
    }

    /// Write the gate part of a voice control register
    pub fn write_control(&mut self, value: u8) {
        let gate_next = value & 0x01 != 0;

        if !self.gate && gate_next {
            self.phase = EnvelopePhase::Attack;
            self.rate_period = RATE_COUNTER_PERIOD[self.attack as usize];
            self.hold_zero = false;
        } else if self.gate && !gate_next {
            self.phase = EnvelopePhase::Release;
            self.rate_period = RATE_COUNTER_PERIOD[self.release as usize];
        }

        self.gate = gate_next;
    }

    /// Write the attack/decay register
    pub fn write_attack_decay(&mut self, value: u8) {
        self.attack = (value >> 4) & 0x0f;
        self.decay = value & 0x0f;
        match self.phase {
            EnvelopePhase::Attack => {
                self.rate_period = RATE_COUNTER_PERIOD[self.attack as usize];
            }
            EnvelopePhase::DecaySustain => {
                self.rate_period = RATE_COUNTER_PERIOD[self.decay as usize];
            }
            EnvelopePhase::Release => {}
        }
    }

    /// Write the sustain/release register
    pub fn write_sustain_release(&mut self, value: u8) {
        self.sustain = (value >> 4) & 0x0f;
        self.release = value & 0x0f;
        if self.phase == EnvelopePhase::Release {
            self.rate_period = RATE_COUNTER_PERIOD[self.release as usize];
        }
    }

    /// Advance one cycle
    #[inline]
    pub fn clock(&mut self) {
        self.rate_counter = self.rate_counter.wrapping_add(1);
        if self.rate_counter & 0x8000 != 0 {
            self.rate_counter = self.rate_counter.wrapping_add(1) & RATE_COUNTER_MASK;
        }

        if self.rate_counter != self.rate_period {
            return;
        }
        self.rate_counter = 0;

        self.step();
    }

    /// Advance `delta` cycles in one go, identical to `delta` single clocks
    pub fn clock_delta(&mut self, mut delta: u32) {
        if self.rate_period == 0 {
            // Never matched: the counter cycles through 1..=0x7FFF
            if delta != 0 {
                let period = RATE_COUNTER_MASK as u64;
                let counter = self.rate_counter as u64 + delta as u64 - 1;
                self.rate_counter = (counter % period + 1) as u16;
            }
            return;
        }

        let mut rate_step = self.rate_period as i32 - self.rate_counter as i32;
        if rate_step <= 0 {
            rate_step += RATE_COUNTER_MASK as i32;
        }

        while delta != 0 {
            if delta < rate_step as u32 {
                let mut counter = self.rate_counter as u32 + delta;
                if counter & 0x8000 != 0 {
                    counter = (counter + 1) & RATE_COUNTER_MASK as u32;
                }
                self.rate_counter = counter as u16;
                return;
            }

            self.rate_counter = 0;
            delta -= rate_step as u32;

            self.step();
            rate_step = self.rate_period as i32;
        }
    }

    /// One rate counter period has elapsed
    #[inline]
    fn step(&mut self) {
        if self.phase != EnvelopePhase::Attack {
            self.exponential_counter = self.exponential_counter.wrapping_add(1);
            if self.exponential_counter != self.exponential_counter_period {
                return;
            }
        }
        self.exponential_counter = 0;

        if self.hold_zero {
            return;
        }

        match self.phase {
            EnvelopePhase::Attack => {
                self.envelope_counter = self.envelope_counter.wrapping_add(1);
                if self.envelope_counter == 0xff {
                    self.phase = EnvelopePhase::DecaySustain;
                    self.rate_period = RATE_COUNTER_PERIOD[self.decay as usize];
                }
            }
            EnvelopePhase::DecaySustain => {
                if self.envelope_counter != SUSTAIN_LEVEL[self.sustain as usize] {
                    self.envelope_counter = self.envelope_counter.wrapping_sub(1);
                }
            }
            EnvelopePhase::Release => {
                self.envelope_counter = self.envelope_counter.wrapping_sub(1);
            }
        }

        if let Some(period) = exponential_period_at(self.envelope_counter) {
            self.exponential_counter_period = period as u16;
            if self.envelope_counter == 0 {
                self.hold_zero = true;
            }
        }
    }

    /// 8-bit envelope output
    #[inline]
    pub fn output(&self) -> u8 {
        self.envelope_counter
    }

    /// ENV3 register value
    #[inline]
    pub fn read_env(&self) -> u8 {
        self.envelope_counter
    }

    /// Current phase
    pub fn phase(&self) -> EnvelopePhase {
        self.phase
    }

    /// Current rate counter period
    pub fn rate_period(&self) -> u16 {
        self.rate_period
    }

    /// Capture every mutable field
    pub fn read_state(&self) -> EnvelopeState {
        EnvelopeState {
            attack: self.attack,
            decay: self.decay,
            sustain: self.sustain,
            release: self.release,
            gate: self.gate,
            phase: self.phase,
            envelope_counter: self.envelope_counter,
            rate_counter: self.rate_counter,
            rate_period: self.rate_period,
            exponential_counter: self.exponential_counter,
            exponential_counter_period: self.exponential_counter_period,
            hold_zero: self.hold_zero,
        }
    }

    /// Restore every mutable field; values are masked to register width
    ///
    /// Callers check the state with [`EnvelopeState::validate`] first.
    pub fn write_state(&mut self, state: &EnvelopeState) {
        self.attack = state.attack & 0x0f;
        self.decay = state.decay & 0x0f;
        self.sustain = state.sustain & 0x0f;
        self.release = state.release & 0x0f;
        self.gate = state.gate;
        self.phase = state.phase;
        self.envelope_counter = state.envelope_counter;
        self.rate_counter = state.rate_counter & RATE_COUNTER_MASK;
        self.rate_period = state.rate_period & RATE_COUNTER_MASK;
        self.exponential_counter = state.exponential_counter;
        self.exponential_counter_period = state.exponential_counter_period;
        self.hold_zero = state.hold_zero;
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_state() {
        let env = Envelope::new();
        assert_eq!(env.output(), 0);
        assert_eq!(env.phase(), EnvelopePhase::Release);
        assert_eq!(env.rate_period(), RATE_COUNTER_PERIOD[0]);
    }

    #[test]
    fn test_attack_timing_from_zero_adsr() {
        let mut env = Envelope::new();
        env.write_control(0x01);
        assert_eq!(env.phase(), EnvelopePhase::Attack);

        // Attack 0: one step every 9 cycles, no exponential divider
        for step in 1..=0xffu32 {
            for _ in 0..8 {
                env.clock();
            }
            assert_eq!(env.output() as u32, step - 1);
            env.clock();
            assert_eq!(env.output() as u32, step);
        }
        assert_eq!(env.phase(), EnvelopePhase::DecaySustain);
    }

    #[test]
    fn test_decay_stops_at_sustain_level() {
        let mut env = Envelope::new();
        env.write_attack_decay(0x00);
        env.write_sustain_release(0x80);
        env.write_control(0x01);
        env.clock_delta(2_000_000);
        assert_eq!(env.phase(), EnvelopePhase::DecaySustain);
        assert_eq!(env.output(), 0x88);
    }

    #[test]
    fn test_release_keeps_counter() {
        let mut env = Envelope::new();
        env.write_control(0x01);
        env.clock_delta(9 * 0x40);
        let level = env.output();
        assert_eq!(level, 0x40);

        env.write_control(0x00);
        assert_eq!(env.phase(), EnvelopePhase::Release);
        assert_eq!(env.output(), level);

        env.clock_delta(1_000_000);
        assert_eq!(env.output(), 0);
        env.clock_delta(1_000_000);
        assert_eq!(env.output(), 0);
    }

    #[test]
    fn test_rate_counter_wraparound_delay() {
        let mut env = Envelope::new();
        env.write_attack_decay(0xf0); // Slowest attack
        env.write_control(0x01);
        env.clock_delta(1000);

        // Switching to a faster rate below the current count waits for the
        // 15-bit counter to wrap before the first step
        env.write_attack_decay(0x00);
        env.clock_delta(0x7fff - 1000 - 1);
        assert_eq!(env.output(), 0);
        env.clock_delta(RATE_COUNTER_PERIOD[0] as u32 + 1);
        assert_eq!(env.output(), 1);
    }

    #[test]
    fn test_clock_delta_matches_single_steps() {
        let mut a = Envelope::new();
        let mut b = Envelope::new();
        for env in [&mut a, &mut b] {
            env.write_attack_decay(0x26);
            env.write_sustain_release(0x43);
            env.write_control(0x01);
        }
        for chunk in [1u32, 17, 300, 4096, 65_000, 250_000] {
            for _ in 0..chunk {
                a.clock();
            }
            b.clock_delta(chunk);
            assert_eq!(a.read_state(), b.read_state());
        }
        a.write_control(0x00);
        b.write_control(0x00);
        for _ in 0..500_000 {
            a.clock();
        }
        b.clock_delta(500_000);
        assert_eq!(a.read_state(), b.read_state());
    }

    #[test]
    fn test_gate_retrigger_clears_hold_zero() {
        let mut env = Envelope::new();
        env.clock_delta(100_000);
        assert_eq!(env.output(), 0);
        env.write_control(0x01);
        env.clock_delta(9);
        assert_eq!(env.output(), 1);
    }

    #[test]
    fn test_state_validation() {
        let mut env = Envelope::new();
        env.write_attack_decay(0x5a);
        env.write_control(0x01);
        env.clock_delta(5_000);
        let good = env.read_state();
        assert!(good.validate().is_ok());

        let mut bad = good;
        bad.rate_period = 0;
        assert!(matches!(bad.validate(), Err(SidError::SnapshotError(_))));
        bad.rate_period = 10;
        assert!(bad.validate().is_err());

        let mut bad = good;
        bad.exponential_counter_period = 3;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_zero_rate_period_never_steps() {
        let mut state = Envelope::new().read_state();
        state.phase = EnvelopePhase::Attack;
        state.hold_zero = false;
        state.rate_period = 0;

        let mut single = Envelope::new();
        single.write_state(&state);
        let mut bulk = single.clone();
        for _ in 0..70_000 {
            single.clock();
        }
        bulk.clock_delta(70_000);
        assert_eq!(single.read_state(), bulk.read_state());
        assert_eq!(bulk.output(), 0);
    }
}
