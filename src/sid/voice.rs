//! Voice = oscillator x envelope
//!
//! The waveform DAC output is offset by the model's zero level, multiplied
//! by the envelope and shifted by the voice DC level, giving a 20-bit signed
//! value.

use serde::{Deserialize, Serialize};

use super::envelope::{Envelope, EnvelopeState};
use super::oscillator::{Oscillator, OscillatorState};
use crate::config::{ChipModel, NoiseReseed};

/// Snapshot of one voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoiceState {
    /// Waveform generator
    pub oscillator: OscillatorState,
    /// Envelope generator
    pub envelope: EnvelopeState,
    /// Voice muted
    pub muted: bool,
}

/// One SID voice
#[derive(Clone, Debug)]
pub struct Voice {
    /// Waveform generator
    pub oscillator: Oscillator,
    /// Envelope generator
    pub envelope: Envelope,
    muted: bool,
    wave_zero: i32,
    voice_dc: i32,
}

impl Voice {
    /// Create a voice for the given chip model
    pub fn new(model: ChipModel, noise_reseed: NoiseReseed) -> Self {
        Self {
            oscillator: Oscillator::with_noise_reseed(model, noise_reseed),
            envelope: Envelope::new(),
            muted: false,
            wave_zero: model.wave_zero(),
            voice_dc: model.voice_dc(),
        }
    }

    /// Switch the DAC levels and waveform tables to another model
    pub fn set_chip_model(&mut self, model: ChipModel) {
        self.oscillator.set_chip_model(model);
        self.wave_zero = model.wave_zero();
        self.voice_dc = model.voice_dc();
    }

    /// Write the control register (waveform and gate)
    pub fn write_control(&mut self, value: u8) {
        self.oscillator.write_control(value);
        self.envelope.write_control(value);
    }

    /// Reset oscillator and envelope
    pub fn reset(&mut self) {
        self.oscillator.reset();
        self.envelope.reset();
    }

    /// Mute or unmute the voice; a muted voice outputs only its DC level
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Whether the voice is muted
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// 20-bit signed voice output
    #[inline]
    pub fn output(&self, sync_source: &Oscillator) -> i32 {
        if self.muted {
            return self.voice_dc;
        }
        (self.oscillator.output(sync_source) as i32 - self.wave_zero)
            * self.envelope.output() as i32
            + self.voice_dc
    }

    /// Capture every mutable field
    pub fn read_state(&self) -> VoiceState {
        VoiceState {
            oscillator: self.oscillator.read_state(),
            envelope: self.envelope.read_state(),
            muted: self.muted,
        }
    }

    /// Restore every mutable field
    pub fn write_state(&mut self, state: &VoiceState) {
        self.oscillator.write_state(&state.oscillator);
        self.envelope.write_state(&state.envelope);
        self.muted = state.muted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_voice_outputs_dc() {
        let src = Oscillator::default();
        let voice = Voice::new(ChipModel::Mos6581, NoiseReseed::Classic);
        assert_eq!(voice.output(&src), 0x800 * 0xff);

        let voice = Voice::new(ChipModel::Mos8580, NoiseReseed::Classic);
        assert_eq!(voice.output(&src), 0);
    }

    #[test]
    fn test_full_scale_output() {
        let src = Oscillator::default();
        let mut voice = Voice::new(ChipModel::Mos8580, NoiseReseed::Classic);
        voice.write_control(0x49); // Pulse + test + gate: pulse forced high
        voice.envelope.clock_delta(9 * 0xff);
        assert_eq!(voice.envelope.output(), 0xff);
        assert_eq!(voice.output(&src), (0xfff - 0x800) * 0xff);
    }

    #[test]
    fn test_mute_keeps_dc_only() {
        let src = Oscillator::default();
        let mut voice = Voice::new(ChipModel::Mos6581, NoiseReseed::Classic);
        voice.write_control(0x49);
        voice.envelope.clock_delta(9 * 0xff);
        assert_ne!(voice.output(&src), 0x800 * 0xff);
        voice.set_muted(true);
        assert!(voice.is_muted());
        assert_eq!(voice.output(&src), 0x800 * 0xff);
    }

    #[test]
    fn test_model_switch_changes_levels() {
        let src = Oscillator::default();
        let mut voice = Voice::new(ChipModel::Mos6581, NoiseReseed::Classic);
        voice.set_chip_model(ChipModel::Mos8580);
        assert_eq!(voice.output(&src), 0);
    }
}
