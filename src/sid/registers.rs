//! SID Register Definitions
//!
//! 25 write-only registers (three blocks of seven per voice plus four filter
//! registers) followed by four read-only registers.

use std::fmt;

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

/// SID register address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
pub enum Register {
    /// Voice 1 frequency (low byte) - $00
    Freq1Lo = 0x00,
    /// Voice 1 frequency (high byte) - $01
    Freq1Hi = 0x01,
    /// Voice 1 pulse width (low byte) - $02
    Pw1Lo = 0x02,
    /// Voice 1 pulse width (high nibble) - $03
    Pw1Hi = 0x03,
    /// Voice 1 control - $04
    Control1 = 0x04,
    /// Voice 1 attack/decay - $05
    AttackDecay1 = 0x05,
    /// Voice 1 sustain/release - $06
    SustainRelease1 = 0x06,
    /// Voice 2 frequency (low byte) - $07
    Freq2Lo = 0x07,
    /// Voice 2 frequency (high byte) - $08
    Freq2Hi = 0x08,
    /// Voice 2 pulse width (low byte) - $09
    Pw2Lo = 0x09,
    /// Voice 2 pulse width (high nibble) - $0A
    Pw2Hi = 0x0A,
    /// Voice 2 control - $0B
    Control2 = 0x0B,
    /// Voice 2 attack/decay - $0C
    AttackDecay2 = 0x0C,
    /// Voice 2 sustain/release - $0D
    SustainRelease2 = 0x0D,
    /// Voice 3 frequency (low byte) - $0E
    Freq3Lo = 0x0E,
    /// Voice 3 frequency (high byte) - $0F
    Freq3Hi = 0x0F,
    /// Voice 3 pulse width (low byte) - $10
    Pw3Lo = 0x10,
    /// Voice 3 pulse width (high nibble) - $11
    Pw3Hi = 0x11,
    /// Voice 3 control - $12
    Control3 = 0x12,
    /// Voice 3 attack/decay - $13
    AttackDecay3 = 0x13,
    /// Voice 3 sustain/release - $14
    SustainRelease3 = 0x14,
    /// Filter cutoff (low 3 bits) - $15
    CutoffLo = 0x15,
    /// Filter cutoff (high 8 bits) - $16
    CutoffHi = 0x16,
    /// Resonance and filter routing - $17
    ResonanceRouting = 0x17,
    /// Filter mode and master volume - $18
    ModeVolume = 0x18,
    /// Paddle X (read only) - $19
    PotX = 0x19,
    /// Paddle Y (read only) - $1A
    PotY = 0x1A,
    /// Voice 3 oscillator snapshot (read only) - $1B
    Osc3 = 0x1B,
    /// Voice 3 envelope snapshot (read only) - $1C
    Env3 = 0x1C,
}

/// Registers per voice block
pub const VOICE_REGISTER_STRIDE: u8 = 7;

/// Number of writable registers
pub const NUM_WRITE_REGISTERS: usize = 0x19;

/// Per-voice register within a voice block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceRegister {
    /// Frequency low byte
    FreqLo,
    /// Frequency high byte
    FreqHi,
    /// Pulse width low byte
    PwLo,
    /// Pulse width high nibble
    PwHi,
    /// Control register
    Control,
    /// Attack/decay
    AttackDecay,
    /// Sustain/release
    SustainRelease,
}

impl Register {
    /// Convert a raw register address to a Register
    ///
    /// Addresses mirror every 32 bytes, as the chip only decodes five
    /// address lines. Addresses 0x1D-0x1F are unused.
    pub fn from_addr(addr: u8) -> Option<Self> {
        Register::from_u8(addr & 0x1F)
    }

    /// Get the register address value
    pub fn addr(&self) -> u8 {
        *self as u8
    }

    /// Split a voice register into (voice index, register within block)
    pub fn voice_register(&self) -> Option<(usize, VoiceRegister)> {
        let addr = self.addr();
        if addr >= 0x15 {
            return None;
        }
        let voice = (addr / VOICE_REGISTER_STRIDE) as usize;
        let reg = match addr % VOICE_REGISTER_STRIDE {
            0 => VoiceRegister::FreqLo,
            1 => VoiceRegister::FreqHi,
            2 => VoiceRegister::PwLo,
            3 => VoiceRegister::PwHi,
            4 => VoiceRegister::Control,
            5 => VoiceRegister::AttackDecay,
            _ => VoiceRegister::SustainRelease,
        };
        Some((voice, reg))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((voice, reg)) = self.voice_register() {
            let name = match reg {
                VoiceRegister::FreqLo => "Frequency Low",
                VoiceRegister::FreqHi => "Frequency High",
                VoiceRegister::PwLo => "Pulse Width Low",
                VoiceRegister::PwHi => "Pulse Width High",
                VoiceRegister::Control => "Control",
                VoiceRegister::AttackDecay => "Attack/Decay",
                VoiceRegister::SustainRelease => "Sustain/Release",
            };
            return write!(f, "${:02X} (Voice {} {})", self.addr(), voice + 1, name);
        }
        match self {
            Register::CutoffLo => write!(f, "$15 (Filter Cutoff Low)"),
            Register::CutoffHi => write!(f, "$16 (Filter Cutoff High)"),
            Register::ResonanceRouting => write!(f, "$17 (Resonance/Routing)"),
            Register::ModeVolume => write!(f, "$18 (Mode/Volume)"),
            Register::PotX => write!(f, "$19 (Paddle X)"),
            Register::PotY => write!(f, "$1A (Paddle Y)"),
            Register::Osc3 => write!(f, "$1B (Oscillator 3)"),
            Register::Env3 => write!(f, "$1C (Envelope 3)"),
            _ => write!(f, "${:02X}", self.addr()),
        }
    }
}

bitflags! {
    /// Voice control register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ControlFlags: u8 {
        /// Envelope gate
        const GATE = 0x01;
        /// Hard sync to the previous voice
        const SYNC = 0x02;
        /// Ring modulate the triangle with the previous voice
        const RING_MOD = 0x04;
        /// Hold the oscillator at zero
        const TEST = 0x08;
        /// Triangle waveform
        const TRIANGLE = 0x10;
        /// Sawtooth waveform
        const SAWTOOTH = 0x20;
        /// Pulse waveform
        const PULSE = 0x40;
        /// Noise waveform
        const NOISE = 0x80;
    }
}

impl ControlFlags {
    /// Waveform selector nibble (T/S/P/N in bits 0-3)
    pub fn waveform(&self) -> u8 {
        self.bits() >> 4
    }
}

bitflags! {
    /// Filter routing bits of register $17
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FilterRouting: u8 {
        /// Voice 1 through the filter
        const VOICE1 = 0x01;
        /// Voice 2 through the filter
        const VOICE2 = 0x02;
        /// Voice 3 through the filter
        const VOICE3 = 0x04;
        /// External input through the filter
        const EXT_IN = 0x08;
    }
}

bitflags! {
    /// Filter output selection (bits 4-6 of register $18, shifted down)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FilterMode: u8 {
        /// Low-pass output
        const LOWPASS = 0x01;
        /// Band-pass output
        const BANDPASS = 0x02;
        /// High-pass output
        const HIGHPASS = 0x04;
    }
}

/// Voice 3 disconnect bit of register $18
pub const VOICE3_OFF: u8 = 0x80;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_conversion() {
        assert_eq!(Register::from_addr(0x00), Some(Register::Freq1Lo));
        assert_eq!(Register::from_addr(0x18), Some(Register::ModeVolume));
        assert_eq!(Register::from_addr(0x1C), Some(Register::Env3));
        assert_eq!(Register::from_addr(0x1D), None);
        assert_eq!(Register::from_addr(0x20), Some(Register::Freq1Lo)); // Mirrors
    }

    #[test]
    fn test_voice_register_split() {
        assert_eq!(
            Register::Control2.voice_register(),
            Some((1, VoiceRegister::Control))
        );
        assert_eq!(
            Register::SustainRelease3.voice_register(),
            Some((2, VoiceRegister::SustainRelease))
        );
        assert_eq!(Register::CutoffLo.voice_register(), None);
    }

    #[test]
    fn test_control_waveform_nibble() {
        let control = ControlFlags::from_bits_retain(0x41);
        assert!(control.contains(ControlFlags::GATE | ControlFlags::PULSE));
        assert_eq!(control.waveform(), 0x4);
    }

    #[test]
    fn test_register_display() {
        assert_eq!(
            Register::Freq2Hi.to_string(),
            "$08 (Voice 2 Frequency High)"
        );
        assert_eq!(Register::Osc3.to_string(), "$1B (Oscillator 3)");
    }
}
