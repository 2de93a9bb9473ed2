//! Backend trait abstraction for SID chip implementations
//!
//! Players and trackers drive a SID through this interface, so a
//! cycle-exact emulation can be swapped for another implementation without
//! touching the player.

use crate::config::ChipModel;
use crate::sid::Sid;

/// Common interface for SID chip backends
///
/// # Example
///
/// ```
/// use sid6581::{ChipModel, Sid, SidBackend};
///
/// fn play_note<B: SidBackend>(chip: &mut B) -> i16 {
///     chip.write_register(0x18, 0x0F); // Volume
///     chip.write_register(0x01, 0x1C); // Voice 1 frequency high
///     chip.write_register(0x06, 0xF0); // Sustain 15
///     chip.write_register(0x04, 0x11); // Triangle + gate
///
///     chip.clock_delta(1_000);
///     chip.output()
/// }
///
/// let mut sid = Sid::new(ChipModel::Mos8580);
/// play_note(&mut sid);
/// ```
pub trait SidBackend: Send {
    /// Create a backend instance emulating `model`
    fn with_model(model: ChipModel) -> Self
    where
        Self: Sized;

    /// Reset the backend to power-on state
    fn reset(&mut self);

    /// Write to a SID register
    ///
    /// # Arguments
    ///
    /// * `addr` - Register address (masked to 0x00-0x1F)
    /// * `value` - Register value
    fn write_register(&mut self, addr: u8, value: u8);

    /// Read from a SID register
    ///
    /// Write-only registers return the fading value on the data bus.
    fn read_register(&self, addr: u8) -> u8;

    /// Load the 25 write registers in address order
    fn load_registers(&mut self, regs: &[u8; 0x19]) {
        for (addr, &value) in regs.iter().enumerate() {
            self.write_register(addr as u8, value);
        }
    }

    /// Advance the chip by one clock cycle
    fn clock(&mut self);

    /// Advance the chip by `delta` clock cycles
    fn clock_delta(&mut self, delta: u32) {
        for _ in 0..delta {
            self.clock();
        }
    }

    /// Current chip output as a signed 16-bit sample
    fn output(&self) -> i16;

    /// Clock up to `*delta` cycles and write audio samples into `buffer`
    ///
    /// # Returns
    ///
    /// Number of samples written; unconsumed cycles stay in `delta`
    fn render(&mut self, delta: &mut u32, buffer: &mut [i16], stride: usize) -> usize;

    /// Mute or unmute a voice
    ///
    /// # Arguments
    ///
    /// * `channel` - Voice index (0-2)
    /// * `mute` - true to mute, false to unmute
    fn set_channel_mute(&mut self, channel: usize, mute: bool);

    /// Check if a voice is muted
    fn is_channel_muted(&self, channel: usize) -> bool;
}

impl SidBackend for Sid {
    fn with_model(model: ChipModel) -> Self {
        Sid::new(model)
    }

    fn reset(&mut self) {
        Sid::reset(self)
    }

    fn write_register(&mut self, addr: u8, value: u8) {
        self.write(addr, value)
    }

    fn read_register(&self, addr: u8) -> u8 {
        self.read(addr)
    }

    fn clock(&mut self) {
        Sid::clock(self)
    }

    fn clock_delta(&mut self, delta: u32) {
        Sid::clock_delta(self, delta)
    }

    fn output(&self) -> i16 {
        Sid::output(self)
    }

    fn render(&mut self, delta: &mut u32, buffer: &mut [i16], stride: usize) -> usize {
        let max_samples = buffer.len();
        Sid::render(self, delta, buffer, max_samples, stride)
    }

    fn set_channel_mute(&mut self, channel: usize, mute: bool) {
        self.set_voice_mute(channel, mute)
    }

    fn is_channel_muted(&self, channel: usize) -> bool {
        self.is_voice_muted(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive<B: SidBackend>(chip: &mut B) -> u8 {
        let mut regs = [0u8; 0x19];
        regs[0x0f] = 0x10; // Voice 3 frequency high
        regs[0x12] = 0x21;
        regs[0x14] = 0xf0;
        regs[0x18] = 0x0f;
        chip.load_registers(&regs);
        chip.clock_delta(100);
        chip.read_register(0x1c)
    }

    #[test]
    fn test_generic_backend() {
        let mut sid = <Sid as SidBackend>::with_model(ChipModel::Mos6581);
        assert!(drive(&mut sid) > 0);

        sid.set_channel_mute(2, true);
        assert!(sid.is_channel_muted(2));
        assert!(!sid.is_channel_muted(3));

        SidBackend::reset(&mut sid);
        assert_eq!(sid.read_register(0x1c), 0);
    }

    #[test]
    fn test_render_fills_buffer() {
        let mut sid = Sid::new(ChipModel::Mos8580);
        let mut buffer = [0i16; 16];
        let mut delta = 100_000;
        let written = SidBackend::render(&mut sid, &mut delta, &mut buffer, 1);
        assert_eq!(written, 16);
        assert!(delta > 0);
    }
}
