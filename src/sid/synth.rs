//! Chip core: voices, filter and output stage behind the register interface
//!
//! Everything that runs at the chip clock lives here; the sampling layer
//! sits on top and drives it through [`CycleSource`].

use super::constants::{BUS_VALUE_TTL, CUTOFF_STEPS, NUM_VOICES};
use super::external_filter::ExternalFilter;
use super::filter::Filter;
use super::registers::{Register, VoiceRegister, NUM_WRITE_REGISTERS};
use super::voice::Voice;
use crate::config::{ChipModel, SidOptions};
use crate::sampler::CycleSource;

/// Sync/ring-mod source of each voice: 0 <- 2, 1 <- 0, 2 <- 1
pub const SYNC_SOURCES: [usize; NUM_VOICES] = [2, 0, 1];

/// Divisor taking the output stage range down to 16 bits:
/// (4095 * 255 >> 7) * 3 voices * 15 volume * 2 / 65536
const OUTPUT_DIVISOR: i32 = ((4095 * 255) >> 7) * 3 * 15 * 2 / 65536;

/// Cycle-rate SID core
#[derive(Clone, Debug)]
pub struct Synth {
    pub(crate) model: ChipModel,
    pub(crate) voices: [Voice; NUM_VOICES],
    pub(crate) filter: Filter,
    pub(crate) external_filter: ExternalFilter,
    pub(crate) registers: [u8; NUM_WRITE_REGISTERS],
    pub(crate) bus_value: u8,
    pub(crate) bus_value_ttl: u32,
    pub(crate) ext_in: i32,
    pub(crate) sync_sources: [usize; NUM_VOICES],
    sync_destinations: [usize; NUM_VOICES],
}

impl Synth {
    /// Create a core for the given model and behavioural options
    pub fn new(model: ChipModel, options: SidOptions) -> Self {
        let voice = Voice::new(model, options.noise_reseed);
        let mut synth = Self {
            model,
            voices: [voice.clone(), voice.clone(), voice],
            filter: Filter::with_distortion(model, options.filter_distortion),
            external_filter: ExternalFilter::new(model),
            registers: [0; NUM_WRITE_REGISTERS],
            bus_value: 0,
            bus_value_ttl: 0,
            ext_in: 0,
            sync_sources: SYNC_SOURCES,
            sync_destinations: [0; NUM_VOICES],
        };
        synth.link_sync_ring(SYNC_SOURCES);
        synth
    }

    /// Install the sync ring; `sources[i]` is the voice that syncs voice i
    pub(crate) fn link_sync_ring(&mut self, sources: [usize; NUM_VOICES]) {
        self.sync_sources = sources;
        for (voice, &source) in sources.iter().enumerate() {
            self.sync_destinations[source] = voice;
        }
    }

    /// Switch chip model; the filter reverts to the factory cutoff curve
    pub fn set_chip_model(&mut self, model: ChipModel) {
        self.model = model;
        for voice in &mut self.voices {
            voice.set_chip_model(model);
        }
        self.filter.set_chip_model(model);
        self.external_filter.set_chip_model(model);
    }

    /// Install a filter cutoff table
    pub fn set_cutoff_table(&mut self, table: [i32; CUTOFF_STEPS]) {
        self.filter.set_cutoff_table(table);
    }

    /// Reset registers and all generator and filter state
    ///
    /// Chip model, mute flags, the external input and the sync ring are
    /// kept.
    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.reset();
        }
        self.filter.reset();
        self.external_filter.reset();
        self.registers = [0; NUM_WRITE_REGISTERS];
        self.bus_value = 0;
        self.bus_value_ttl = 0;
    }

    /// Write a register; the value also lands on the data bus
    pub fn write(&mut self, addr: u8, value: u8) {
        self.bus_value = value;
        self.bus_value_ttl = BUS_VALUE_TTL;

        let Some(register) = Register::from_addr(addr) else {
            return;
        };
        if let Some(shadow) = self.registers.get_mut(register.addr() as usize) {
            *shadow = value;
        }

        if let Some((index, reg)) = register.voice_register() {
            let voice = &mut self.voices[index];
            match reg {
                VoiceRegister::FreqLo => voice.oscillator.write_freq_lo(value),
                VoiceRegister::FreqHi => voice.oscillator.write_freq_hi(value),
                VoiceRegister::PwLo => voice.oscillator.write_pw_lo(value),
                VoiceRegister::PwHi => voice.oscillator.write_pw_hi(value),
                VoiceRegister::Control => voice.write_control(value),
                VoiceRegister::AttackDecay => voice.envelope.write_attack_decay(value),
                VoiceRegister::SustainRelease => voice.envelope.write_sustain_release(value),
            }
            return;
        }

        match register {
            Register::CutoffLo => self.filter.write_cutoff_lo(value),
            Register::CutoffHi => self.filter.write_cutoff_hi(value),
            Register::ResonanceRouting => self.filter.write_resonance_routing(value),
            Register::ModeVolume => self.filter.write_mode_volume(value),
            // Read-only registers only touch the bus
            _ => {}
        }
    }

    /// Read a register
    ///
    /// The paddle inputs read 0xFF, OSC3 and ENV3 read voice 3, and every
    /// other address returns the last value written while it is still on
    /// the bus.
    pub fn read(&self, addr: u8) -> u8 {
        match Register::from_addr(addr) {
            Some(Register::PotX | Register::PotY) => 0xff,
            Some(Register::Osc3) => {
                let source = &self.voices[self.sync_sources[2]].oscillator;
                self.voices[2].oscillator.read_osc(source)
            }
            Some(Register::Env3) => self.voices[2].envelope.read_env(),
            _ => self.bus_value,
        }
    }

    /// Feed a 16-bit external audio sample into the mixer
    pub fn set_external_input(&mut self, sample: i16) {
        // Scale to the 20-bit voice range
        self.ext_in = ((sample as i32) << 4) * 3;
    }

    #[inline]
    fn voice_output(&self, index: usize) -> i32 {
        let source = &self.voices[self.sync_sources[index]].oscillator;
        self.voices[index].output(source)
    }

    #[inline]
    fn synchronize(&mut self) {
        let mut resets = [false; NUM_VOICES];
        for (index, &destination) in self.sync_destinations.iter().enumerate() {
            let osc = &self.voices[index].oscillator;
            let own_source = &self.voices[self.sync_sources[index]].oscillator;
            if osc.syncs(&self.voices[destination].oscillator, own_source) {
                resets[destination] = true;
            }
        }
        for (voice, reset) in self.voices.iter_mut().zip(resets) {
            if reset {
                voice.oscillator.hard_sync();
            }
        }
    }

    /// Advance one cycle
    #[inline]
    pub fn clock(&mut self) {
        self.bus_value_ttl = self.bus_value_ttl.saturating_sub(1);
        if self.bus_value_ttl == 0 {
            self.bus_value = 0;
        }

        for voice in &mut self.voices {
            voice.envelope.clock();
        }
        for voice in &mut self.voices {
            voice.oscillator.clock();
        }
        self.synchronize();

        let (v1, v2, v3) = (self.voice_output(0), self.voice_output(1), self.voice_output(2));
        self.filter.clock(v1, v2, v3, self.ext_in);
        self.external_filter.clock(self.filter.output());
    }

    /// Advance `delta` cycles
    ///
    /// Oscillators are stepped in chunks that end on every MSB toggle of an
    /// oscillator acting as a hard sync source, so sync lands on the same
    /// cycle as with single clocking. Envelopes, oscillators and filters are
    /// each exact on their own; the filters see the voice outputs of the
    /// last cycle only.
    pub fn clock_delta(&mut self, delta: u32) {
        if delta == 0 {
            return;
        }

        self.bus_value_ttl = self.bus_value_ttl.saturating_sub(delta);
        if self.bus_value_ttl == 0 {
            self.bus_value = 0;
        }

        for voice in &mut self.voices {
            voice.envelope.clock_delta(delta);
        }

        let mut remaining = delta;
        while remaining != 0 {
            let mut step = remaining;
            for (index, &destination) in self.sync_destinations.iter().enumerate() {
                let osc = &self.voices[index].oscillator;
                if osc.is_sync_source_for(&self.voices[destination].oscillator) {
                    step = step.min(osc.cycles_to_msb_toggle());
                }
            }
            for voice in &mut self.voices {
                voice.oscillator.clock_delta(step);
            }
            self.synchronize();
            remaining -= step;
        }

        let (v1, v2, v3) = (self.voice_output(0), self.voice_output(1), self.voice_output(2));
        self.filter.clock_delta(delta, v1, v2, v3, self.ext_in);
        self.external_filter.clock_delta(delta, self.filter.output());
    }

    /// Chip output as a saturated 16-bit sample
    #[inline]
    pub fn output(&self) -> i16 {
        let sample = self.external_filter.output() / OUTPUT_DIVISOR;
        sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    /// Chip model
    pub fn chip_model(&self) -> ChipModel {
        self.model
    }

    /// Voice by index (0-2)
    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }
}

impl CycleSource for Synth {
    #[inline]
    fn clock(&mut self) {
        Synth::clock(self);
    }

    #[inline]
    fn clock_delta(&mut self, delta: u32) {
        Synth::clock_delta(self, delta);
    }

    #[inline]
    fn output(&self) -> i16 {
        Synth::output(self)
    }
}
