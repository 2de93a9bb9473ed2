//! SID chip facade
//!
//! [`Sid`] couples the cycle-rate core with a sampler and owns everything a
//! host talks to: the register bus, clocking, audio rendering,
//! configuration and state save/restore.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::constants::NUM_VOICES;
use super::external_filter::ExternalFilterState;
use super::filter::FilterState;
use super::registers::NUM_WRITE_REGISTERS;
use super::spline::{calibrated_cutoff_table, CutoffPoint};
use super::synth::{Synth, SYNC_SOURCES};
use super::voice::VoiceState;
use crate::config::{ChipModel, SamplingConfig, SidOptions};
use crate::sampler::{Sampler, SamplerState};
use crate::{Result, SidError};

/// Every mutable field of a running chip
///
/// Plain data; serializable with serde or with the binary format in
/// [`crate::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidState {
    /// Chip model
    pub chip_model: ChipModel,
    /// Last value written to each of the write registers 0x00-0x18
    pub registers: [u8; NUM_WRITE_REGISTERS],
    /// Value currently on the data bus
    pub bus_value: u8,
    /// Cycles until the data bus decays to zero
    pub bus_value_ttl: u32,
    /// Scaled external audio input
    pub ext_in: i32,
    /// Voices 1-3
    pub voices: [VoiceState; NUM_VOICES],
    /// Sync source of each voice
    pub sync_sources: [u8; NUM_VOICES],
    /// Filter
    pub filter: FilterState,
    /// Output stage
    pub external_filter: ExternalFilterState,
    /// Sampling phase and cycle history
    pub sampler: SamplerState,
}

/// MOS 6581/8580 SID
///
/// # Example
///
/// ```
/// use sid6581::{ChipModel, Sid};
///
/// let mut sid = Sid::new(ChipModel::Mos8580);
/// sid.write(0x18, 0x0f); // Volume
/// sid.write(0x05, 0x00); // Attack 0, decay 0
/// sid.write(0x06, 0xf0); // Sustain 15
/// sid.write(0x01, 0x20); // Frequency
/// sid.write(0x04, 0x11); // Triangle + gate
///
/// let mut buffer = [0i16; 441];
/// let mut cycles = 9_000;
/// let written = sid.render(&mut cycles, &mut buffer, 441, 1);
/// assert!(written > 0);
/// assert_eq!(cycles, 0);
/// ```
#[derive(Clone)]
pub struct Sid {
    synth: Synth,
    sampler: Sampler,
    sampling: SamplingConfig,
}

impl Sid {
    /// Create a chip with the reference behaviour, sampling a PAL clock at
    /// 44.1 kHz with [`SamplingMethod::Fast`](crate::SamplingMethod::Fast)
    pub fn new(model: ChipModel) -> Self {
        Self::with_options(model, SidOptions::default())
    }

    /// Create a chip with alternate behaviours selected
    pub fn with_options(model: ChipModel, options: SidOptions) -> Self {
        Self {
            synth: Synth::new(model, options),
            sampler: Sampler::default(),
            sampling: SamplingConfig::default(),
        }
    }

    /// Chip model
    pub fn chip_model(&self) -> ChipModel {
        self.synth.chip_model()
    }

    /// Switch chip model
    ///
    /// Waveform tables, DC levels and the filter cutoff curve follow the
    /// new model; a custom cutoff calibration is dropped.
    pub fn set_chip_model(&mut self, model: ChipModel) {
        debug!("SID chip model: {} -> {}", self.synth.chip_model(), model);
        self.synth.set_chip_model(model);
    }

    /// Active sampling configuration
    pub fn sampling_config(&self) -> &SamplingConfig {
        &self.sampling
    }

    /// Configure sample rate conversion
    ///
    /// Rebuilds the sampler, including the FIR tables for the resampling
    /// methods, and clears the sampling phase.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the parameters are invalid; the previous
    /// configuration then stays in effect.
    pub fn set_sampling_parameters(&mut self, config: &SamplingConfig) -> Result<()> {
        let sampler = Sampler::new(config).map_err(|err| {
            warn!("Rejected sampling parameters: {err}");
            err
        })?;
        debug!(
            "Sampling: {} at {:.0} Hz from {:.0} Hz clock",
            config.method, config.sample_frequency, config.clock_frequency
        );
        self.sampler = sampler;
        self.sampling = *config;
        Ok(())
    }

    /// Retune the output rate without redesigning the FIR
    ///
    /// # Errors
    ///
    /// `ConfigError` for a non-positive or too low rate.
    pub fn adjust_sampling_frequency(&mut self, sample_frequency: f64) -> Result<()> {
        self.sampler
            .adjust_sample_frequency(sample_frequency)
            .map_err(|err| {
                warn!("Rejected sample frequency adjustment: {err}");
                err
            })?;
        self.sampling.sample_frequency = sample_frequency;
        Ok(())
    }

    /// Replace the filter cutoff curve with one through measured points
    ///
    /// # Errors
    ///
    /// `CalibrationError` unless there are 2 to 2048 points, strictly
    /// increasing in both cutoff and frequency, with cutoffs below 2048.
    pub fn install_cutoff_calibration(&mut self, points: &[CutoffPoint]) -> Result<()> {
        let table = calibrated_cutoff_table(points).map_err(|err| {
            warn!("Rejected cutoff calibration: {err}");
            err
        })?;
        debug!("Cutoff calibration installed: {} points", points.len());
        self.synth.set_cutoff_table(table);
        Ok(())
    }

    /// Cutoff frequency in Hz for an 11-bit FC value under the active curve
    pub fn cutoff_frequency(&self, cutoff: u16) -> i32 {
        self.synth.filter.cutoff_frequency(cutoff)
    }

    /// Reset the chip to power-on state
    ///
    /// Chip model, sampling configuration, cutoff curve, voice mutes and
    /// the external input are kept.
    pub fn reset(&mut self) {
        self.synth.reset();
        self.sampler.reset();
    }

    /// Write a register (address masked to 5 bits)
    #[inline]
    pub fn write(&mut self, addr: u8, value: u8) {
        self.synth.write(addr, value);
    }

    /// Read a register (address masked to 5 bits)
    #[inline]
    pub fn read(&self, addr: u8) -> u8 {
        self.synth.read(addr)
    }

    /// Feed a 16-bit external audio sample into the mixer
    pub fn set_external_input(&mut self, sample: i16) {
        self.synth.set_external_input(sample);
    }

    /// Enable or bypass the filter; bypassed, every input is mixed unfiltered
    pub fn enable_filter(&mut self, enabled: bool) {
        self.synth.filter.enable(enabled);
    }

    /// Enable or bypass the output stage RC filters
    pub fn enable_external_filter(&mut self, enabled: bool) {
        self.synth.external_filter.enable(enabled);
    }

    /// Mute or unmute a voice (0-2); other indices are ignored
    pub fn set_voice_mute(&mut self, voice: usize, muted: bool) {
        if let Some(v) = self.synth.voices.get_mut(voice) {
            v.set_muted(muted);
        }
    }

    /// Whether a voice (0-2) is muted
    pub fn is_voice_muted(&self, voice: usize) -> bool {
        self.synth.voices.get(voice).is_some_and(|v| v.is_muted())
    }

    /// Advance one cycle
    #[inline]
    pub fn clock(&mut self) {
        self.synth.clock();
    }

    /// Advance `delta` cycles
    #[inline]
    pub fn clock_delta(&mut self, delta: u32) {
        self.synth.clock_delta(delta);
    }

    /// Current output as a 16-bit sample
    #[inline]
    pub fn output(&self) -> i16 {
        self.synth.output()
    }

    /// Run up to `*delta` cycles, writing samples to `buffer` every `stride`
    /// slots
    ///
    /// Returns the number of samples written. If the buffer (or
    /// `max_samples`) fills first, the unconsumed cycles are left in
    /// `delta`; otherwise `delta` ends at zero.
    pub fn render(
        &mut self,
        delta: &mut u32,
        buffer: &mut [i16],
        max_samples: usize,
        stride: usize,
    ) -> usize {
        self.sampler
            .render(&mut self.synth, delta, buffer, max_samples, stride)
    }

    /// Capture the complete chip state
    pub fn read_state(&self) -> SidState {
        let synth = &self.synth;
        SidState {
            chip_model: synth.model,
            registers: synth.registers,
            bus_value: synth.bus_value,
            bus_value_ttl: synth.bus_value_ttl,
            ext_in: synth.ext_in,
            voices: [
                synth.voices[0].read_state(),
                synth.voices[1].read_state(),
                synth.voices[2].read_state(),
            ],
            sync_sources: synth.sync_sources.map(|source| source as u8),
            filter: synth.filter.read_state(),
            external_filter: synth.external_filter.read_state(),
            sampler: self.sampler.read_state(),
        }
    }

    /// Restore a state captured with [`Sid::read_state`]
    ///
    /// The chip model is switched only if it differs, so an installed
    /// cutoff calibration survives restoring a state of the same model.
    ///
    /// # Errors
    ///
    /// `SnapshotError` if the sync ring is not the chip's fixed ring, an
    /// envelope period is one the chip never uses, or the sample history
    /// has the wrong length; nothing is changed then.
    pub fn write_state(&mut self, state: &SidState) -> Result<()> {
        let sync_sources = state.sync_sources.map(usize::from);
        if sync_sources != SYNC_SOURCES {
            return Err(SidError::SnapshotError(format!(
                "sync ring {:?} does not match the chip's {:?}",
                state.sync_sources, SYNC_SOURCES
            )));
        }
        for voice_state in &state.voices {
            voice_state.envelope.validate()?;
        }
        self.sampler.write_state(&state.sampler)?;

        if state.chip_model != self.synth.model {
            self.set_chip_model(state.chip_model);
        }

        let synth = &mut self.synth;
        synth.registers = state.registers;
        synth.bus_value = state.bus_value;
        synth.bus_value_ttl = state.bus_value_ttl;
        synth.ext_in = state.ext_in;
        for (voice, voice_state) in synth.voices.iter_mut().zip(&state.voices) {
            voice.write_state(voice_state);
        }
        synth.link_sync_ring(sync_sources);
        synth.filter.write_state(&state.filter);
        synth.external_filter.write_state(&state.external_filter);
        Ok(())
    }
}

impl Default for Sid {
    fn default() -> Self {
        Self::new(ChipModel::default())
    }
}

impl std::fmt::Debug for Sid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sid")
            .field("chip_model", &self.synth.model)
            .field("sampling", &self.sampling)
            .field("bus_value", &self.synth.bus_value)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SamplingMethod;

    fn play_saw(sid: &mut Sid) {
        sid.write(0x18, 0x0f);
        sid.write(0x05, 0x00);
        sid.write(0x06, 0xf0);
        sid.write(0x00, 0x00);
        sid.write(0x01, 0x10);
        sid.write(0x04, 0x21);
    }

    #[test]
    fn test_default_sampling() {
        let sid = Sid::default();
        assert_eq!(sid.chip_model(), ChipModel::Mos6581);
        assert_eq!(sid.sampling_config().method, SamplingMethod::Fast);
    }

    #[test]
    fn test_rejected_parameters_keep_configuration() {
        let mut sid = Sid::new(ChipModel::Mos8580);
        let good = SamplingConfig::new(1_000_000.0, SamplingMethod::Interpolate, 48_000.0);
        sid.set_sampling_parameters(&good).unwrap();

        let bad = SamplingConfig {
            filter_scale: 1.5,
            ..good
        };
        assert!(matches!(
            sid.set_sampling_parameters(&bad),
            Err(SidError::ConfigError(_))
        ));
        let bad = SamplingConfig {
            pass_frequency: Some(30_000.0),
            ..good
        };
        assert!(sid.set_sampling_parameters(&bad).is_err());
        assert_eq!(*sid.sampling_config(), good);

        assert!(sid.adjust_sampling_frequency(0.0).is_err());
        sid.adjust_sampling_frequency(47_900.0).unwrap();
        assert_eq!(sid.sampling_config().sample_frequency, 47_900.0);
    }

    #[test]
    fn test_calibration_and_model_switch() {
        let mut sid = Sid::new(ChipModel::Mos8580);
        let factory = sid.cutoff_frequency(1024);
        sid.install_cutoff_calibration(&[CutoffPoint::new(0, 100), CutoffPoint::new(2047, 10_000)])
            .unwrap();
        assert_eq!(sid.cutoff_frequency(0), 100);
        assert_eq!(sid.cutoff_frequency(2047), 10_000);

        assert!(sid
            .install_cutoff_calibration(&[CutoffPoint::new(5, 100), CutoffPoint::new(4, 200)])
            .is_err());
        assert_eq!(sid.cutoff_frequency(2047), 10_000);

        sid.set_chip_model(ChipModel::Mos8580);
        assert_eq!(sid.cutoff_frequency(1024), factory);
    }

    #[test]
    fn test_voice_mute() {
        let mut sid = Sid::new(ChipModel::Mos8580);
        sid.set_voice_mute(1, true);
        assert!(sid.is_voice_muted(1));
        assert!(!sid.is_voice_muted(0));
        assert!(!sid.is_voice_muted(7));
        sid.set_voice_mute(7, true);

        play_saw(&mut sid);
        sid.set_voice_mute(0, true);
        sid.enable_external_filter(false);
        sid.clock_delta(5_000);
        assert_eq!(sid.output(), 0);

        sid.reset();
        assert!(sid.is_voice_muted(0));
    }

    #[test]
    fn test_state_round_trip() {
        let mut sid = Sid::new(ChipModel::Mos6581);
        sid.set_sampling_parameters(&SamplingConfig {
            method: SamplingMethod::ResampleInterpolate,
            ..SamplingConfig::default()
        })
        .unwrap();
        play_saw(&mut sid);
        let mut buffer = [0i16; 256];
        let mut cycles = 4_000;
        sid.render(&mut cycles, &mut buffer, 256, 1);

        let state = sid.read_state();
        let mut copy = sid.clone();

        let mut a = [0i16; 256];
        let mut b = [0i16; 256];
        let (mut ca, mut cb) = (5_000, 5_000);
        sid.render(&mut ca, &mut a, 256, 1);

        copy.reset();
        copy.write_state(&state).unwrap();
        assert_eq!(copy.read_state(), state);
        copy.render(&mut cb, &mut b, 256, 1);
        assert_eq!(a, b);
    }

    #[test]
    fn test_write_state_rejects_bad_ring() {
        let mut sid = Sid::new(ChipModel::Mos6581);
        let mut state = sid.read_state();
        state.chip_model = ChipModel::Mos8580;
        state.sync_sources = [1, 2, 0];
        assert!(matches!(
            sid.write_state(&state),
            Err(SidError::SnapshotError(_))
        ));
        assert_eq!(sid.chip_model(), ChipModel::Mos6581);
    }

    #[test]
    fn test_write_state_switches_model() {
        let mut a = Sid::new(ChipModel::Mos8580);
        play_saw(&mut a);
        a.clock_delta(1_000);
        let mut b = Sid::new(ChipModel::Mos6581);
        b.write_state(&a.read_state()).unwrap();
        assert_eq!(b.chip_model(), ChipModel::Mos8580);
        a.clock_delta(777);
        b.clock_delta(777);
        assert_eq!(a.output(), b.output());
    }

    #[test]
    fn test_write_state_rejects_zero_rate_period() {
        let mut sid = Sid::new(ChipModel::Mos6581);
        play_saw(&mut sid);
        sid.clock_delta(2_000);
        let before = sid.read_state();

        let mut state = before.clone();
        state.voices[0].envelope.rate_period = 0;
        assert!(matches!(
            sid.write_state(&state),
            Err(SidError::SnapshotError(_))
        ));
        assert_eq!(sid.read_state(), before);

        // Still clocks normally afterwards
        sid.clock_delta(100_000);
        assert_ne!(sid.read_state(), before);
    }
}
