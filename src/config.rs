//! Chip model and sampling configuration
//!
//! Everything here is set up once, before audio is rendered. Validation
//! happens up front so that a rejected configuration never touches a running
//! chip.

use std::fmt;
use std::str::FromStr;

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::{Result, SidError};

/// PAL C64 system clock in Hz
pub const PAL_CLOCK_FREQUENCY: f64 = 985_248.0;

/// NTSC C64 system clock in Hz
pub const NTSC_CLOCK_FREQUENCY: f64 = 1_022_727.0;

/// Default audio sample rate in Hz
pub const DEFAULT_SAMPLE_FREQUENCY: f64 = 44_100.0;

/// Default FIR gain, a little under unity to leave headroom for ringing
pub const DEFAULT_FILTER_SCALE: f64 = 0.97;

/// Highest accepted clock/sample ratio; keeps the 16.16 phase in range.
const MAX_CYCLES_PER_SAMPLE: f64 = 16_384.0;

/// SID chip revision
///
/// The discriminants are the part numbers, so a model can be looked up from
/// the number printed on the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, FromPrimitive, Serialize, Deserialize)]
#[repr(u16)]
pub enum ChipModel {
    /// First-generation NMOS chip with DC offsets and a strongly nonlinear filter
    #[default]
    Mos6581 = 6581,
    /// HMOS-II revision without DC offsets and with a near-linear filter
    Mos8580 = 8580,
}

impl ChipModel {
    /// Look up a chip model from its part number (6581 or 8580)
    pub fn from_part_number(part: u16) -> Result<Self> {
        ChipModel::from_u16(part)
            .ok_or_else(|| SidError::ConfigError(format!("unknown chip model {part}")))
    }

    /// Part number of this model
    pub fn part_number(self) -> u16 {
        self as u16
    }

    /// Waveform DAC output corresponding to zero volts
    ///
    /// The 6581 waveform DAC is measured to sit at 0x380 rather than the
    /// ideal midpoint.
    pub(crate) fn wave_zero(self) -> i32 {
        match self {
            ChipModel::Mos6581 => 0x380,
            ChipModel::Mos8580 => 0x800,
        }
    }

    /// DC offset added by the envelope multiplying DAC of one voice
    pub(crate) fn voice_dc(self) -> i32 {
        match self {
            ChipModel::Mos6581 => 0x800 * 0xff,
            ChipModel::Mos8580 => 0,
        }
    }

    /// Mixer input DC offset, about -1/18 of the dynamic range of one voice
    pub(crate) fn mixer_dc(self) -> i32 {
        match self {
            ChipModel::Mos6581 => (-0xfff * 0xff / 18) >> 7,
            ChipModel::Mos8580 => 0,
        }
    }

    /// Maximum DC level at the mixer output, removed by the output stage
    pub(crate) fn output_dc(self) -> i32 {
        match self {
            ChipModel::Mos6581 => {
                ((((0x800 - 0x380) + 0x800) * 0xff * 3 - 0xfff * 0xff / 18) >> 7) * 0x0f
            }
            ChipModel::Mos8580 => 0,
        }
    }
}

impl fmt::Display for ChipModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipModel::Mos6581 => write!(f, "MOS6581"),
            ChipModel::Mos8580 => write!(f, "MOS8580"),
        }
    }
}

impl FromStr for ChipModel {
    type Err = SidError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim().trim_start_matches(|c: char| c.is_ascii_alphabetic());
        let part = digits
            .parse::<u16>()
            .map_err(|_| SidError::ConfigError(format!("unknown chip model '{s}'")))?;
        ChipModel::from_part_number(part)
    }
}

/// Strategy for turning the cycle-rate chip output into audio samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SamplingMethod {
    /// Pick the output of the cycle nearest to each sample instant
    #[default]
    Fast,
    /// Clock every cycle and interpolate linearly between the two bracketing
    /// outputs
    Interpolate,
    /// Band-limited resampling with two adjacent FIR tables blended by phase
    ResampleInterpolate,
    /// Band-limited resampling with a single high-resolution FIR table set
    ResampleFast,
}

impl SamplingMethod {
    /// Whether this method convolves the cycle history with FIR tables
    pub fn is_resampling(self) -> bool {
        matches!(
            self,
            SamplingMethod::ResampleInterpolate | SamplingMethod::ResampleFast
        )
    }
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingMethod::Fast => write!(f, "fast"),
            SamplingMethod::Interpolate => write!(f, "interpolate"),
            SamplingMethod::ResampleInterpolate => write!(f, "resample-interpolate"),
            SamplingMethod::ResampleFast => write!(f, "resample-fast"),
        }
    }
}

impl FromStr for SamplingMethod {
    type Err = SidError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "fast" => Ok(SamplingMethod::Fast),
            "interpolate" => Ok(SamplingMethod::Interpolate),
            "resample-interpolate" | "resample" => Ok(SamplingMethod::ResampleInterpolate),
            "resample-fast" => Ok(SamplingMethod::ResampleFast),
            other => Err(SidError::ConfigError(format!(
                "unknown sampling method '{other}'"
            ))),
        }
    }
}

/// Sampling parameters
///
/// `pass_frequency` of `None` selects the automatic passband: 20 kHz, or
/// 0.9 of the Nyquist frequency for lower sample rates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Chip clock in Hz
    pub clock_frequency: f64,
    /// Sampling strategy
    pub method: SamplingMethod,
    /// Output sample rate in Hz
    pub sample_frequency: f64,
    /// Resampling filter passband edge in Hz
    pub pass_frequency: Option<f64>,
    /// FIR gain scale, must lie in [0.9, 1.0]
    pub filter_scale: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            clock_frequency: PAL_CLOCK_FREQUENCY,
            method: SamplingMethod::Fast,
            sample_frequency: DEFAULT_SAMPLE_FREQUENCY,
            pass_frequency: None,
            filter_scale: DEFAULT_FILTER_SCALE,
        }
    }
}

impl SamplingConfig {
    /// Create a configuration for the given clock, method and output rate
    pub fn new(clock_frequency: f64, method: SamplingMethod, sample_frequency: f64) -> Self {
        Self {
            clock_frequency,
            method,
            sample_frequency,
            ..Self::default()
        }
    }

    /// Chip cycles per output sample as a float
    pub fn cycles_per_sample(&self) -> f64 {
        self.clock_frequency / self.sample_frequency
    }

    /// Passband edge actually used by the resampler
    pub fn effective_pass_frequency(&self) -> f64 {
        match self.pass_frequency {
            Some(pass) => pass,
            None => {
                let pass = 20_000.0;
                if 2.0 * pass / self.sample_frequency >= 0.9 {
                    0.9 * self.sample_frequency / 2.0
                } else {
                    pass
                }
            }
        }
    }

    /// Check the parameters without applying them
    ///
    /// The ring buffer capacity check depends on the FIR design and is
    /// performed by the sampler.
    pub fn validate(&self) -> Result<()> {
        if !(self.clock_frequency.is_finite() && self.clock_frequency > 0.0) {
            return Err(SidError::ConfigError(format!(
                "clock frequency must be positive, got {}",
                self.clock_frequency
            )));
        }
        if !(self.sample_frequency.is_finite() && self.sample_frequency > 0.0) {
            return Err(SidError::ConfigError(format!(
                "sample frequency must be positive, got {}",
                self.sample_frequency
            )));
        }
        if self.cycles_per_sample() >= MAX_CYCLES_PER_SAMPLE {
            return Err(SidError::ConfigError(format!(
                "clock/sample ratio {:.1} is too large",
                self.cycles_per_sample()
            )));
        }
        if let Some(pass) = self.pass_frequency {
            if !(pass.is_finite() && pass > 0.0) {
                return Err(SidError::ConfigError(format!(
                    "passband must be positive, got {pass}"
                )));
            }
            if pass > 0.9 * self.sample_frequency / 2.0 {
                return Err(SidError::ConfigError(format!(
                    "passband {pass} Hz exceeds 0.9 of the Nyquist frequency"
                )));
            }
        }
        if !(0.9..=1.0).contains(&self.filter_scale) {
            return Err(SidError::ConfigError(format!(
                "filter scale {} outside [0.9, 1.0]",
                self.filter_scale
            )));
        }
        Ok(())
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SamplingConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Behaviour of the noise shift register around the test bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NoiseReseed {
    /// Test set clears accumulator and shift register; test cleared reseeds
    /// the shift register with 0x7FFFF8.
    #[default]
    Classic,
    /// Test set clears the accumulator and fills the shift register with
    /// ones; clearing test leaves the register as it is. Optional model of
    /// the register bits drifting high on some chips.
    Saturating,
}

/// Optional nonlinearity in the filter integrators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterDistortion {
    /// Linear integrators
    #[default]
    None,
    /// Integrator states saturate at the op-amp rails
    Clamped,
}

/// Behavioural switches selected when a chip is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SidOptions {
    /// Noise register test-bit behaviour
    pub noise_reseed: NoiseReseed,
    /// Filter integrator nonlinearity
    pub filter_distortion: FilterDistortion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chip_model_from_part_number() {
        assert_eq!(ChipModel::from_part_number(6581).unwrap(), ChipModel::Mos6581);
        assert_eq!(ChipModel::from_part_number(8580).unwrap(), ChipModel::Mos8580);
        assert!(ChipModel::from_part_number(6582).is_err());
        assert_eq!(ChipModel::Mos8580.part_number(), 8580);
    }

    #[test]
    fn test_chip_model_from_str() {
        assert_eq!("6581".parse::<ChipModel>().unwrap(), ChipModel::Mos6581);
        assert_eq!("MOS8580".parse::<ChipModel>().unwrap(), ChipModel::Mos8580);
        assert!("SID".parse::<ChipModel>().is_err());
    }

    #[test]
    fn test_model_dc_levels() {
        assert_eq!(ChipModel::Mos8580.voice_dc(), 0);
        assert_eq!(ChipModel::Mos8580.mixer_dc(), 0);
        assert_eq!(ChipModel::Mos8580.output_dc(), 0);
        assert!(ChipModel::Mos6581.mixer_dc() < 0);
        assert!(ChipModel::Mos6581.output_dc() > 0);
    }

    #[test]
    fn test_sampling_method_from_str() {
        assert_eq!(
            "resample_fast".parse::<SamplingMethod>().unwrap(),
            SamplingMethod::ResampleFast
        );
        assert_eq!(
            "Interpolate".parse::<SamplingMethod>().unwrap(),
            SamplingMethod::Interpolate
        );
        assert!("linear".parse::<SamplingMethod>().is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = SamplingConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.effective_pass_frequency() - 19_845.0).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_wide_passband() {
        let config = SamplingConfig {
            pass_frequency: Some(21_000.0),
            ..SamplingConfig::default()
        };
        assert!(matches!(config.validate(), Err(SidError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_filter_scale() {
        for scale in [0.5, 0.89, 1.01] {
            let config = SamplingConfig {
                filter_scale: scale,
                ..SamplingConfig::default()
            };
            assert!(config.validate().is_err(), "scale {scale} accepted");
        }
    }

    #[test]
    fn test_validate_rejects_bad_rates() {
        assert!(SamplingConfig::new(0.0, SamplingMethod::Fast, 44_100.0)
            .validate()
            .is_err());
        assert!(SamplingConfig::new(985_248.0, SamplingMethod::Fast, -1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = SamplingConfig {
            method: SamplingMethod::ResampleInterpolate,
            sample_frequency: 48_000.0,
            ..SamplingConfig::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(SamplingConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_json_partial_document_uses_defaults() {
        let config = SamplingConfig::from_json(r#"{ "sample_frequency": 22050.0 }"#).unwrap();
        assert_eq!(config.sample_frequency, 22_050.0);
        assert_eq!(config.clock_frequency, PAL_CLOCK_FREQUENCY);
        assert_eq!(config.method, SamplingMethod::Fast);
    }
}
