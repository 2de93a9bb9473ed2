//! MOS 6581/8580 SID Emulator
//!
//! A cycle-accurate emulator of the MOS Technology SID sound chip as found in
//! the Commodore 64. Three oscillator/envelope voices feed a model of the
//! analog two-integrator-loop filter and the output stage, and a sampling
//! layer converts the cycle-rate signal into audio at any output rate.
//!
//! # Features
//! - Bit-exact oscillators, noise LFSR, hard sync and ring modulation
//! - ADSR envelopes including the rate counter wraparound ("ADSR delay bug")
//! - Filter cutoff curves interpolated from measured calibration points
//! - 6581 and 8580 chip models, switchable at runtime
//! - Four sampling methods, from nearest-cycle picking to Kaiser-windowed
//!   sinc resampling
//! - Full state save/restore
//!
//! # Crate feature flags
//! - `snapshot` (default): Binary state snapshots (`snapshot`, enables `nom`)
//!
//! # Quick start
//! ```no_run
//! use sid6581::{ChipModel, SamplingConfig, SamplingMethod, Sid};
//!
//! let mut sid = Sid::new(ChipModel::Mos6581);
//! sid.set_sampling_parameters(&SamplingConfig {
//!     method: SamplingMethod::ResampleInterpolate,
//!     ..SamplingConfig::default()
//! })
//! .unwrap();
//!
//! sid.write(0x00, 0x00); // Voice 1 frequency low
//! sid.write(0x01, 0x10); // Voice 1 frequency high
//! sid.write(0x05, 0x09); // Attack 0, decay 9
//! sid.write(0x06, 0xF0); // Sustain 15, release 0
//! sid.write(0x18, 0x0F); // Full volume
//! sid.write(0x04, 0x21); // Sawtooth + gate
//!
//! let mut buffer = [0i16; 882];
//! let mut cycles = 19_705; // One PAL frame
//! let produced = sid.render(&mut cycles, &mut buffer, 882, 1);
//! ```

#![warn(missing_docs)]

// Domain modules
pub mod backend; // Backend trait abstraction
pub mod config; // Chip model and sampling configuration
pub mod sampler; // Sample rate conversion
pub mod sid; // SID emulation (core)

#[cfg(feature = "snapshot")]
pub mod snapshot; // Binary state snapshots

/// Error types for SID emulator operations
///
/// Only configuration and persistence can fail. Register access and clocking
/// are total and never return errors.
#[derive(thiserror::Error, Debug)]
pub enum SidError {
    /// IO error from a snapshot sink or source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON configuration document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid sampling configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Invalid filter cutoff calibration
    #[error("Invalid cutoff calibration: {0}")]
    CalibrationError(String),

    /// Snapshot data could not be decoded or restored
    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for SidError {
    /// Converts a String into `SidError::Other`.
    ///
    /// Prefer the specific variants (`ConfigError`, `CalibrationError`,
    /// `SnapshotError`) where the failure has a known category.
    fn from(msg: String) -> Self {
        SidError::Other(msg)
    }
}

impl From<&str> for SidError {
    /// Converts a string slice into `SidError::Other`.
    fn from(msg: &str) -> Self {
        SidError::Other(msg.to_string())
    }
}

/// Result type for emulator operations
pub type Result<T> = std::result::Result<T, SidError>;

// Public API exports
pub use backend::SidBackend;
pub use config::{
    ChipModel, FilterDistortion, NoiseReseed, SamplingConfig, SamplingMethod, SidOptions,
    NTSC_CLOCK_FREQUENCY, PAL_CLOCK_FREQUENCY,
};
pub use sid::{CutoffPoint, Sid, SidState};

#[cfg(feature = "snapshot")]
pub use snapshot::{parse_snapshot, write_snapshot};
