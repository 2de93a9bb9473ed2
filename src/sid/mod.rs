//! SID Emulation Domain
//!
//! MOS 6581/8580 Sound Interface Device emulation: three voices of
//! oscillator and envelope, the analog filter, the C64 output stage and the
//! register interface tying them together.
//!
//! Implementation:
//! - `synth` - Cycle-rate core (voices, filter, output stage)
//! - `chip` - Chip facade adding the sampling layer and persistence

// Internal modules
pub mod chip;
pub mod constants;
pub mod envelope;
pub mod external_filter;
pub mod filter;
pub mod oscillator;
pub mod registers;
pub mod spline;
pub mod synth;
pub mod voice;
pub mod waveforms;

// Re-export public API
pub use chip::{Sid, SidState};
pub use registers::Register;
pub use spline::CutoffPoint;
