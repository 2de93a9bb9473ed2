//! SID Hardware Constants
//!
//! Shared constants and lookup tables used across the chip components.

/// Number of voices
pub const NUM_VOICES: usize = 3;

/// Accumulator width mask (24 bits)
pub const ACCUMULATOR_MASK: u32 = 0x00FF_FFFF;

/// Accumulator MSB, drives hard sync and ring modulation
pub const ACCUMULATOR_MSB: u32 = 0x0080_0000;

/// Accumulator bit that clocks the noise shift register
pub const NOISE_CLOCK_BIT: u32 = 0x0008_0000;

/// Noise shift register width mask (23 bits)
pub const SHIFT_REGISTER_MASK: u32 = 0x007F_FFFF;

/// Value loaded into the noise shift register when the test bit is released
pub const NOISE_RESEED: u32 = 0x007F_FFF8;

/// Cycles a written value stays readable on the data bus
pub const BUS_VALUE_TTL: u32 = 0x2000;

/// Rate counter wraps at 2^15
pub const RATE_COUNTER_MASK: u16 = 0x7FFF;

/// Rate counter comparison periods for the 16 attack/decay/release settings
///
/// One envelope step every `period` cycles; 256 steps at 1 MHz give the
/// datasheet times (2 ms .. 8 s for attack, three times that for decay and
/// release once the exponential divider kicks in).
pub const RATE_COUNTER_PERIOD: [u16; 16] = [
    9,     //   2ms*1.0MHz/256 =     7.81
    32,    //   8ms*1.0MHz/256 =    31.25
    63,    //  16ms*1.0MHz/256 =    62.50
    95,    //  24ms*1.0MHz/256 =    93.75
    149,   //  38ms*1.0MHz/256 =   148.44
    220,   //  56ms*1.0MHz/256 =   218.75
    267,   //  68ms*1.0MHz/256 =   265.63
    313,   //  80ms*1.0MHz/256 =   312.50
    392,   // 100ms*1.0MHz/256 =   390.63
    977,   // 250ms*1.0MHz/256 =   976.56
    1954,  // 500ms*1.0MHz/256 =  1953.13
    3126,  // 800ms*1.0MHz/256 =  3125.00
    3907,  //   1 s*1.0MHz/256 =  3906.25
    11720, //   3 s*1.0MHz/256 = 11718.75
    19532, //   5 s*1.0MHz/256 = 19531.25
    31251, //   8 s*1.0MHz/256 = 31250.00
];

/// Envelope counter values for the 16 sustain settings (nibble * 0x11)
pub const SUSTAIN_LEVEL: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
];

/// Every period the exponential divider can select
pub const EXPONENTIAL_PERIODS: [u16; 6] = [1, 2, 4, 8, 16, 30];

/// Exponential divider period that takes effect when the envelope counter
/// reaches the given value
///
/// Approximates the exponential decay curve with a piecewise linear one.
#[inline]
pub fn exponential_period_at(envelope_counter: u8) -> Option<u8> {
    match envelope_counter {
        0xff => Some(1),
        0x5d => Some(2),
        0x36 => Some(4),
        0x1a => Some(8),
        0x0e => Some(16),
        0x06 => Some(30),
        0x00 => Some(1),
        _ => None,
    }
}

/// Scale that turns Hz into the fixed-point angular frequency used by the
/// filters: multiplying by 1.048576 lets a division by 1 000 000 become a
/// right shift by 20.
pub const W0_SCALE: f64 = 1.048576;

/// Cutoff ceiling for single-cycle filter steps (16 kHz)
pub const W0_MAX_SINGLE_HZ: f64 = 16_000.0;

/// Cutoff ceiling for multi-cycle filter steps (4 kHz)
pub const W0_MAX_DELTA_HZ: f64 = 4_000.0;

/// Output stage low-pass: R = 10 kOhm, C = 1000 pF, w0 = 1/RC = 100000
pub const EXTERNAL_W0_LOWPASS: i32 = 104_858;

/// Output stage high-pass: R = 1 kOhm, C = 10 uF, w0 = 1/RC = 100
pub const EXTERNAL_W0_HIGHPASS: i32 = 105;

/// Largest step the output stage integrates at once
pub const EXTERNAL_MAX_STEP: u32 = 8;

/// Integrator rail used by [`crate::FilterDistortion::Clamped`]
pub const FILTER_STATE_LIMIT: i32 = 1 << 19;

/// Filter cutoff calibration for the 6581: (FC register value, Hz)
///
/// End points are repeated to pin the second derivative at zero, and the
/// pair at 0x3ff/0x400 reproduces the measured discontinuity between the
/// two halves of the cutoff DAC.
pub const F0_POINTS_6581: [(i32, i32); 31] = [
    //  FC      f         FCHI FCLO
    (0, 220),      // 0x00      - repeated end point
    (0, 220),      // 0x00
    (128, 230),    // 0x10
    (256, 250),    // 0x20
    (384, 300),    // 0x30
    (512, 420),    // 0x40
    (640, 780),    // 0x50
    (768, 1600),   // 0x60
    (832, 2300),   // 0x68
    (896, 3200),   // 0x70
    (960, 4300),   // 0x78
    (992, 5000),   // 0x7c
    (1008, 5400),  // 0x7e
    (1016, 5700),  // 0x7f
    (1023, 6000),  // 0x7f 0x07
    (1023, 6000),  // 0x7f 0x07  - discontinuity
    (1024, 4600),  // 0x80      -
    (1024, 4600),  // 0x80
    (1032, 4800),  // 0x81
    (1056, 5300),  // 0x84
    (1088, 6000),  // 0x88
    (1120, 6600),  // 0x8c
    (1152, 7200),  // 0x90
    (1280, 9500),  // 0xa0
    (1408, 12000), // 0xb0
    (1536, 14500), // 0xc0
    (1664, 16000), // 0xd0
    (1792, 17100), // 0xe0
    (1920, 17700), // 0xf0
    (2047, 18000), // 0xff 0x07
    (2047, 18000), // 0xff 0x07  - repeated end point
];

/// Filter cutoff calibration for the 8580: (FC register value, Hz)
pub const F0_POINTS_8580: [(i32, i32); 19] = [
    //  FC      f         FCHI FCLO
    (0, 0),        // 0x00      - repeated end point
    (0, 0),        // 0x00
    (128, 800),    // 0x10
    (256, 1600),   // 0x20
    (384, 2500),   // 0x30
    (512, 3300),   // 0x40
    (640, 4100),   // 0x50
    (768, 4800),   // 0x60
    (896, 5600),   // 0x70
    (1024, 6500),  // 0x80
    (1152, 7500),  // 0x90
    (1280, 8400),  // 0xa0
    (1408, 9200),  // 0xb0
    (1536, 9800),  // 0xc0
    (1664, 10500), // 0xd0
    (1792, 11000), // 0xe0
    (1920, 11700), // 0xf0
    (2047, 12500), // 0xff 0x07
    (2047, 12500), // 0xff 0x07  - repeated end point
];

/// Number of cutoff register values (11 bits)
pub const CUTOFF_STEPS: usize = 2048;
