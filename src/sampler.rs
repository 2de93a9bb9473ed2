//! Sample rate conversion
//!
//! Turns the cycle-rate chip output into audio samples. All four methods
//! share a 16.16 fixed-point phase: `cycles_per_sample` is added per output
//! sample and the integer part says how many cycles to run.
//!
//! The resampling methods keep a ring of recent cycle outputs and convolve
//! it with a Kaiser-windowed sinc. The FIR is tabulated at `fir_res` phase
//! offsets; `ResampleInterpolate` blends two neighbouring tables, while
//! `ResampleFast` uses a much finer table set and picks the nearest one.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{SamplingConfig, SamplingMethod};
use crate::{Result, SidError};

/// Fixed-point fraction bits of the sample phase
pub const FIXP_SHIFT: u32 = 16;
const FIXP_MASK: i64 = 0xffff;
const FIXP_HALF: i64 = 1 << (FIXP_SHIFT - 1);

/// Maximum filter order (zero crossings); the order actually used follows
/// from the passband and is at most 124
pub const FIR_N: usize = 125;

/// Minimum FIR table resolution for `ResampleInterpolate`
pub const FIR_RES_INTERPOLATE: f64 = 285.0;

/// Minimum FIR table resolution for `ResampleFast`
pub const FIR_RES_FAST: f64 = 51473.0;

/// FIR coefficient fraction bits
pub const FIR_SHIFT: u32 = 15;

/// Cycle history length; must be a power of two
pub const RING_SIZE: usize = 16384;

/// Anything that can be clocked cycle by cycle and sampled
pub trait CycleSource {
    /// Advance one cycle
    fn clock(&mut self);

    /// Advance `delta` cycles
    fn clock_delta(&mut self, delta: u32);

    /// Current 16-bit output
    fn output(&self) -> i16;
}

/// Snapshot of the sampler's running state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SamplerState {
    /// 16.16 phase relative to the next sample
    pub sample_offset: i32,
    /// Previous output, used by `Interpolate`
    pub sample_prev: i16,
    /// Write position in the cycle history
    pub sample_index: u32,
    /// Cycle history (`RING_SIZE` entries), empty when not resampling
    pub history: Vec<i16>,
}

/// Sampler for one configuration
#[derive(Clone)]
pub struct Sampler {
    method: SamplingMethod,
    clock_frequency: f64,
    cycles_per_sample: i32,
    sample_offset: i32,
    sample_prev: i16,

    sample_index: usize,
    history: Vec<i16>,

    fir: Vec<i16>,
    fir_n: usize,
    fir_res: usize,
}

impl Sampler {
    /// Build a sampler, designing the FIR tables if the method resamples
    ///
    /// # Errors
    ///
    /// `ConfigError` if the configuration is invalid or the FIR would not
    /// fit in the cycle history.
    pub fn new(config: &SamplingConfig) -> Result<Self> {
        config.validate()?;

        let cycles_per_sample = fixed_cycles_per_sample(config.clock_frequency, config.sample_frequency);
        let mut sampler = Self {
            method: config.method,
            clock_frequency: config.clock_frequency,
            cycles_per_sample,
            sample_offset: 0,
            sample_prev: 0,
            sample_index: 0,
            history: Vec::new(),
            fir: Vec::new(),
            fir_n: 0,
            fir_res: 0,
        };

        if config.method.is_resampling() {
            if FIR_N as f64 * config.cycles_per_sample() >= RING_SIZE as f64 {
                return Err(SidError::ConfigError(format!(
                    "clock/sample ratio {:.1} overflows the {RING_SIZE}-cycle history",
                    config.cycles_per_sample()
                )));
            }
            let design = FirDesign::new(config);
            if design.length >= RING_SIZE {
                return Err(SidError::ConfigError(format!(
                    "FIR length {} does not fit the cycle history",
                    design.length
                )));
            }
            sampler.fir = design.tables(config.filter_scale);
            sampler.fir_n = design.length;
            sampler.fir_res = design.resolution;
            sampler.history = vec![0; RING_SIZE * 2];

            debug!(
                "FIR designed: {} taps x {} phases, passband {:.0} Hz",
                sampler.fir_n,
                sampler.fir_res,
                config.effective_pass_frequency()
            );
        }

        Ok(sampler)
    }

    /// Retune the output rate without redesigning the FIR
    ///
    /// Meant for small drift correction; the FIR passband stays where it
    /// was designed.
    pub fn adjust_sample_frequency(&mut self, sample_frequency: f64) -> Result<()> {
        if !(sample_frequency.is_finite() && sample_frequency > 0.0) {
            return Err(SidError::ConfigError(format!(
                "sample frequency must be positive, got {sample_frequency}"
            )));
        }
        let ratio = self.clock_frequency / sample_frequency;
        if ratio >= RING_SIZE as f64 {
            return Err(SidError::ConfigError(format!(
                "clock/sample ratio {ratio:.1} is too large"
            )));
        }
        self.cycles_per_sample = fixed_cycles_per_sample(self.clock_frequency, sample_frequency);
        Ok(())
    }

    /// Sampling method
    pub fn method(&self) -> SamplingMethod {
        self.method
    }

    /// Cycles per sample in 16.16 fixed point
    pub fn cycles_per_sample(&self) -> i32 {
        self.cycles_per_sample
    }

    /// FIR length in taps (0 when not resampling)
    pub fn fir_length(&self) -> usize {
        self.fir_n
    }

    /// Number of FIR phase tables (0 when not resampling)
    pub fn fir_resolution(&self) -> usize {
        self.fir_res
    }

    /// Clear the phase and cycle history
    pub fn reset(&mut self) {
        self.sample_offset = 0;
        self.sample_prev = 0;
        self.sample_index = 0;
        self.history.fill(0);
    }

    /// Clock `source` for up to `*delta` cycles, writing samples to
    /// `buffer[0]`, `buffer[stride]`, ...
    ///
    /// Stops early once `max_samples` samples (or as many as fit in
    /// `buffer`) have been written, leaving the unconsumed cycles in
    /// `delta`. Otherwise all cycles are consumed and `delta` is zero on
    /// return. A `stride` of zero is treated as one.
    pub fn render<S: CycleSource>(
        &mut self,
        source: &mut S,
        delta: &mut u32,
        buffer: &mut [i16],
        max_samples: usize,
        stride: usize,
    ) -> usize {
        let stride = stride.max(1);
        let capacity = if buffer.is_empty() {
            0
        } else {
            (buffer.len() - 1) / stride + 1
        };
        let limit = max_samples.min(capacity);

        match self.method {
            SamplingMethod::Fast => self.render_fast(source, delta, buffer, limit, stride),
            SamplingMethod::Interpolate => {
                self.render_interpolate(source, delta, buffer, limit, stride)
            }
            SamplingMethod::ResampleInterpolate | SamplingMethod::ResampleFast => {
                self.render_resample(source, delta, buffer, limit, stride)
            }
        }
    }

    fn render_fast<S: CycleSource>(
        &mut self,
        source: &mut S,
        delta: &mut u32,
        buffer: &mut [i16],
        limit: usize,
        stride: usize,
    ) -> usize {
        let mut s = 0;
        loop {
            let next = self.sample_offset as i64 + self.cycles_per_sample as i64 + FIXP_HALF;
            let cycles = (next >> FIXP_SHIFT).max(0);
            if cycles > *delta as i64 {
                break;
            }
            if s >= limit {
                return s;
            }
            source.clock_delta(cycles as u32);
            *delta -= cycles as u32;
            self.sample_offset = ((next & FIXP_MASK) - FIXP_HALF) as i32;
            buffer[s * stride] = source.output();
            s += 1;
        }

        source.clock_delta(*delta);
        self.consume_tail(delta);
        s
    }

    fn render_interpolate<S: CycleSource>(
        &mut self,
        source: &mut S,
        delta: &mut u32,
        buffer: &mut [i16],
        limit: usize,
        stride: usize,
    ) -> usize {
        let mut s = 0;
        loop {
            let next = self.sample_offset as i64 + self.cycles_per_sample as i64;
            let cycles = (next >> FIXP_SHIFT).max(0);
            if cycles > *delta as i64 {
                break;
            }
            if s >= limit {
                return s;
            }
            self.clock_keeping_previous(source, cycles as u32);
            *delta -= cycles as u32;
            self.sample_offset = (next & FIXP_MASK) as i32;

            let now = source.output();
            let prev = self.sample_prev as i64;
            let blended = prev + ((self.sample_offset as i64 * (now as i64 - prev)) >> FIXP_SHIFT);
            buffer[s * stride] = blended as i16;
            self.sample_prev = now;
            s += 1;
        }

        self.clock_keeping_previous(source, *delta);
        self.consume_tail(delta);
        s
    }

    /// Clock `cycles` cycles, remembering the output before the last one
    fn clock_keeping_previous<S: CycleSource>(&mut self, source: &mut S, cycles: u32) {
        if cycles == 0 {
            return;
        }
        for _ in 1..cycles {
            source.clock();
        }
        self.sample_prev = source.output();
        source.clock();
    }

    fn render_resample<S: CycleSource>(
        &mut self,
        source: &mut S,
        delta: &mut u32,
        buffer: &mut [i16],
        limit: usize,
        stride: usize,
    ) -> usize {
        let mut s = 0;
        loop {
            let next = self.sample_offset as i64 + self.cycles_per_sample as i64;
            let cycles = (next >> FIXP_SHIFT).max(0);
            if cycles > *delta as i64 {
                break;
            }
            if s >= limit {
                return s;
            }
            for _ in 0..cycles {
                source.clock();
                self.push(source.output());
            }
            *delta -= cycles as u32;
            self.sample_offset = (next & FIXP_MASK) as i32;

            buffer[s * stride] = match self.method {
                SamplingMethod::ResampleFast => self.convolve_nearest(),
                _ => self.convolve_blended(),
            };
            s += 1;
        }

        for _ in 0..*delta {
            source.clock();
            self.push(source.output());
        }
        self.consume_tail(delta);
        s
    }

    #[inline]
    fn consume_tail(&mut self, delta: &mut u32) {
        self.sample_offset = (self.sample_offset as i64 - ((*delta as i64) << FIXP_SHIFT)) as i32;
        *delta = 0;
    }

    #[inline]
    fn push(&mut self, sample: i16) {
        self.history[self.sample_index] = sample;
        self.history[self.sample_index + RING_SIZE] = sample;
        self.sample_index = (self.sample_index + 1) & (RING_SIZE - 1);
    }

    #[inline]
    fn dot(&self, start: usize, table: usize) -> i64 {
        let samples = &self.history[start..start + self.fir_n];
        let taps = &self.fir[table * self.fir_n..(table + 1) * self.fir_n];
        samples
            .iter()
            .zip(taps)
            .map(|(&x, &h)| x as i64 * h as i64)
            .sum()
    }

    fn convolve_blended(&self) -> i16 {
        let phase = self.sample_offset as i64 * self.fir_res as i64;
        let mut table = (phase >> FIXP_SHIFT) as usize;
        let remainder = phase & FIXP_MASK;
        let mut start = self.sample_index + RING_SIZE - self.fir_n;

        let v1 = self.dot(start, table);

        // Next phase table; past the last one wrap to the first, one cycle back
        table += 1;
        if table == self.fir_res {
            table = 0;
            start -= 1;
        }
        let v2 = self.dot(start, table);

        let v = v1 + ((remainder * (v2 - v1)) >> FIXP_SHIFT);
        saturate(v >> FIR_SHIFT)
    }

    fn convolve_nearest(&self) -> i16 {
        let table = ((self.sample_offset as i64 * self.fir_res as i64) >> FIXP_SHIFT) as usize;
        let start = self.sample_index + RING_SIZE - self.fir_n;
        saturate(self.dot(start, table) >> FIR_SHIFT)
    }

    /// Capture the running state
    pub fn read_state(&self) -> SamplerState {
        SamplerState {
            sample_offset: self.sample_offset,
            sample_prev: self.sample_prev,
            sample_index: self.sample_index as u32,
            history: self.history.get(..RING_SIZE).map(<[i16]>::to_vec).unwrap_or_default(),
        }
    }

    /// Restore the running state
    ///
    /// A history of the wrong length is rejected; an empty history clears
    /// the ring.
    pub fn write_state(&mut self, state: &SamplerState) -> Result<()> {
        if !self.history.is_empty() && !state.history.is_empty() && state.history.len() != RING_SIZE {
            return Err(SidError::SnapshotError(format!(
                "sample history has {} entries, expected {RING_SIZE}",
                state.history.len()
            )));
        }

        self.sample_offset = state.sample_offset;
        self.sample_prev = state.sample_prev;
        self.sample_index = state.sample_index as usize & (RING_SIZE - 1);
        if !self.history.is_empty() {
            if state.history.is_empty() {
                self.history.fill(0);
            } else {
                self.history[..RING_SIZE].copy_from_slice(&state.history);
                self.history[RING_SIZE..].copy_from_slice(&state.history);
            }
        }
        Ok(())
    }
}

impl Default for Sampler {
    /// `Fast` sampling of a PAL clock at 44.1 kHz
    fn default() -> Self {
        let config = SamplingConfig::default();
        Self {
            method: SamplingMethod::Fast,
            clock_frequency: config.clock_frequency,
            cycles_per_sample: fixed_cycles_per_sample(config.clock_frequency, config.sample_frequency),
            sample_offset: 0,
            sample_prev: 0,
            sample_index: 0,
            history: Vec::new(),
            fir: Vec::new(),
            fir_n: 0,
            fir_res: 0,
        }
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("method", &self.method)
            .field("cycles_per_sample", &self.cycles_per_sample)
            .field("sample_offset", &self.sample_offset)
            .field("fir_n", &self.fir_n)
            .field("fir_res", &self.fir_res)
            .finish_non_exhaustive()
    }
}

#[inline]
fn saturate(v: i64) -> i16 {
    v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

fn fixed_cycles_per_sample(clock_frequency: f64, sample_frequency: f64) -> i32 {
    (clock_frequency / sample_frequency * (1u32 << FIXP_SHIFT) as f64 + 0.5) as i32
}

/// Kaiser window FIR parameters
#[derive(Debug, Clone, Copy)]
struct FirDesign {
    beta: f64,
    wc: f64,
    cycles_per_sample: f64,
    length: usize,
    resolution: usize,
}

impl FirDesign {
    fn new(config: &SamplingConfig) -> Self {
        let pi = std::f64::consts::PI;
        let pass = config.effective_pass_frequency();
        let cycles_per_sample = config.cycles_per_sample();

        // 16 bits -> -96 dB stopband attenuation
        let attenuation = -20.0 * (1.0 / (1u32 << 16) as f64).log10();
        // The transition band takes what is left of the bandwidth, and the
        // cutoff sits in its middle
        let dw = (1.0 - 2.0 * pass / config.sample_frequency) * pi;
        let wc = (2.0 * pass / config.sample_frequency + 1.0) * pi / 2.0;

        // Kaiser order estimate, rounded up to an even number of zero crossings
        let beta = 0.1102 * (attenuation - 8.7);
        let mut order = ((attenuation - 7.95) / (2.285 * dw) + 0.5) as usize;
        order += order & 1;

        // Odd length so the sinc is symmetric about its centre tap
        let length = ((order as f64 * cycles_per_sample) as usize + 1) | 1;

        // A power of two keeps the 16.16 phase an exact multiple of the
        // table spacing
        let min_resolution = match config.method {
            SamplingMethod::ResampleFast => FIR_RES_FAST,
            _ => FIR_RES_INTERPOLATE,
        };
        let exponent = (min_resolution / cycles_per_sample).log2().ceil().max(0.0) as u32;

        Self {
            beta,
            wc,
            cycles_per_sample,
            length,
            resolution: 1usize << exponent.min(20),
        }
    }

    fn tables(&self, filter_scale: f64) -> Vec<i16> {
        let pi = std::f64::consts::PI;
        let i0_beta = bessel_i0(self.beta);
        let half = (self.length / 2) as f64;
        let half_taps = (self.length / 2) as i64;
        let gain = (1u32 << FIR_SHIFT) as f64 * filter_scale / self.cycles_per_sample * self.wc / pi;

        let mut fir = vec![0i16; self.length * self.resolution];
        for (phase, table) in fir.chunks_exact_mut(self.length).enumerate() {
            let offset = phase as f64 / self.resolution as f64;
            for (tap, coefficient) in table.iter_mut().enumerate() {
                let jx = (tap as i64 - half_taps) as f64 - offset;
                let wt = self.wc * jx / self.cycles_per_sample;
                let temp = jx / half;
                let kaiser = if temp.abs() <= 1.0 {
                    bessel_i0(self.beta * (1.0 - temp * temp).sqrt()) / i0_beta
                } else {
                    0.0
                };
                let sinc = if wt.abs() >= 1e-6 { wt.sin() / wt } else { 1.0 };
                *coefficient = (gain * sinc * kaiser).round() as i16;
            }
        }
        fir
    }
}

/// Zeroth-order modified Bessel function of the first kind (series)
fn bessel_i0(x: f64) -> f64 {
    const I0E: f64 = 1e-6;
    let half_x = x / 2.0;
    let mut sum = 1.0;
    let mut u = 1.0;
    let mut n = 1.0;
    loop {
        let temp = half_x / n;
        n += 1.0;
        u *= temp * temp;
        sum += u;
        if u < I0E * sum {
            return sum;
        }
    }
}
