//! Binary state snapshots
//!
//! Compact little-endian encoding of [`SidState`]:
//!
//! ```text
//! "SID6"  magic
//! u8      format version (1)
//! u16     chip part number (6581 / 8580)
//! [u8;25] register image, u8 bus value, u32 bus ttl, i32 external input
//! 3x      voice: oscillator, envelope, mute flag
//! [u8;3]  sync sources
//!         filter, output stage
//!         sampler: i32 offset, i16 previous sample, u32 index,
//!         u32 history length + i16 history
//! ```
//!
//! Booleans are stored as a single 0/1 byte; any other value is rejected.

use std::io::Write;

use nom::bytes::complete::{tag, take};
use nom::combinator::{eof, map_res, verify};
use nom::error::{Error, ErrorKind};
use nom::multi::count;
use nom::number::complete::{le_i16, le_i32, le_u16, le_u32, le_u8};
use nom::IResult;

use crate::config::ChipModel;
use crate::sampler::SamplerState;
use crate::sid::chip::SidState;
use crate::sid::envelope::{EnvelopePhase, EnvelopeState};
use crate::sid::external_filter::ExternalFilterState;
use crate::sid::filter::FilterState;
use crate::sid::oscillator::OscillatorState;
use crate::sid::registers::NUM_WRITE_REGISTERS;
use crate::sid::voice::VoiceState;
use crate::{Result, SidError};

/// File magic
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"SID6";

/// Current format version
pub const SNAPSHOT_VERSION: u8 = 1;

/// Encode `state` and write it to `writer`
pub fn write_snapshot<W: Write>(state: &SidState, mut writer: W) -> Result<()> {
    let mut out = Vec::with_capacity(256 + state.sampler.history.len() * 2);
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.push(SNAPSHOT_VERSION);
    out.extend_from_slice(&state.chip_model.part_number().to_le_bytes());
    out.extend_from_slice(&state.registers);
    out.push(state.bus_value);
    out.extend_from_slice(&state.bus_value_ttl.to_le_bytes());
    out.extend_from_slice(&state.ext_in.to_le_bytes());
    for voice in &state.voices {
        put_voice(&mut out, voice);
    }
    out.extend_from_slice(&state.sync_sources);
    put_filter(&mut out, &state.filter);
    put_external_filter(&mut out, &state.external_filter);
    put_sampler(&mut out, &state.sampler)?;

    writer.write_all(&out)?;
    Ok(())
}

/// Decode a snapshot produced by [`write_snapshot`]
///
/// # Errors
///
/// `SnapshotError` for a wrong magic, an unsupported version, truncated or
/// trailing data, or out-of-range field values.
pub fn parse_snapshot(data: &[u8]) -> Result<SidState> {
    let (rest, _) = tag::<_, _, Error<&[u8]>>(&SNAPSHOT_MAGIC[..])(data)
        .map_err(|_| SidError::SnapshotError("not a SID snapshot".into()))?;
    let (rest, version) =
        le_u8::<_, Error<&[u8]>>(rest).map_err(|_| SidError::SnapshotError("missing version".into()))?;
    if version != SNAPSHOT_VERSION {
        return Err(SidError::SnapshotError(format!(
            "unsupported snapshot version {version}"
        )));
    }

    let (_, state) = sid_state(rest).map_err(|err| {
        SidError::SnapshotError(match err {
            nom::Err::Incomplete(_) => "truncated snapshot".to_string(),
            nom::Err::Error(e) | nom::Err::Failure(e) => format!(
                "malformed snapshot at byte {} ({:?})",
                data.len() - e.input.len(),
                e.code
            ),
        })
    })?;
    Ok(state)
}

fn put_bool(out: &mut Vec<u8>, value: bool) {
    out.push(value as u8);
}

fn put_voice(out: &mut Vec<u8>, voice: &VoiceState) {
    let osc = &voice.oscillator;
    out.extend_from_slice(&osc.accumulator.to_le_bytes());
    out.extend_from_slice(&osc.shift_register.to_le_bytes());
    out.extend_from_slice(&osc.freq.to_le_bytes());
    out.extend_from_slice(&osc.pulse_width.to_le_bytes());
    out.push(osc.waveform);
    put_bool(out, osc.test);
    put_bool(out, osc.ring_mod);
    put_bool(out, osc.sync);
    put_bool(out, osc.msb_rising);

    let env = &voice.envelope;
    out.extend_from_slice(&[env.attack, env.decay, env.sustain, env.release]);
    put_bool(out, env.gate);
    out.push(match env.phase {
        EnvelopePhase::Attack => 0,
        EnvelopePhase::DecaySustain => 1,
        EnvelopePhase::Release => 2,
    });
    out.push(env.envelope_counter);
    out.extend_from_slice(&env.rate_counter.to_le_bytes());
    out.extend_from_slice(&env.rate_period.to_le_bytes());
    out.extend_from_slice(&env.exponential_counter.to_le_bytes());
    out.extend_from_slice(&env.exponential_counter_period.to_le_bytes());
    put_bool(out, env.hold_zero);

    put_bool(out, voice.muted);
}

fn put_filter(out: &mut Vec<u8>, filter: &FilterState) {
    put_bool(out, filter.enabled);
    out.extend_from_slice(&filter.cutoff.to_le_bytes());
    out.push(filter.resonance);
    out.push(filter.routing);
    put_bool(out, filter.voice3_off);
    out.push(filter.mode);
    out.push(filter.volume);
    for v in [filter.vhp, filter.vbp, filter.vlp, filter.vnf] {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn put_external_filter(out: &mut Vec<u8>, ext: &ExternalFilterState) {
    put_bool(out, ext.enabled);
    for v in [ext.vlp, ext.vhp, ext.vo] {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn put_sampler(out: &mut Vec<u8>, sampler: &SamplerState) -> Result<()> {
    out.extend_from_slice(&sampler.sample_offset.to_le_bytes());
    out.extend_from_slice(&sampler.sample_prev.to_le_bytes());
    out.extend_from_slice(&sampler.sample_index.to_le_bytes());
    let len = u32::try_from(sampler.history.len())
        .map_err(|_| SidError::SnapshotError("sample history too long".into()))?;
    out.extend_from_slice(&len.to_le_bytes());
    for sample in &sampler.history {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    Ok(())
}

fn boolean(input: &[u8]) -> IResult<&[u8], bool> {
    map_res(le_u8, |b| match b {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err("boolean out of range"),
    })(input)
}

fn chip_model(input: &[u8]) -> IResult<&[u8], ChipModel> {
    map_res(le_u16, ChipModel::from_part_number)(input)
}

fn envelope_phase(input: &[u8]) -> IResult<&[u8], EnvelopePhase> {
    map_res(le_u8, |b| match b {
        0 => Ok(EnvelopePhase::Attack),
        1 => Ok(EnvelopePhase::DecaySustain),
        2 => Ok(EnvelopePhase::Release),
        _ => Err("unknown envelope phase"),
    })(input)
}

fn oscillator(input: &[u8]) -> IResult<&[u8], OscillatorState> {
    let (input, accumulator) = le_u32(input)?;
    let (input, shift_register) = le_u32(input)?;
    let (input, freq) = le_u16(input)?;
    let (input, pulse_width) = le_u16(input)?;
    let (input, waveform) = le_u8(input)?;
    let (input, test) = boolean(input)?;
    let (input, ring_mod) = boolean(input)?;
    let (input, sync) = boolean(input)?;
    let (input, msb_rising) = boolean(input)?;
    Ok((
        input,
        OscillatorState {
            accumulator,
            shift_register,
            freq,
            pulse_width,
            waveform,
            test,
            ring_mod,
            sync,
            msb_rising,
        },
    ))
}

fn envelope(input: &[u8]) -> IResult<&[u8], EnvelopeState> {
    verify(envelope_fields, |state: &EnvelopeState| state.validate().is_ok())(input)
}

fn envelope_fields(input: &[u8]) -> IResult<&[u8], EnvelopeState> {
    let (input, attack) = le_u8(input)?;
    let (input, decay) = le_u8(input)?;
    let (input, sustain) = le_u8(input)?;
    let (input, release) = le_u8(input)?;
    let (input, gate) = boolean(input)?;
    let (input, phase) = envelope_phase(input)?;
    let (input, envelope_counter) = le_u8(input)?;
    let (input, rate_counter) = le_u16(input)?;
    let (input, rate_period) = le_u16(input)?;
    let (input, exponential_counter) = le_u16(input)?;
    let (input, exponential_counter_period) = le_u16(input)?;
    let (input, hold_zero) = boolean(input)?;
    Ok((
        input,
        EnvelopeState {
            attack,
            decay,
            sustain,
            release,
            gate,
            phase,
            envelope_counter,
            rate_counter,
            rate_period,
            exponential_counter,
            exponential_counter_period,
            hold_zero,
        },
    ))
}

fn voice(input: &[u8]) -> IResult<&[u8], VoiceState> {
    let (input, oscillator) = oscillator(input)?;
    let (input, envelope) = envelope(input)?;
    let (input, muted) = boolean(input)?;
    Ok((
        input,
        VoiceState {
            oscillator,
            envelope,
            muted,
        },
    ))
}

fn filter(input: &[u8]) -> IResult<&[u8], FilterState> {
    let (input, enabled) = boolean(input)?;
    let (input, cutoff) = le_u16(input)?;
    let (input, resonance) = le_u8(input)?;
    let (input, routing) = le_u8(input)?;
    let (input, voice3_off) = boolean(input)?;
    let (input, mode) = le_u8(input)?;
    let (input, volume) = le_u8(input)?;
    let (input, vhp) = le_i32(input)?;
    let (input, vbp) = le_i32(input)?;
    let (input, vlp) = le_i32(input)?;
    let (input, vnf) = le_i32(input)?;
    Ok((
        input,
        FilterState {
            enabled,
            cutoff,
            resonance,
            routing,
            voice3_off,
            mode,
            volume,
            vhp,
            vbp,
            vlp,
            vnf,
        },
    ))
}

fn external_filter(input: &[u8]) -> IResult<&[u8], ExternalFilterState> {
    let (input, enabled) = boolean(input)?;
    let (input, vlp) = le_i32(input)?;
    let (input, vhp) = le_i32(input)?;
    let (input, vo) = le_i32(input)?;
    Ok((
        input,
        ExternalFilterState {
            enabled,
            vlp,
            vhp,
            vo,
        },
    ))
}

fn sampler(input: &[u8]) -> IResult<&[u8], SamplerState> {
    let (input, sample_offset) = le_i32(input)?;
    let (input, sample_prev) = le_i16(input)?;
    let (input, sample_index) = le_u32(input)?;
    let (input, len) = le_u32(input)?;
    // Reject lengths the remaining input cannot hold before allocating
    if (input.len() as u64) < len as u64 * 2 {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Count)));
    }
    let (input, history) = count(le_i16, len as usize)(input)?;
    Ok((
        input,
        SamplerState {
            sample_offset,
            sample_prev,
            sample_index,
            history,
        },
    ))
}

fn sid_state(input: &[u8]) -> IResult<&[u8], SidState> {
    let (input, chip_model) = chip_model(input)?;
    let (input, image) = take(NUM_WRITE_REGISTERS)(input)?;
    let mut registers = [0u8; NUM_WRITE_REGISTERS];
    registers.copy_from_slice(image);
    let (input, bus_value) = le_u8(input)?;
    let (input, bus_value_ttl) = le_u32(input)?;
    let (input, ext_in) = le_i32(input)?;
    let (input, v1) = voice(input)?;
    let (input, v2) = voice(input)?;
    let (input, v3) = voice(input)?;
    let (input, s1) = le_u8(input)?;
    let (input, s2) = le_u8(input)?;
    let (input, s3) = le_u8(input)?;
    let (input, filter) = filter(input)?;
    let (input, external_filter) = external_filter(input)?;
    let (input, sampler) = sampler(input)?;
    let (input, _) = eof(input)?;
    Ok((
        input,
        SidState {
            chip_model,
            registers,
            bus_value,
            bus_value_ttl,
            ext_in,
            voices: [v1, v2, v3],
            sync_sources: [s1, s2, s3],
            filter,
            external_filter,
            sampler,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sid::constants::RATE_COUNTER_PERIOD;
    use crate::config::{SamplingConfig, SamplingMethod};
    use crate::sid::Sid;

    fn busy_sid() -> Sid {
        let mut sid = Sid::new(ChipModel::Mos8580);
        sid.set_sampling_parameters(&SamplingConfig {
            method: SamplingMethod::ResampleInterpolate,
            ..SamplingConfig::default()
        })
        .unwrap();
        for (addr, value) in [
            (0x18, 0x3f),
            (0x17, 0xf1),
            (0x16, 0x40),
            (0x05, 0x22),
            (0x06, 0xa4),
            (0x01, 0x11),
            (0x04, 0x41),
            (0x0f, 0x07),
            (0x12, 0x81),
        ] {
            sid.write(addr, value);
        }
        let mut buffer = [0i16; 64];
        let mut cycles = 1_000;
        sid.render(&mut cycles, &mut buffer, 64, 1);
        sid
    }

    #[test]
    fn test_snapshot_round_trip() {
        let state = busy_sid().read_state();
        let mut bytes = Vec::new();
        write_snapshot(&state, &mut bytes).unwrap();
        assert_eq!(&bytes[..4], SNAPSHOT_MAGIC);
        assert_eq!(parse_snapshot(&bytes).unwrap(), state);
    }

    #[test]
    fn test_rejects_bad_header() {
        assert!(parse_snapshot(b"").is_err());
        assert!(parse_snapshot(b"YM6!....").is_err());

        let mut bytes = Vec::new();
        write_snapshot(&Sid::default().read_state(), &mut bytes).unwrap();
        bytes[4] = 99;
        assert!(matches!(
            parse_snapshot(&bytes),
            Err(SidError::SnapshotError(msg)) if msg.contains("version")
        ));
    }

    #[test]
    fn test_rejects_truncated_and_trailing() {
        let mut bytes = Vec::new();
        write_snapshot(&busy_sid().read_state(), &mut bytes).unwrap();
        assert!(parse_snapshot(&bytes[..bytes.len() - 1]).is_err());
        assert!(parse_snapshot(&bytes[..40]).is_err());
        bytes.push(0);
        assert!(parse_snapshot(&bytes).is_err());
    }

    #[test]
    fn test_rejects_bad_fields() {
        let mut bytes = Vec::new();
        write_snapshot(&Sid::default().read_state(), &mut bytes).unwrap();

        let mut model = bytes.clone();
        model[5..7].copy_from_slice(&6582u16.to_le_bytes());
        assert!(parse_snapshot(&model).is_err());

        // First voice test flag follows magic, version, model, registers,
        // bus fields and 13 oscillator bytes
        let test_flag = 4 + 1 + 2 + NUM_WRITE_REGISTERS + 1 + 4 + 4 + 13;
        let mut flag = bytes.clone();
        assert!(flag[test_flag] <= 1);
        flag[test_flag] = 2;
        assert!(parse_snapshot(&flag).is_err());
    }

    #[test]
    fn test_rejects_impossible_envelope_period() {
        let mut bytes = Vec::new();
        write_snapshot(&busy_sid().read_state(), &mut bytes).unwrap();

        // Rate period of the first voice: after the oscillator flags, four
        // ADSR nibbles, gate, phase, counter and the rate counter
        let rate_period = 4 + 1 + 2 + NUM_WRITE_REGISTERS + 1 + 4 + 4 + 13 + 4 + 4 + 3 + 2;
        let mut zero = bytes.clone();
        assert!(RATE_COUNTER_PERIOD.contains(&u16::from_le_bytes([
            zero[rate_period],
            zero[rate_period + 1]
        ])));
        zero[rate_period..rate_period + 2].copy_from_slice(&0u16.to_le_bytes());
        assert!(parse_snapshot(&zero).is_err());
    }
}
