//! G.711 µ-law codec with 8 kHz <-> 16 kHz rate conversion.

use super::BACKEND_INPUT_SAMPLE_RATE;

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32635;

/// Decode a single µ-law byte into a linear 16-bit sample.
#[inline]
pub fn ulaw_to_linear(byte: u8) -> i16 {
    let u = !byte;
    let sign = u & 0x80;
    let exponent = ((u >> 4) & 0x07) as i32;
    let mantissa = (u & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + ULAW_BIAS) << exponent) - ULAW_BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Encode a linear 16-bit sample as µ-law.
#[inline]
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let value = sample as i32;
    let sign: u8 = if value < 0 { 0x80 } else { 0x00 };
    let magnitude = value.abs().min(ULAW_CLIP) + ULAW_BIAS;

    let mut exponent: u8 = 7;
    while exponent > 0 && magnitude & (1 << (exponent as i32 + 7)) == 0 {
        exponent -= 1;
    }

    let mantissa = ((magnitude >> (exponent as i32 + 3)) & 0x0F) as u8;
    !(sign | (exponent << 4) | mantissa)
}

/// Linear interpolation from 8 kHz to 16 kHz.
///
/// Each sample is followed by the average of itself and its successor; the
/// last sample is repeated.
pub fn upsample_8k_to_16k(samples: &[i16]) -> Vec<i16> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for (i, &current) in samples.iter().enumerate() {
        let next = samples.get(i + 1).copied().unwrap_or(current);
        out.push(current);
        out.push(((current as i32 + next as i32) >> 1) as i16);
    }
    out
}

/// Decode a telephony µ-law frame into 16 kHz PCM.
///
/// The output always holds exactly twice as many samples as `frame` has bytes.
pub fn expand_ulaw_to_pcm16k(frame: &[u8]) -> Vec<i16> {
    let decoded: Vec<i16> = frame.iter().map(|&b| ulaw_to_linear(b)).collect();
    upsample_8k_to_16k(&decoded)
}

/// Encode PCM as 8 kHz µ-law.
///
/// 16 kHz input is decimated by keeping every second sample, without any
/// filtering. Any other rate is treated as already being 8 kHz.
pub fn compress_pcm_to_ulaw(samples: &[i16], input_rate_hz: u32) -> Vec<u8> {
    if input_rate_hz == BACKEND_INPUT_SAMPLE_RATE {
        samples.iter().step_by(2).map(|&s| linear_to_ulaw(s)).collect()
    } else {
        samples.iter().map(|&s| linear_to_ulaw(s)).collect()
    }
}
