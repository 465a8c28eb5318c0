//! DTMF tone and silence synthesis in telephony µ-law.

use std::f64::consts::PI;

use super::g711::linear_to_ulaw;
use super::{TELEPHONY_SAMPLE_RATE, ULAW_BYTES_PER_MS, ULAW_SILENCE};

/// Peak amplitude of each of the two sine components.
///
/// Two components at this level sum to at most 80% of full scale.
pub const DTMF_AMPLITUDE: f64 = 0.4 * i16::MAX as f64;

/// Short pause inserted by `w` in a dial string.
const SHORT_WAIT_MS: u32 = 500;
/// Long pause inserted by `W` in a dial string.
const LONG_WAIT_MS: u32 = 1000;

/// Low/high frequency pair for a keypad digit.
pub fn dtmf_frequencies(digit: char) -> Option<(f64, f64)> {
    let pair = match digit {
        '1' => (697.0, 1209.0),
        '2' => (697.0, 1336.0),
        '3' => (697.0, 1477.0),
        'A' => (697.0, 1633.0),
        '4' => (770.0, 1209.0),
        '5' => (770.0, 1336.0),
        '6' => (770.0, 1477.0),
        'B' => (770.0, 1633.0),
        '7' => (852.0, 1209.0),
        '8' => (852.0, 1336.0),
        '9' => (852.0, 1477.0),
        'C' => (852.0, 1633.0),
        '*' => (941.0, 1209.0),
        '0' => (941.0, 1336.0),
        '#' => (941.0, 1477.0),
        'D' => (941.0, 1633.0),
        _ => return None,
    };
    Some(pair)
}

/// Generate a DTMF tone as 8 kHz µ-law.
///
/// Returns an empty buffer for a digit outside the keypad table.
pub fn synthesize_dtmf_tone(digit: char, duration_ms: u32) -> Vec<u8> {
    let Some((low, high)) = dtmf_frequencies(digit) else {
        return Vec::new();
    };

    let rate = TELEPHONY_SAMPLE_RATE as f64;
    let sample_count = duration_ms as usize * ULAW_BYTES_PER_MS;

    (0..sample_count)
        .map(|n| {
            let t = n as f64 / rate;
            let value = DTMF_AMPLITUDE * ((2.0 * PI * low * t).sin() + (2.0 * PI * high * t).sin());
            linear_to_ulaw(value.round() as i16)
        })
        .collect()
}

/// µ-law silence of the given length.
pub fn synthesize_silence(duration_ms: u32) -> Vec<u8> {
    vec![ULAW_SILENCE; duration_ms as usize * ULAW_BYTES_PER_MS]
}

/// True when every character is a keypad digit, a wait (`w`/`W`) or a space.
pub fn is_dial_string(digits: &str) -> bool {
    !digits.trim().is_empty()
        && digits
            .chars()
            .all(|c| matches!(c, 'w' | 'W' | ' ') || dtmf_frequencies(c).is_some())
}

/// Expand a dial string into playback-ordered µ-law chunks.
///
/// `w` waits 500 ms, `W` waits 1000 ms, spaces and unknown characters are
/// skipped, and every keypad digit becomes a tone followed by a pause.
pub fn build_dtmf_sequence(digits: &str, tone_ms: u32, pause_ms: u32) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    for c in digits.chars() {
        match c {
            'w' => chunks.push(synthesize_silence(SHORT_WAIT_MS)),
            'W' => chunks.push(synthesize_silence(LONG_WAIT_MS)),
            ' ' => {}
            _ if dtmf_frequencies(c).is_some() => {
                chunks.push(synthesize_dtmf_tone(c, tone_ms));
                chunks.push(synthesize_silence(pause_ms));
            }
            _ => {
                tracing::debug!(digit = %c, "Skipping unmapped DTMF character");
            }
        }
    }
    chunks
}
