//! Audio transcoding between the telephony leg and the realtime backend.
//!
//! Everything in this module is a pure function over byte or sample slices,
//! so any number of bridges can call into it concurrently.
//!
//! # Formats
//!
//! - Telephony: G.711 µ-law, 8 kHz, mono
//! - Backend input: PCM 16-bit signed little-endian, 16 kHz, mono
//! - Backend output: G.711 µ-law, 8 kHz, mono
//!
//! # Example
//!
//! ```rust
//! use callbridge::core::audio::{compress_pcm_to_ulaw, expand_ulaw_to_pcm16k};
//!
//! let frame = vec![0x80u8, 0x10, 0xEF];
//! let pcm = expand_ulaw_to_pcm16k(&frame);
//! assert_eq!(pcm.len(), frame.len() * 2);
//! assert_eq!(compress_pcm_to_ulaw(&pcm, 16_000), frame);
//! ```

mod dtmf;
mod g711;

use base64::prelude::*;

pub use dtmf::{
    DTMF_AMPLITUDE, build_dtmf_sequence, dtmf_frequencies, is_dial_string, synthesize_dtmf_tone,
    synthesize_silence,
};
pub use g711::{
    compress_pcm_to_ulaw, expand_ulaw_to_pcm16k, linear_to_ulaw, ulaw_to_linear,
    upsample_8k_to_16k,
};

/// Sample rate of the telephony media stream.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Sample rate of PCM audio sent to the realtime backend.
pub const BACKEND_INPUT_SAMPLE_RATE: u32 = 16000;

/// µ-law encoding of a zero sample.
pub const ULAW_SILENCE: u8 = 0xFF;

/// µ-law samples per millisecond at 8 kHz.
pub const ULAW_BYTES_PER_MS: usize = (TELEPHONY_SAMPLE_RATE / 1000) as usize;

/// Encode a byte slice as standard base64.
#[inline]
pub fn encode_base64(data: &[u8]) -> String {
    BASE64_STANDARD.encode(data)
}

/// Decode standard base64 text into bytes.
#[inline]
pub fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64_STANDARD.decode(text)
}

/// Serialize PCM samples in little-endian byte order.
pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Parse little-endian PCM bytes into samples. A trailing odd byte is ignored.
pub fn le_bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
