// PCM wire codec for the live service
//
// Outbound: f32 samples -> s16le -> base64, tagged with a MIME/rate string.
// Inbound: base64 -> s16le -> f32.
//
// The scale factors are intentionally asymmetric: encoding multiplies
// negative samples by 32768 and positive samples by 32767, decoding divides
// everything by 32768. A full-scale positive sample therefore comes back as
// 32767/32768. Downstream levels depend on this, so keep it as is.

use base64::Engine;

use crate::error::{BridgeError, BridgeResult};

/// Sample rate of captured audio sent to the service
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of synthesized audio received from the service
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Negative-side scale (and decode divisor)
const NEGATIVE_SCALE: f32 = 32768.0;

/// Positive-side scale
const POSITIVE_SCALE: f32 = 32767.0;

/// MIME tag for raw 16-bit PCM at the given rate
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// One outbound block, ready to hand to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64-encoded s16le PCM
    pub data: String,
}

/// One inbound block of normalized mono samples
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedFrame {
    /// Playback length in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Convert one float sample to i16.
///
/// Out-of-range input is clamped first. The float-to-int cast truncates
/// toward zero, and NaN maps to 0.
pub fn float_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * NEGATIVE_SCALE) as i16
    } else {
        (s * POSITIVE_SCALE) as i16
    }
}

/// Convert one i16 sample to a normalized float
pub fn i16_to_float(sample: i16) -> f32 {
    sample as f32 / NEGATIVE_SCALE
}

/// Pack float samples as little-endian 16-bit PCM
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| float_to_i16(s).to_le_bytes())
        .collect()
}

/// Unpack little-endian 16-bit PCM into normalized floats
pub fn decode_pcm16(bytes: &[u8]) -> BridgeResult<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(BridgeError::Decode(format!(
            "PCM payload has odd length ({} bytes)",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16_to_float(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

/// Encode a captured block for the wire
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> EncodedFrame {
    let pcm = encode_pcm16(samples);
    EncodedFrame {
        mime_type: pcm_mime_type(sample_rate),
        data: base64::engine::general_purpose::STANDARD.encode(pcm),
    }
}

/// Decode an inbound base64 payload at the given rate
pub fn decode_frame(data: &str, sample_rate: u32) -> BridgeResult<DecodedFrame> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
    let samples = decode_pcm16(&bytes)?;
    Ok(DecodedFrame {
        samples,
        sample_rate,
    })
}
