use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Sample rate of PCM16 audio exchanged with the realtime API, in both directions.
pub const REALTIME_API_PCM16_SAMPLE_RATE: u32 = 24000;

/// Microphone sample rates accepted from the browser.
pub const SUPPORTED_INPUT_RATES: std::ops::RangeInclusive<u32> = 8000..=48000;

/// Frames fed to the resampler per call.
const RESAMPLER_CHUNK_SIZE: usize = 480;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,                     // No cutoff frequency, pass all frequencies
        PolynomialDegree::Cubic, // Cubic interpolation for quality
        chunk_size,
        1, // 1 channel (mono)
    )?;
    Ok(resampler)
}

/// Turns a stream of little-endian byte frames into PCM16 samples.
///
/// Frames need not be sample-aligned: a trailing odd byte is held and joined
/// with the first byte of the next frame.
#[derive(Debug, Default)]
pub struct Pcm16Decoder {
    carry: Option<u8>,
}

impl Pcm16Decoder {
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<i16> {
        let mut samples = Vec::with_capacity(bytes.len().div_ceil(2));
        let mut rest = bytes;
        if let Some(low) = self.carry.take() {
            let Some((&high, tail)) = rest.split_first() else {
                self.carry = Some(low);
                return samples;
            };
            samples.push(i16::from_le_bytes([low, high]));
            rest = tail;
        }

        let chunks = rest.chunks_exact(2);
        self.carry = chunks.remainder().first().copied();
        samples.extend(chunks.map(|c| i16::from_le_bytes([c[0], c[1]])));
        samples
    }

    /// Forgets any held byte, e.g. when a new recording starts.
    pub fn reset(&mut self) {
        self.carry = None;
    }
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// Encodes PCM16 samples as base64 little-endian bytes, the realtime API's audio format.
pub fn encode_i16(pcm16: &[i16]) -> String {
    let pcm16_bytes: Vec<u8> = pcm16
        .iter()
        .flat_map(|&sample| sample.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&pcm16_bytes)
}

/// Decodes a base64 audio payload sent by the browser.
pub fn decode_base64(fragment: &str) -> Vec<u8> {
    match base64::engine::general_purpose::STANDARD.decode(fragment) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to decode base64 audio fragment");
            Vec::new()
        }
    }
}

/// Streaming mono resampler for microphone input.
///
/// The browser sends arbitrarily sized chunks while the resampler consumes a
/// fixed number of frames per call, so leftover samples are held until the
/// next chunk arrives.
pub struct InputResampler {
    resampler: FastFixedIn<f32>,
    pending: Vec<f32>,
}

impl InputResampler {
    /// Returns `None` when no conversion is needed.
    pub fn for_rate(input_rate: u32) -> anyhow::Result<Option<Self>> {
        if input_rate == REALTIME_API_PCM16_SAMPLE_RATE {
            return Ok(None);
        }
        anyhow::ensure!(
            SUPPORTED_INPUT_RATES.contains(&input_rate),
            "sample rate must be between {} and {} Hz",
            SUPPORTED_INPUT_RATES.start(),
            SUPPORTED_INPUT_RATES.end()
        );
        let resampler = create_resampler(
            input_rate as f64,
            REALTIME_API_PCM16_SAMPLE_RATE as f64,
            RESAMPLER_CHUNK_SIZE,
        )?;
        Ok(Some(Self {
            resampler,
            pending: Vec::new(),
        }))
    }

    /// Resamples as many whole chunks as are available.
    pub fn process(&mut self, pcm16: &[i16]) -> Vec<i16> {
        self.pending.extend(convert_i16_to_f32(pcm16));

        let mut resampled = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            match self.resampler.process(&[&self.pending[..needed]], None) {
                Ok(out) => resampled.extend_from_slice(&out[0]),
                Err(e) => {
                    tracing::error!(error = %e, "Resampling failed; dropping chunk");
                }
            }
            self.pending.drain(..needed);
        }
        convert_f32_to_i16(&resampled)
    }

    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }
}
