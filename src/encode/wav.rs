//! RIFF/WAVE (PCM) encoding.

use std::path::Path;

use crate::audio::AudioBuffer;
use crate::backend::{BitDepth, PcmDispatcher};
use crate::error::{EngineError, Result};

pub const HEADER_LEN: usize = 44;

/// Largest `data` chunk whose RIFF size (`36 + data`) still fits in 32 bits.
pub const MAX_DATA_LEN: u32 = u32::MAX - 36;

/// Canonical 44-byte header: RIFF chunk, 16-byte `fmt ` chunk (format 1),
/// then the `data` chunk header.
pub fn wav_header(channels: u16, sample_rate: u32, bit_depth: BitDepth, data_len: u32) -> Result<[u8; HEADER_LEN]> {
    if data_len > MAX_DATA_LEN {
        return Err(EngineError::DataTooLarge {
            bytes: data_len as usize,
        });
    }
    let bits = bit_depth.bits();
    let block_align = channels * (bits / 8);
    let byte_rate = sample_rate * block_align as u32;

    let mut header = [0u8; HEADER_LEN];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&(36 + data_len).to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_len.to_le_bytes());
    Ok(header)
}

/// Size of the `data` chunk for `frames` sample frames.
pub fn data_len(frames: usize, channels: usize, bit_depth: BitDepth) -> Result<u32> {
    let bytes = frames
        .checked_mul(channels)
        .and_then(|n| n.checked_mul(bit_depth.bytes()))
        .ok_or(EngineError::DataTooLarge { bytes: usize::MAX })?;
    u32::try_from(bytes)
        .ok()
        .filter(|&len| len <= MAX_DATA_LEN)
        .ok_or(EngineError::DataTooLarge { bytes })
}

enum Layout<'a> {
    Mono(&'a [f32]),
    Stereo(&'a [f32], &'a [f32]),
}

impl Layout<'_> {
    fn frames(&self) -> usize {
        match self {
            Layout::Mono(samples) => samples.len(),
            Layout::Stereo(left, _) => left.len(),
        }
    }
}

pub fn encode_wav(pcm: &PcmDispatcher, buffer: &AudioBuffer, bit_depth: BitDepth) -> Result<Vec<u8>> {
    encode_channels(pcm, &buffer.channels, buffer.sample_rate, bit_depth)
}

/// Encode one (mono) or two (stereo) channels.
pub fn encode_channels(
    pcm: &PcmDispatcher,
    channels: &[Vec<f32>],
    sample_rate: u32,
    bit_depth: BitDepth,
) -> Result<Vec<u8>> {
    let layout = match channels {
        [mono] => Layout::Mono(mono),
        [left, right] if left.len() != right.len() => {
            return Err(EngineError::ChannelLengthMismatch {
                left: left.len(),
                right: right.len(),
            })
        }
        [left, right] => Layout::Stereo(left, right),
        other => return Err(EngineError::UnsupportedChannels(other.len())),
    };
    let frames = layout.frames();

    let data_len = data_len(frames, channels.len(), bit_depth)?;
    let header = wav_header(channels.len() as u16, sample_rate, bit_depth, data_len)?;
    let mut out = vec![0u8; HEADER_LEN + data_len as usize];
    out[..HEADER_LEN].copy_from_slice(&header);

    let kernel = pcm.kernel();
    let data = &mut out[HEADER_LEN..];
    match (layout, bit_depth) {
        (Layout::Mono(mono), BitDepth::Sixteen) => kernel.mono_16(mono, data),
        (Layout::Mono(mono), BitDepth::TwentyFour) => kernel.mono_24(mono, data),
        (Layout::Stereo(left, right), BitDepth::Sixteen) => kernel.stereo_16(left, right, data),
        (Layout::Stereo(left, right), BitDepth::TwentyFour) => kernel.stereo_24(left, right, data),
    }

    log::debug!(
        "Encoded {} frame(s), {} channel(s), {}-bit with {} kernel",
        frames,
        channels.len(),
        bit_depth.bits(),
        kernel.name()
    );
    Ok(out)
}

pub fn write_wav(pcm: &PcmDispatcher, buffer: &AudioBuffer, bit_depth: BitDepth, path: &Path) -> Result<()> {
    let bytes = encode_wav(pcm, buffer, bit_depth)?;
    std::fs::write(path, &bytes)?;
    log::info!(
        "Wrote {} ({} bytes, {}-bit, {}Hz)",
        path.display(),
        bytes.len(),
        bit_depth.bits(),
        buffer.sample_rate
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;

    #[test]
    fn header_is_byte_exact() {
        let header = wav_header(2, 44100, BitDepth::Sixteen, 1000).unwrap();
        let expected: [u8; 44] = [
            b'R', b'I', b'F', b'F', 0x0C, 0x04, 0x00, 0x00, // 36 + 1000
            b'W', b'A', b'V', b'E',
            b'f', b'm', b't', b' ', 0x10, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x02, 0x00, // PCM, stereo
            0x44, 0xAC, 0x00, 0x00, // 44100
            0x10, 0xB1, 0x02, 0x00, // 176400
            0x04, 0x00, 0x10, 0x00, // block align 4, 16 bits
            b'd', b'a', b't', b'a', 0xE8, 0x03, 0x00, 0x00,
        ];
        assert_eq!(header, expected);
    }

    #[test]
    fn oversized_data_is_rejected() {
        assert_eq!(data_len(1000, 2, BitDepth::Sixteen).unwrap(), 4000);
        assert_eq!(data_len(0, 1, BitDepth::TwentyFour).unwrap(), 0);

        // 2^30 stereo 24-bit frames is 6 GiB of data.
        assert!(matches!(
            data_len(1 << 30, 2, BitDepth::TwentyFour),
            Err(EngineError::DataTooLarge { bytes }) if bytes == 6 << 30
        ));
        assert!(matches!(
            data_len(usize::MAX, 2, BitDepth::Sixteen),
            Err(EngineError::DataTooLarge { .. })
        ));

        let largest = (MAX_DATA_LEN / 4) as usize;
        assert_eq!(data_len(largest, 2, BitDepth::Sixteen).unwrap(), largest as u32 * 4);
        assert!(data_len(largest + 1, 2, BitDepth::Sixteen).is_err());

        assert!(wav_header(1, 8000, BitDepth::Sixteen, MAX_DATA_LEN).is_ok());
        assert!(matches!(
            wav_header(1, 8000, BitDepth::Sixteen, u32::MAX),
            Err(EngineError::DataTooLarge { .. })
        ));
    }

    #[test]
    fn mono_24_bit_layout() {
        let registry = BackendRegistry::reference_only();
        let buffer = AudioBuffer::mono(vec![1.0, -1.0, 0.0, 2.0], 48000);
        let bytes = encode_wav(registry.pcm(), &buffer, BitDepth::TwentyFour).unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 12);
        assert_eq!(&bytes[22..24], &1u16.to_le_bytes());
        assert_eq!(&bytes[28..32], &144000u32.to_le_bytes());
        assert_eq!(&bytes[34..36], &24u16.to_le_bytes());
        assert_eq!(
            &bytes[HEADER_LEN..],
            &[0xFF, 0xFF, 0x7F, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0x7F]
        );
    }

    #[test]
    fn stereo_16_interleaves_and_backends_match() {
        let left: Vec<f32> = (0..50_000).map(|n| (n as f32 * 0.01).sin()).collect();
        let right: Vec<f32> = left.iter().map(|s| -s * 0.5).collect();
        let buffer = AudioBuffer::new(vec![left, right], 44100);

        let reference = encode_wav(BackendRegistry::reference_only().pcm(), &buffer, BitDepth::Sixteen).unwrap();
        let accelerated = encode_wav(BackendRegistry::default().pcm(), &buffer, BitDepth::Sixteen).unwrap();
        assert_eq!(reference, accelerated);
        assert_eq!(reference.len(), HEADER_LEN + 50_000 * 4);

        let frame = &reference[HEADER_LEN + 4 * 100..HEADER_LEN + 4 * 101];
        let l = i16::from_le_bytes([frame[0], frame[1]]);
        let r = i16::from_le_bytes([frame[2], frame[3]]);
        assert_eq!(l, (buffer.channels[0][100] * 32767.0).round() as i16);
        assert_eq!(r, (buffer.channels[1][100] * 32767.0).round() as i16);
    }

    #[test]
    fn rejects_bad_channel_layouts() {
        let registry = BackendRegistry::reference_only();
        let three = AudioBuffer::new(vec![vec![0.0; 4]; 3], 8000);
        assert!(matches!(
            encode_wav(registry.pcm(), &three, BitDepth::Sixteen),
            Err(EngineError::UnsupportedChannels(3))
        ));

        let ragged = vec![vec![0.0; 4], vec![0.0; 5]];
        assert!(matches!(
            encode_channels(registry.pcm(), &ragged, 8000, BitDepth::Sixteen),
            Err(EngineError::ChannelLengthMismatch { left: 4, right: 5 })
        ));

        assert!(matches!(BitDepth::try_from(8), Err(EngineError::UnsupportedBitDepth(8))));
    }
}
