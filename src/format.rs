use crate::mount::MountError;
use crate::prelude::*;
use crate::serialise::Emitter;

// Format tags
const FORMAT_PCM: u16 = 1;
const FORMAT_IEEE_FLOAT: u16 = 3;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

// Everything after the first two bytes of the KSDATAFORMAT subtype GUID.
const EXTENSIBLE_GUID_SUFFIX: [u8; 14] =
    [0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    I16,
    I24,
    I32,
    F32,
}

impl SampleFormat {
    /// Bytes one sample occupies on the wire.
    pub fn container_bytes(&self) -> u16 {
        match self {
            SampleFormat::I16 => 2,
            SampleFormat::I24 => 3,
            SampleFormat::I32 | SampleFormat::F32 => 4,
        }
    }

    pub fn container_bits(&self) -> u16 {
        self.container_bytes() * 8
    }
}

/// The audio format of the wave file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    pub format: SampleFormat,
    pub sample_rate: u32,
    pub channels: u16,
    /// Valid bits per sample; at most `format.container_bits()`.
    pub bits_per_sample: u16,
}

impl Format {
    pub fn block_align(&self) -> u16 {
        self.channels * self.format.container_bytes()
    }
}

/// Parses a `fmt ` chunk payload into a [`Format`].
///
/// A `WAVE_FORMAT_EXTENSIBLE` layout is unwrapped to its inner tag; the
/// subtype GUID must carry the canonical suffix. Anything other than
/// PCM16/24/32 or Float32 is refused.
pub(crate) fn decode_format<'a>(payload: &[u8]) -> Result<Format, MountError<'a>> {
    if payload.len() < 16 {
        return Err(MountError::FmtInvalid);
    }

    let mut format_tag = LittleEndian::read_u16(&payload[0..]);
    let channels = LittleEndian::read_u16(&payload[2..]);
    let sample_rate = LittleEndian::read_u32(&payload[4..]);
    let block_align = LittleEndian::read_u16(&payload[12..]);
    let mut bits_per_sample = LittleEndian::read_u16(&payload[14..]);
    let container_bytes = (bits_per_sample as u32 + 7) / 8;

    if format_tag == FORMAT_EXTENSIBLE {
        if bits_per_sample % 8 != 0 || payload.len() < 18 {
            return Err(MountError::FmtInvalid);
        }
        let cbsz = LittleEndian::read_u16(&payload[16..]) as usize;
        if cbsz < 22 || payload.len() < 18 + cbsz {
            return Err(MountError::FmtInvalid);
        }

        bits_per_sample = LittleEndian::read_u16(&payload[18..]);
        format_tag = LittleEndian::read_u16(&payload[24..]);

        if payload[26..40] != EXTENSIBLE_GUID_SUFFIX {
            return Err(MountError::FmtUnsupported);
        }
    }

    let format = match (format_tag, container_bytes) {
        (FORMAT_PCM, 2) => SampleFormat::I16,
        (FORMAT_PCM, 3) => SampleFormat::I24,
        (FORMAT_PCM, 4) => SampleFormat::I32,
        (FORMAT_IEEE_FLOAT, 4) => SampleFormat::F32,
        _ => return Err(MountError::FmtUnsupported),
    };

    if channels == 0
        || block_align as u32 != channels as u32 * container_bytes
        || bits_per_sample as u32 > container_bytes * 8
    {
        return Err(MountError::FmtInvalid);
    }

    Ok(Format { format, sample_rate, channels, bits_per_sample })
}

/// Emits a `fmt ` chunk, picking the smallest layout that can represent
/// the format. Returns whether the written tag requires a `fact` chunk to
/// accompany the data.
pub(crate) fn encode_format(out: &mut Emitter, fmt: &Format) -> bool {
    let container_bits = fmt.format.container_bits();
    let extensible = container_bits != fmt.bits_per_sample;
    let basic_tag = match fmt.format {
        SampleFormat::F32 => FORMAT_IEEE_FLOAT,
        _ => FORMAT_PCM,
    };
    let format_tag = if extensible { FORMAT_EXTENSIBLE } else { basic_tag };
    // Total chunk length: plain PCM omits cbSize, float carries an empty
    // one, EXTENSIBLE carries the 22-byte extension.
    let fmt_sz: u32 = if extensible {
        48
    } else if basic_tag == FORMAT_PCM {
        24
    } else {
        26
    };

    let block_align = fmt.block_align();

    out.put_fourcc(crate::riff::FMT_CHUNK_ID);
    out.put_u32(fmt_sz - 8);
    out.put_u16(format_tag);
    out.put_u16(fmt.channels);
    out.put_u32(fmt.sample_rate);
    out.put_u32((fmt.sample_rate as u64 * block_align as u64) as u32);
    out.put_u16(block_align);
    out.put_u16(container_bits);
    if extensible || basic_tag != FORMAT_PCM {
        out.put_u16(fmt_sz as u16 - 26);
    }
    if extensible {
        out.put_u16(fmt.bits_per_sample);
        out.put_u32(0); // channel mask
        out.put_u16(basic_tag);
        out.put_bytes(&EXTENSIBLE_GUID_SUFFIX);
    }

    format_tag != FORMAT_PCM
}
