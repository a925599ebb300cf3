use crate::prelude::*;
use rayon::prelude::*;

// Sample normalization constants
const I16_DIVISOR: f32 = 32768.0;
const I24_DIVISOR: f32 = 8388608.0;
const I32_DIVISOR: f32 = 2147483648.0;

/// Expands the interleaved audio payload into one `f32` plane per
/// channel, scaled to `[-1.0, 1.0)` for the integer formats.
pub fn deinterleave_floats(wav: &SampleWav) -> Vec<Vec<f32>> {
    let channels = wav.format.channels as usize;
    let frames = wav.data_frames as usize;
    let container = wav.format.format.container_bytes() as usize;
    let format = wav.format.format;
    let data = wav.data;

    (0..channels)
        .into_par_iter()
        .map(|ch| {
            let mut plane = Vec::with_capacity(frames);
            for frame in 0..frames {
                let at = (frame * channels + ch) * container;
                let val = match format {
                    SampleFormat::I16 => {
                        LittleEndian::read_i16(&data[at..]) as f32 / I16_DIVISOR
                    }
                    SampleFormat::I24 => {
                        LittleEndian::read_i24(&data[at..]) as f32 / I24_DIVISOR
                    }
                    SampleFormat::I32 => {
                        LittleEndian::read_i32(&data[at..]) as f32 / I32_DIVISOR
                    }
                    SampleFormat::F32 => LittleEndian::read_f32(&data[at..]),
                };
                plane.push(val);
            }
            plane
        })
        .collect()
}
