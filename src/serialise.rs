use crate::info::INFO_TAGS;
use crate::prelude::*;
use crate::riff::{
    CUE_CHUNK_ID, DATA_CHUNK_ID, FACT_CHUNK_ID, FourCc, LIST_CHUNK_ID, RIFF_CHUNK_ID,
    SMPL_CHUNK_ID, WAVE_FORMAT_ID,
};
use thiserror::Error;

/// A chunk size or the RIFF body itself would not fit its 32-bit size
/// field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("the serialised form exceeds a 32-bit chunk size")]
pub struct SerialiseError;

/// Byte sink shared by the sizing and writing passes.
///
/// With no buffer attached only the position advances, so both passes run
/// the exact same control flow and agree on the result.
#[derive(Debug)]
pub(crate) struct Emitter<'b> {
    buf: Option<&'b mut [u8]>,
    pos: u64,
}

impl<'b> Emitter<'b> {
    pub(crate) fn new(buf: Option<&'b mut [u8]>) -> Self {
        Emitter { buf, pos: 0 }
    }

    pub(crate) fn pos(&self) -> u64 {
        self.pos
    }

    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
        if let Some(buf) = self.buf.as_deref_mut() {
            let at = self.pos as usize;
            buf[at..at + bytes.len()].copy_from_slice(bytes);
        }
        self.pos += bytes.len() as u64;
    }

    pub(crate) fn put_fourcc(&mut self, id: FourCc) {
        self.put_bytes(&id);
    }

    pub(crate) fn put_u16(&mut self, v: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.put_bytes(&b);
    }

    pub(crate) fn put_u32(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.put_bytes(&b);
    }

    /// Overwrites four bytes at an earlier position; list and RIFF headers
    /// are filled in once their body size is known.
    fn patch_u32(&mut self, at: u64, v: u32) {
        if let Some(buf) = self.buf.as_deref_mut() {
            LittleEndian::write_u32(&mut buf[at as usize..at as usize + 4], v);
        }
    }

    fn patch_fourcc(&mut self, at: u64, id: FourCc) {
        if let Some(buf) = self.buf.as_deref_mut() {
            buf[at as usize..at as usize + 4].copy_from_slice(&id);
        }
    }

    /// Abandons everything emitted after `to`; used to drop a list header
    /// that turned out to have no entries.
    fn rewind(&mut self, to: u64) {
        self.pos = to;
    }
}

fn put_blob(out: &mut Emitter, id: FourCc, data: &[u8]) {
    out.put_fourcc(id);
    out.put_u32(data.len() as u32);
    out.put_bytes(data);
    if data.len() & 1 == 1 {
        out.put_bytes(&[0]);
    }
}

/// `<fourcc> <len+1> <bytes> <NUL> [pad]`
fn put_zstr(out: &mut Emitter, id: FourCc, s: &str) -> Result<(), SerialiseError> {
    let len = s.len() as u64 + 1;
    if len > u32::MAX as u64 - 4 {
        return Err(SerialiseError);
    }
    out.put_fourcc(id);
    out.put_u32(len as u32);
    out.put_bytes(s.as_bytes());
    out.put_bytes(&[0]);
    if len & 1 == 1 {
        out.put_bytes(&[0]);
    }
    Ok(())
}

fn put_info(out: &mut Emitter, wav: &SampleWav) -> Result<(), SerialiseError> {
    let start = out.pos();
    out.put_fourcc(LIST_CHUNK_ID);
    out.put_u32(0);
    out.put_fourcc(crate::riff::INFO_LIST_ID);

    for (i, tag) in INFO_TAGS.iter().enumerate() {
        let Some(value) = wav.info[i].as_deref() else { continue };
        if value.is_empty() {
            continue;
        }
        let mut id = [0u8; 4];
        id.copy_from_slice(tag.as_bytes());
        put_zstr(out, id, value)?;
        if out.pos() - start - 8 > u32::MAX as u64 {
            return Err(SerialiseError);
        }
    }

    if out.pos() == start + 12 {
        out.rewind(start);
    } else {
        out.patch_u32(start + 4, (out.pos() - start - 8) as u32);
    }
    Ok(())
}

fn put_ltxt(out: &mut Emitter, id: u32, length: u32) {
    out.put_fourcc(*b"ltxt");
    out.put_u32(20);
    out.put_u32(id);
    out.put_u32(length);
    out.put_fourcc(*b"rgn ");
    // country, language, dialect, code page
    out.put_u16(0);
    out.put_u16(0);
    out.put_u16(0);
    out.put_u16(0);
}

fn put_notelabl(out: &mut Emitter, ctyp: FourCc, id: u32, s: &str) -> Result<(), SerialiseError> {
    let len = s.len() as u64 + 1;
    if len > u32::MAX as u64 - 4 {
        return Err(SerialiseError);
    }
    out.put_fourcc(ctyp);
    out.put_u32((4 + len) as u32);
    out.put_u32(id);
    out.put_bytes(s.as_bytes());
    out.put_bytes(&[0]);
    if len & 1 == 1 {
        out.put_bytes(&[0]);
    }
    Ok(())
}

fn put_adtl(out: &mut Emitter, wav: &SampleWav, store_cue_loops: bool) -> Result<(), SerialiseError> {
    let start = out.pos();
    out.put_fourcc(LIST_CHUNK_ID);
    out.put_u32(0);
    out.put_fourcc(crate::riff::ADTL_LIST_ID);

    for (i, m) in wav.markers.iter().enumerate() {
        let id = i as u32 + 1;
        if store_cue_loops && m.length > 0 {
            put_ltxt(out, id, m.length);
        }
        if let Some(name) = m.name.as_deref() {
            put_notelabl(out, *b"labl", id, name)?;
        }
        if let Some(desc) = m.desc.as_deref() {
            put_notelabl(out, *b"note", id, desc)?;
        }
        if out.pos() - start - 8 > u32::MAX as u64 {
            return Err(SerialiseError);
        }
    }

    if out.pos() == start + 12 {
        out.rewind(start);
    } else {
        out.patch_u32(start + 4, (out.pos() - start - 8) as u32);
    }
    Ok(())
}

fn put_cue(out: &mut Emitter, wav: &SampleWav, store_cue_loops: bool) -> Result<(), SerialiseError> {
    let nb_cue = wav
        .markers
        .iter()
        .filter(|m| store_cue_loops || m.length == 0)
        .count() as u64;
    let cksz = nb_cue * 24 + 4;
    if cksz > u32::MAX as u64 {
        return Err(SerialiseError);
    }
    if nb_cue == 0 {
        return Ok(());
    }

    out.put_fourcc(CUE_CHUNK_ID);
    out.put_u32(cksz as u32);
    out.put_u32(nb_cue as u32);
    for (i, m) in wav.markers.iter().enumerate() {
        if !(store_cue_loops || m.length == 0) {
            continue;
        }
        out.put_u32(i as u32 + 1);
        out.put_u32(0); // play order position
        out.put_fourcc(DATA_CHUNK_ID);
        out.put_u32(0); // chunk start
        out.put_u32(0); // block start
        out.put_u32(m.position);
    }
    Ok(())
}

fn put_smpl(out: &mut Emitter, wav: &SampleWav) -> Result<(), SerialiseError> {
    let nb_loop = wav.markers.iter().filter(|m| m.length > 0).count() as u64;
    let cksz = nb_loop * 24 + 36;
    if cksz > u32::MAX as u64 {
        return Err(SerialiseError);
    }
    if nb_loop == 0 && wav.pitch_info.is_none() {
        return Ok(());
    }

    let pitch = wav.pitch_info.unwrap_or(0);
    out.put_fourcc(SMPL_CHUNK_ID);
    out.put_u32(cksz as u32);
    out.put_u32(0); // manufacturer
    out.put_u32(0); // product
    out.put_u32(0); // sample period
    out.put_u32((pitch >> 32) as u32);
    out.put_u32(pitch as u32);
    out.put_u32(0); // SMPTE format
    out.put_u32(0); // SMPTE offset
    out.put_u32(nb_loop as u32);
    out.put_u32(0); // sampler data bytes
    for (i, m) in wav.markers.iter().enumerate() {
        if m.length == 0 {
            continue;
        }
        out.put_u32(i as u32 + 1);
        out.put_u32(0); // loop type: forward
        out.put_u32(m.position);
        out.put_u32(m.position + m.length - 1);
        out.put_u32(0); // fraction
        out.put_u32(0); // play count
    }
    Ok(())
}

fn put_fact(out: &mut Emitter, data_frames: u32) {
    out.put_fourcc(FACT_CHUNK_ID);
    out.put_u32(4);
    out.put_u32(data_frames);
}

fn put_data(out: &mut Emitter, wav: &SampleWav) -> Result<(), SerialiseError> {
    let data_size = wav.data_frames as u64 * wav.format.block_align() as u64;
    if data_size > u32::MAX as u64 {
        return Err(SerialiseError);
    }
    put_blob(out, DATA_CHUNK_ID, &wav.data[..data_size as usize]);
    Ok(())
}

/// Serialises `wav` as a complete wave file.
///
/// With `buf` as `None` nothing is written and the return value is the
/// exact size a real pass will produce; call again with a buffer of that
/// size to write. A shorter buffer is a contract violation and panics.
/// Chunks are written in a canonical order regardless of where the input
/// file carried them.
///
/// With `store_cue_loops` set, loops are mirrored into the `cue ` chunk
/// with an `ltxt` region record each, for editors which cannot read the
/// sampler chunk.
pub fn serialise(
    wav: &SampleWav,
    buf: Option<&mut [u8]>,
    store_cue_loops: bool,
) -> Result<u64, SerialiseError> {
    let mut out = Emitter::new(buf);

    // Header values are patched in at the end, once the body size is
    // known.
    out.put_fourcc([0; 4]);
    out.put_u32(0);
    out.put_fourcc([0; 4]);

    if crate::format::encode_format(&mut out, &wav.format) {
        put_fact(&mut out, wav.data_frames);
    }
    put_data(&mut out, wav)?;
    put_info(&mut out, wav)?;
    put_adtl(&mut out, wav, store_cue_loops)?;
    put_cue(&mut out, wav, store_cue_loops)?;
    put_smpl(&mut out, wav)?;

    for ck in &wav.unsupported {
        if ck.data.len() as u64 > u32::MAX as u64 || out.pos() - 8 > u32::MAX as u64 {
            return Err(SerialiseError);
        }
        put_blob(&mut out, ck.id, ck.data);
    }

    let total = out.pos();
    if total - 8 > u32::MAX as u64 {
        return Err(SerialiseError);
    }
    out.patch_fourcc(0, RIFF_CHUNK_ID);
    out.patch_u32(4, (total - 8) as u32);
    out.patch_fourcc(8, WAVE_FORMAT_ID);

    Ok(total)
}

/// Sizing pass, allocation, writing pass in one call.
pub fn serialise_to_vec(wav: &SampleWav, store_cue_loops: bool) -> Result<Vec<u8>, SerialiseError> {
    let size = serialise(wav, None, store_cue_loops)?;
    let mut out = vec![0u8; size as usize];
    let written = serialise(wav, Some(&mut out), store_cue_loops)?;
    debug_assert_eq!(written, size);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::riff::ChunkIter;

    fn empty_wav(data: &[u8]) -> SampleWav<'_> {
        SampleWav {
            info: Default::default(),
            pitch_info: None,
            markers: Vec::new(),
            format: Format {
                format: SampleFormat::I16,
                sample_rate: 48000,
                channels: 1,
                bits_per_sample: 16,
            },
            data_frames: (data.len() / 2) as u32,
            data,
            unsupported: Vec::new(),
        }
    }

    fn chunk_ids(file: &[u8]) -> Vec<FourCc> {
        ChunkIter::new(&file[12..]).map(|ck| ck.id).collect()
    }

    #[test]
    fn sizing_and_writing_agree() {
        let data = [0u8; 8];
        let mut wav = empty_wav(&data);
        wav.markers.push(Marker {
            position: 1,
            length: 2,
            name: Some("loop".into()),
            ..Marker::default()
        });
        wav.info[14] = Some("A name".into()); // INAM
        wav.pitch_info = Some(60 << 32);

        let size = serialise(&wav, None, true).unwrap();
        let bytes = serialise_to_vec(&wav, true).unwrap();
        assert_eq!(bytes.len() as u64, size);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]) as usize, bytes.len() - 8);
        assert_eq!(&bytes[8..12], b"WAVE");
    }

    #[test]
    fn minimal_pcm_writes_fmt_and_data_only() {
        let data = [0u8; 8];
        let wav = empty_wav(&data);
        let bytes = serialise_to_vec(&wav, false).unwrap();
        assert_eq!(chunk_ids(&bytes), vec![*b"fmt ", *b"data"]);
        // 16-byte fmt payload and no fact for plain PCM.
        assert_eq!(bytes.len(), 12 + 24 + 8 + 8);
    }

    #[test]
    fn float_audio_carries_a_fact_chunk() {
        let data = [0u8; 16];
        let mut wav = empty_wav(&data);
        wav.format = Format {
            format: SampleFormat::F32,
            sample_rate: 48000,
            channels: 1,
            bits_per_sample: 32,
        };
        wav.data_frames = 4;
        let bytes = serialise_to_vec(&wav, false).unwrap();
        assert_eq!(chunk_ids(&bytes), vec![*b"fmt ", *b"fact", *b"data"]);
    }

    #[test]
    fn canonical_chunk_order() {
        let data = [0u8; 8];
        let mut wav = empty_wav(&data);
        wav.markers.push(Marker { position: 0, length: 2, ..Marker::default() });
        wav.markers.push(Marker {
            position: 3,
            length: 0,
            name: Some("hit".into()),
            ..Marker::default()
        });
        wav.info[1] = Some("someone".into()); // IART
        wav.pitch_info = Some(0);
        wav.unsupported.push(UnknownChunk { id: *b"junk", data: &[1, 2, 3] });

        let bytes = serialise_to_vec(&wav, true).unwrap();
        assert_eq!(
            chunk_ids(&bytes),
            vec![*b"fmt ", *b"data", *b"LIST", *b"LIST", *b"cue ", *b"smpl", *b"junk"]
        );
    }

    #[test]
    fn loops_stay_out_of_cue_by_default() {
        let data = [0u8; 8];
        let mut wav = empty_wav(&data);
        wav.markers.push(Marker { position: 0, length: 2, ..Marker::default() });
        let bytes = serialise_to_vec(&wav, false).unwrap();
        assert_eq!(chunk_ids(&bytes), vec![*b"fmt ", *b"data", *b"smpl"]);
    }

    #[test]
    fn empty_lists_are_omitted() {
        let data = [0u8; 2];
        let mut wav = empty_wav(&data);
        wav.info[3] = Some(String::new()); // empty ICMT must not force a LIST
        let bytes = serialise_to_vec(&wav, true).unwrap();
        assert_eq!(chunk_ids(&bytes), vec![*b"fmt ", *b"data"]);
    }

    #[test]
    fn odd_length_strings_are_padded() {
        let data = [0u8; 2];
        let mut wav = empty_wav(&data);
        wav.markers.push(Marker {
            position: 0,
            length: 0,
            name: Some("ab".into()), // string+NUL = 3 bytes, needs a pad
            ..Marker::default()
        });
        let bytes = serialise_to_vec(&wav, false).unwrap();
        let adtl = ChunkIter::new(&bytes[12..])
            .find(|ck| ck.id == *b"LIST")
            .unwrap();
        assert_eq!(&adtl.data[0..4], b"adtl");
        // labl: id + size + cue id + "ab\0" + pad
        assert_eq!(adtl.data.len(), 4 + 8 + 4 + 4);
        assert_eq!(LittleEndian::read_u32(&adtl.data[8..]), 7);
    }

    #[test]
    fn smpl_loop_end_is_inclusive() {
        let data = [0u8; 200];
        let mut wav = empty_wav(&data);
        wav.markers.push(Marker { position: 10, length: 5, ..Marker::default() });
        let bytes = serialise_to_vec(&wav, false).unwrap();
        let smpl = ChunkIter::new(&bytes[12..]).find(|ck| ck.id == *b"smpl").unwrap();
        assert_eq!(LittleEndian::read_u32(&smpl.data[28..]), 1);
        assert_eq!(LittleEndian::read_u32(&smpl.data[44..]), 10);
        assert_eq!(LittleEndian::read_u32(&smpl.data[48..]), 14);
    }

    #[test]
    fn oversized_data_fails_cleanly() {
        let data = [0u8; 2];
        let mut wav = empty_wav(&data);
        wav.data_frames = u32::MAX; // frames * block_align overflows u32
        assert_eq!(serialise(&wav, None, false), Err(SerialiseError));
    }
}
