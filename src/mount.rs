use crate::info::info_tag_index;
use crate::prelude::*;
use crate::riff::{
    ADTL_LIST_ID, CUE_CHUNK_ID, Chunk, ChunkIter, DATA_CHUNK_ID, FACT_CHUNK_ID, FMT_CHUNK_ID,
    INFO_LIST_ID, RIFF_CHUNK_ID, SMPL_CHUNK_ID, WAVE_FORMAT_ID,
};
use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Behaviour switches for [`mount`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MountFlags: u32 {
        /// Drop all known but non-essential metadata chunks on load
        /// (`cue `, `smpl`, `LIST/INFO` and `LIST/adtl`).
        const RESET = 1;
        /// Carry unrecognised chunks through to serialisation instead of
        /// dropping them.
        const PRESERVE_UNKNOWN = 2;
        /// On a loop conflict, keep the sampler loops (beware!).
        const PREFER_SMPL_LOOPS = 4;
        /// On a loop conflict, keep the cue loops. Less risky than the
        /// above. Mutually exclusive with it.
        const PREFER_CUE_LOOPS = 8;
    }
}

bitflags! {
    /// Compromises made while loading. The structure is fully usable when
    /// any of these are set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Warnings: u32 {
        /// The RIFF body claimed more data than the buffer holds and was
        /// clipped.
        const FILE_TRUNCATION = 0x100;
        /// The adtl list held strings without a NUL terminator; they were
        /// dropped.
        const ADTL_UNTERMINATED_STRINGS = 0x200;
        /// The INFO list held strings without a NUL terminator; they were
        /// dropped.
        const INFO_UNTERMINATED_STRINGS = 0x400;
        /// A smpl/cue loop conflict was resolved by a `PREFER_*` flag.
        const SMPL_CUE_LOOP_CONFLICTS_RESOLVED = 0x800;
    }
}

/// Why a buffer could not be mounted. Except for
/// [`MountError::SmplCueLoopConflicts`], nothing about the buffer's
/// contents is recoverable.
#[derive(Debug, Error)]
pub enum MountError<'a> {
    #[error("buffer does not hold RIFF/WAVE audio")]
    NotAWave,
    #[error("the fmt chunk is corrupt")]
    FmtInvalid,
    #[error("the fmt chunk does not describe waveform audio this implementation can use")]
    FmtUnsupported,
    #[error("the data chunk does not hold a whole number of sample frames")]
    DataInvalid,
    #[error("the INFO list holds a tag outside the RIFF specification")]
    InfoUnsupported,
    #[error("the adtl list is truncated or holds an unrecognised sub-chunk")]
    AdtlInvalid,
    #[error("the adtl list holds a duplicate labl, note or ltxt entry for one cue id")]
    AdtlDuplicates,
    #[error("the cue chunk is truncated")]
    CueInvalid,
    #[error("the cue chunk holds cue points sharing an identifier")]
    CueDuplicateIds,
    #[error("the smpl chunk is truncated or holds an inverted loop")]
    SmplInvalid,
    #[error("more than {MAX_UNSUPPORTED_CHUNKS} unsupported chunks to preserve")]
    TooManyChunks,
    #[error("a chunk which may only appear once appears twice")]
    DuplicateChunks,
    #[error("more than {MAX_MARKERS} positional metadata items")]
    TooManyMarkers,
    #[error("a marker lies outside the audio data")]
    MarkerRange,
    /// Loops in the `smpl` and `cue ` chunks disagree and no `PREFER_*`
    /// flag says which side to trust. The carried structure is valid for
    /// diagnostic inspection of its markers only: a loop marker tagged
    /// `in_cue && in_smpl` was reconciled, one tagged asymmetrically is
    /// the disagreement.
    #[error("loops in the smpl chunk conflict with loops in the cue chunk")]
    SmplCueLoopConflicts(Box<SampleWav<'a>>),
}

#[derive(Default)]
struct KnownChunks<'a> {
    info: Option<&'a [u8]>,
    adtl: Option<&'a [u8]>,
    cue: Option<&'a [u8]>,
    smpl: Option<&'a [u8]>,
    fact: Option<&'a [u8]>,
    data: Option<&'a [u8]>,
    fmt: Option<&'a [u8]>,
}

enum Slot {
    Info,
    Adtl,
    Cue,
    Smpl,
    Fact,
    Data,
    Fmt,
}

impl<'a> KnownChunks<'a> {
    fn slot(&mut self, which: &Slot) -> &mut Option<&'a [u8]> {
        match which {
            Slot::Info => &mut self.info,
            Slot::Adtl => &mut self.adtl,
            Slot::Cue => &mut self.cue,
            Slot::Smpl => &mut self.smpl,
            Slot::Fact => &mut self.fact,
            Slot::Data => &mut self.data,
            Slot::Fmt => &mut self.fmt,
        }
    }
}

/// `(slot, payload, required)` for one chunk. LIST payloads are narrowed
/// past the sub-form identifier.
fn classify<'a>(ck: &Chunk<'a>) -> (Option<Slot>, &'a [u8], bool) {
    if let Some(form) = ck.list_form() {
        let body = &ck.data[4..];
        return match form {
            ADTL_LIST_ID => (Some(Slot::Adtl), body, false),
            INFO_LIST_ID => (Some(Slot::Info), body, false),
            _ => (None, ck.data, false),
        };
    }
    match ck.id {
        DATA_CHUNK_ID => (Some(Slot::Data), ck.data, true),
        FMT_CHUNK_ID => (Some(Slot::Fmt), ck.data, true),
        FACT_CHUNK_ID => (Some(Slot::Fact), ck.data, true),
        CUE_CHUNK_ID => (Some(Slot::Cue), ck.data, false),
        SMPL_CHUNK_ID => (Some(Slot::Smpl), ck.data, false),
        _ => (None, ck.data, false),
    }
}

/// Populates a [`SampleWav`] view from a memory image of a wave file.
///
/// All loaders project onto one marker table keyed by cue-point id, after
/// which the table is reconciled: orphaned adtl entries are dropped,
/// ranges are checked against the audio length, and loops recorded in
/// only one of `smpl`/`cue ` are surfaced as a conflict.
///
/// On success the warnings describe any compromises made; the structure
/// is usable either way.
pub fn mount<'a>(
    buf: &'a [u8],
    flags: MountFlags,
) -> Result<(SampleWav<'a>, Warnings), MountError<'a>> {
    if buf.len() < 12
        || buf[0..4] != RIFF_CHUNK_ID
        || LittleEndian::read_u32(&buf[4..8]) < 4
        || buf[8..12] != WAVE_FORMAT_ID
    {
        return Err(MountError::NotAWave);
    }

    let riff_sz = (LittleEndian::read_u32(&buf[4..8]) - 4) as usize;
    let mut warnings = Warnings::empty();
    let body = if riff_sz > buf.len() - 12 {
        warnings |= Warnings::FILE_TRUNCATION;
        &buf[12..]
    } else {
        &buf[12..12 + riff_sz]
    };

    let mut known = KnownChunks::default();
    let mut unsupported: Vec<UnknownChunk<'a>> = Vec::new();

    let mut walker = ChunkIter::new(body);
    while let Some(ck) = walker.next() {
        let (slot, payload, required) = classify(&ck);

        let wanted = required
            || (slot.is_some() && !flags.contains(MountFlags::RESET))
            || (slot.is_none() && flags.contains(MountFlags::PRESERVE_UNKNOWN));
        if !wanted {
            debug!("dropping chunk {:?}", ck.id.escape_ascii().to_string());
            continue;
        }

        match slot {
            Some(which) => {
                let dst = known.slot(&which);
                // No chunk we know how to interpret may appear twice.
                if dst.is_some() {
                    return Err(MountError::DuplicateChunks);
                }
                *dst = Some(payload);
            }
            None => {
                if unsupported.len() >= MAX_UNSUPPORTED_CHUNKS {
                    return Err(MountError::TooManyChunks);
                }
                unsupported.push(UnknownChunk { id: ck.id, data: payload });
            }
        }
    }
    if walker.truncated() {
        warnings |= Warnings::FILE_TRUNCATION;
    }
    if warnings.contains(Warnings::FILE_TRUNCATION) {
        warn!("RIFF body is shorter than its chunks claim; clipped");
    }

    // A wave without format or sample data is not worth mounting.
    let (Some(fmt), Some(data)) = (known.fmt, known.data) else {
        return Err(MountError::NotAWave);
    };

    let format = crate::format::decode_format(fmt)?;
    let block_align = format.block_align() as usize;
    if data.len() % block_align != 0 {
        return Err(MountError::DataInvalid);
    }

    let mut wav = SampleWav {
        info: Default::default(),
        pitch_info: None,
        markers: Vec::new(),
        format,
        data_frames: (data.len() / block_align) as u32,
        data,
        unsupported,
    };

    if let Some(info) = known.info {
        warnings |= load_info(&mut wav, info)?;
    }
    if let Some(adtl) = known.adtl {
        warnings |= load_adtl(&mut wav, adtl)?;
    }
    if let Some(cue) = known.cue {
        load_cue(&mut wav, cue)?;
    }
    if let Some(smpl) = known.smpl {
        load_smpl(&mut wav, smpl)?;
    }

    let (wav, resolution) = reconcile(wav, flags)?;
    Ok((wav, warnings | resolution))
}

fn new_marker(markers: &mut Vec<Marker>) -> Option<&mut Marker> {
    if markers.len() >= MAX_MARKERS {
        return None;
    }
    markers.push(Marker::default());
    markers.last_mut()
}

/// The marker carrying `id`, allocating one when none exists yet.
fn marker_by_id(markers: &mut Vec<Marker>, id: u32) -> Option<&mut Marker> {
    if let Some(i) = markers.iter().position(|m| m.id == id) {
        return Some(&mut markers[i]);
    }
    let marker = new_marker(markers)?;
    marker.id = id;
    Some(marker)
}

/// Reads text up to the first NUL.
fn zstr(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn load_info<'a>(wav: &mut SampleWav<'_>, body: &[u8]) -> Result<Warnings, MountError<'a>> {
    let mut warnings = Warnings::empty();

    for ck in ChunkIter::new(body) {
        if ck.data.is_empty() || ck.data[ck.data.len() - 1] != 0 {
            warn!("INFO entry {:?} is not NUL-terminated; dropped", ck.id.escape_ascii().to_string());
            warnings |= Warnings::INFO_UNTERMINATED_STRINGS;
            continue;
        }
        match info_tag_index(ck.id) {
            Some(i) => wav.info[i] = Some(zstr(ck.data)),
            None => return Err(MountError::InfoUnsupported),
        }
    }

    Ok(warnings)
}

fn load_adtl<'a>(wav: &mut SampleWav<'_>, body: &[u8]) -> Result<Warnings, MountError<'a>> {
    let mut warnings = Warnings::empty();
    let mut rest = body;

    while rest.len() >= 8 {
        let id = [rest[0], rest[1], rest[2], rest[3]];
        let size = LittleEndian::read_u32(&rest[4..8]) as usize;

        // Unlike the outer walk, an overrunning sub-chunk is corruption,
        // not truncation.
        let step = 8u64 + size as u64 + (size & 1) as u64;
        if step > rest.len() as u64 {
            return Err(MountError::AdtlInvalid);
        }
        let payload = &rest[8..8 + size];
        rest = &rest[step as usize..];

        let is_ltxt = id == *b"ltxt";
        let is_note = id == *b"note";
        let is_labl = id == *b"labl";

        // Unknown adtl content is unsafe to silently preserve; labels we
        // would rewrite could belong to it.
        if !(is_ltxt && size == 20) && !((is_note || is_labl) && size >= 4) {
            return Err(MountError::AdtlInvalid);
        }

        let cue_id = LittleEndian::read_u32(payload);
        let marker =
            marker_by_id(&mut wav.markers, cue_id).ok_or(MountError::TooManyMarkers)?;
        let body = &payload[4..];

        if is_ltxt {
            if marker.has_ltxt {
                return Err(MountError::AdtlDuplicates);
            }
            marker.has_ltxt = true;
            marker.length = LittleEndian::read_u32(body);
        } else {
            if body.is_empty() || body[body.len() - 1] != 0 {
                warn!("adtl string for cue id {cue_id} is not NUL-terminated; dropped");
                warnings |= Warnings::ADTL_UNTERMINATED_STRINGS;
                continue;
            }
            if is_note {
                if marker.desc.is_some() {
                    return Err(MountError::AdtlDuplicates);
                }
                marker.desc = Some(zstr(body));
            } else {
                if marker.name.is_some() {
                    return Err(MountError::AdtlDuplicates);
                }
                marker.name = Some(zstr(body));
            }
        }
    }

    Ok(warnings)
}

fn load_cue<'a>(wav: &mut SampleWav<'_>, body: &[u8]) -> Result<(), MountError<'a>> {
    if body.len() < 4 {
        return Err(MountError::CueInvalid);
    }
    let ncue = LittleEndian::read_u32(body) as u64;
    if (body.len() as u64) < 4 + 24 * ncue {
        return Err(MountError::CueInvalid);
    }

    let mut rest = &body[4..];
    for _ in 0..ncue {
        let id = LittleEndian::read_u32(rest);
        let marker = marker_by_id(&mut wav.markers, id).ok_or(MountError::TooManyMarkers)?;
        if marker.in_cue {
            return Err(MountError::CueDuplicateIds);
        }
        marker.position = LittleEndian::read_u32(&rest[20..]);
        marker.in_cue = true;
        rest = &rest[24..];
    }

    Ok(())
}

fn load_smpl<'a>(wav: &mut SampleWav<'_>, body: &[u8]) -> Result<(), MountError<'a>> {
    if body.len() < 36 {
        return Err(MountError::SmplInvalid);
    }
    let nloop = LittleEndian::read_u32(&body[28..]) as u64;
    let vendor_bytes = LittleEndian::read_u32(&body[32..]) as u64;
    if (body.len() as u64) < 36 + nloop * 24 + vendor_bytes {
        return Err(MountError::SmplInvalid);
    }

    wav.pitch_info = Some(
        ((LittleEndian::read_u32(&body[12..]) as u64) << 32)
            | LittleEndian::read_u32(&body[16..]) as u64,
    );

    let mut rest = &body[36..];
    for _ in 0..nloop {
        let id = LittleEndian::read_u32(rest);
        let start = LittleEndian::read_u32(&rest[8..]);
        let end = LittleEndian::read_u32(&rest[12..]);
        rest = &rest[24..];

        if start > end {
            return Err(MountError::SmplInvalid);
        }
        // A loop spanning the whole 32-bit range cannot fit any data
        // chunk either.
        let length = (end - start).checked_add(1).ok_or(MountError::MarkerRange)?;

        // Adopt the first marker that either shares our id without being
        // a cue point, or is a cue point describing the same region. The
        // latter catches editors which rewrote one chunk and lost the id
        // linkage to the other.
        let found = wav.markers.iter().position(|m| {
            (m.id == id && !m.in_cue)
                || (m.in_cue && m.position == start && (!m.has_ltxt || m.length == length))
        });
        let marker = match found {
            Some(i) => &mut wav.markers[i],
            None => new_marker(&mut wav.markers).ok_or(MountError::TooManyMarkers)?,
        };

        marker.position = start;
        marker.length = length;
        marker.in_smpl = true;
    }

    Ok(())
}

fn reconcile(
    mut wav: SampleWav<'_>,
    flags: MountFlags,
) -> Result<(SampleWav<'_>, Warnings), MountError<'_>> {
    // Metadata which never corresponded to a cue point or loop is noise.
    wav.markers.retain(|m| m.in_cue || m.in_smpl);

    for m in &wav.markers {
        if m.position >= wav.data_frames
            || (m.length > 0 && m.position as u64 + m.length as u64 > wav.data_frames as u64)
        {
            return Err(MountError::MarkerRange);
        }
    }

    let smpl_only = wav
        .markers
        .iter()
        .filter(|m| m.length > 0 && m.in_smpl && !m.in_cue)
        .count();
    let cue_only = wav
        .markers
        .iter()
        .filter(|m| m.length > 0 && !m.in_smpl && m.in_cue)
        .count();

    // Loops present on only one side are fine on their own; it takes both
    // kinds at once to make the file ambiguous.
    if smpl_only == 0 || cue_only == 0 {
        return Ok((wav, Warnings::empty()));
    }

    if flags.intersects(MountFlags::PREFER_CUE_LOOPS | MountFlags::PREFER_SMPL_LOOPS) {
        wav.markers.retain(|m| {
            let is_loop = m.length > 0;
            if is_loop && m.in_smpl && !m.in_cue && flags.contains(MountFlags::PREFER_CUE_LOOPS) {
                return false;
            }
            if is_loop && !m.in_smpl && m.in_cue && flags.contains(MountFlags::PREFER_SMPL_LOOPS) {
                return false;
            }
            true
        });
        let dropped = if flags.contains(MountFlags::PREFER_CUE_LOOPS) { smpl_only } else { cue_only };
        warn!("smpl/cue loop conflict resolved by preference; {dropped} loops dropped");
        return Ok((wav, Warnings::SMPL_CUE_LOOP_CONFLICTS_RESOLVED));
    }

    Err(MountError::SmplCueLoopConflicts(Box::new(wav)))
}
