pub mod commands;
pub mod convert;
mod format;
mod info;
mod mount;
mod prelude;
mod riff;
mod serialise;

pub use commands::{CommandError, MetaCommand};
pub use convert::deinterleave_floats;
pub use format::{Format, SampleFormat};
pub use info::{INFO_TAGS, NB_INFO_TAGS, info_tag_index, info_tag_name};
pub use mount::{MountError, MountFlags, Warnings, mount};
pub use riff::FourCc;
pub use serialise::{SerialiseError, serialise, serialise_to_vec};

/// Positional metadata items a single file may carry.
pub const MAX_MARKERS: usize = 64;

/// Unrecognised chunks a single file may carry through a rewrite.
pub const MAX_UNSUPPORTED_CHUNKS: usize = 32;

/// A single positional annotation: a cue point (`length == 0`) or a loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Marker {
    /// Scratch identifier. While markers are being merged by [`mount`] this
    /// is the RIFF cue-point id; [`SampleWav::sort_markers`] rewrites it to
    /// the output index. It carries no meaning in between and is free for
    /// the calling code to use.
    pub id: u32,
    /// Sample frame this marker applies at.
    pub position: u32,
    /// Region length in frames, from `ltxt` or `smpl`. Zero for cue points.
    pub length: u32,
    /// From `labl`.
    pub name: Option<String>,
    /// From `note`.
    pub desc: Option<String>,
    // Which source chunks contributed; only meaningful during mounting.
    pub in_cue: bool,
    pub in_smpl: bool,
    pub has_ltxt: bool,
}

/// A chunk this implementation does not understand, kept for pass-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownChunk<'a> {
    pub id: FourCc,
    pub data: &'a [u8],
}

/// A mounted view of a sampler wave file.
///
/// The audio payload and any preserved unknown chunks borrow the buffer
/// the file was mounted from, so the buffer must stay untouched for the
/// life of this structure. Serialising to the same buffer is for that
/// reason impossible; write into a fresh one.
#[derive(Debug, Clone)]
pub struct SampleWav<'a> {
    /// String metadata from the `LIST/INFO` chunk, indexed per
    /// [`INFO_TAGS`].
    pub info: [Option<String>; NB_INFO_TAGS],
    /// MIDI pitch from the sampler chunk, encoded as
    /// `(note << 32) | fraction`. Present whenever a `smpl` chunk was.
    pub pitch_info: Option<u64>,
    pub markers: Vec<Marker>,
    pub format: Format,
    /// Frame count of the audio payload.
    pub data_frames: u32,
    /// Raw interleaved sample frames.
    pub data: &'a [u8],
    pub unsupported: Vec<UnknownChunk<'a>>,
}

impl SampleWav<'_> {
    /// Orders markers the way the serialiser expects them: loops ahead of
    /// cue points, then by position, longer regions first on a tie. Ids
    /// are rewritten to `1..=n` so the `adtl`, `cue ` and `smpl` entries
    /// written from one pass agree with each other.
    pub fn sort_markers(&mut self) {
        self.markers
            .sort_by_key(|m| (m.length == 0, m.position, std::cmp::Reverse(m.length)));
        for (i, m) in self.markers.iter_mut().enumerate() {
            m.id = i as u32 + 1;
        }
    }
}
