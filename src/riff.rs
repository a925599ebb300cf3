use crate::prelude::*;

pub type FourCc = [u8; 4];

// Chunk identifiers
pub const RIFF_CHUNK_ID: FourCc = *b"RIFF";
pub const WAVE_FORMAT_ID: FourCc = *b"WAVE";
pub const LIST_CHUNK_ID: FourCc = *b"LIST";
pub const FMT_CHUNK_ID: FourCc = *b"fmt ";
pub const FACT_CHUNK_ID: FourCc = *b"fact";
pub const DATA_CHUNK_ID: FourCc = *b"data";
pub const CUE_CHUNK_ID: FourCc = *b"cue ";
pub const SMPL_CHUNK_ID: FourCc = *b"smpl";

// LIST sub-forms
pub const ADTL_LIST_ID: FourCc = *b"adtl";
pub const INFO_LIST_ID: FourCc = *b"INFO";

/// One `(id, payload)` pair produced by [`ChunkIter`].
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub id: FourCc,
    pub data: &'a [u8],
}

impl<'a> Chunk<'a> {
    /// For `LIST` chunks, the four-byte sub-form identifier.
    pub fn list_form(&self) -> Option<FourCc> {
        if self.id == LIST_CHUNK_ID && self.data.len() >= 4 {
            Some([self.data[0], self.data[1], self.data[2], self.data[3]])
        } else {
            None
        }
    }
}

/// Bounded walk over the chunks of a RIFF body.
///
/// The body is expected to start immediately after the `RIFF <size> WAVE`
/// header. A chunk whose declared size runs past the end of the body is
/// clipped to the remainder and ends the walk; `truncated()` reports
/// whether that happened.
#[derive(Debug)]
pub struct ChunkIter<'a> {
    body: &'a [u8],
    pos: usize,
    truncated: bool,
}

impl<'a> ChunkIter<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        ChunkIter { body, pos: 0, truncated: false }
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        let rest = &self.body[self.pos..];
        if rest.len() < 8 {
            return None;
        }

        let id = [rest[0], rest[1], rest[2], rest[3]];
        let size = LittleEndian::read_u32(&rest[4..8]) as usize;
        let avail = rest.len() - 8;

        let data = if size >= avail {
            if size > avail {
                self.truncated = true;
            }
            self.pos = self.body.len();
            &rest[8..]
        } else {
            // Chunks are padded to even offsets.
            self.pos += 8 + size + (size & 1);
            &rest[8..8 + size]
        };

        Some(Chunk { id, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &FourCc, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(id);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        if payload.len() & 1 == 1 {
            out.push(0);
        }
        out
    }

    #[test]
    fn walks_padded_chunks() {
        let mut body = chunk(b"abcd", &[1, 2, 3]);
        body.extend_from_slice(&chunk(b"efgh", &[9, 9]));

        let mut it = ChunkIter::new(&body);
        let a = it.next().unwrap();
        assert_eq!(a.id, *b"abcd");
        assert_eq!(a.data, &[1, 2, 3]);
        let b = it.next().unwrap();
        assert_eq!(b.id, *b"efgh");
        assert_eq!(b.data, &[9, 9]);
        assert!(it.next().is_none());
        assert!(!it.truncated());
    }

    #[test]
    fn clips_oversized_chunk() {
        let mut body = Vec::new();
        body.extend_from_slice(b"abcd");
        body.extend_from_slice(&100u32.to_le_bytes());
        body.extend_from_slice(&[7, 7, 7]);

        let mut it = ChunkIter::new(&body);
        let a = it.next().unwrap();
        assert_eq!(a.data, &[7, 7, 7]);
        assert!(it.next().is_none());
        assert!(it.truncated());
    }

    #[test]
    fn exact_fit_is_not_truncation() {
        let body = chunk(b"abcd", &[1, 2]);
        let mut it = ChunkIter::new(&body);
        assert_eq!(it.next().unwrap().data, &[1, 2]);
        assert!(it.next().is_none());
        assert!(!it.truncated());
    }

    #[test]
    fn list_form_peek() {
        let body = chunk(b"LIST", b"INFOxyz\0");
        let mut it = ChunkIter::new(&body);
        let ck = it.next().unwrap();
        assert_eq!(ck.list_form(), Some(*b"INFO"));
    }
}
