use crate::riff::FourCc;

/// The textual tags of a `LIST/INFO` chunk this implementation accepts, in
/// table order. See "Multimedia Programming Interface and Data
/// Specifications 1.0" for the meaning of each tag.
pub const INFO_TAGS: [&str; NB_INFO_TAGS] = [
    "IARL", // Archival Location
    "IART", // Artist
    "ICMS", // Commissioned
    "ICMT", // Comments
    "ICOP", // Copyright
    "ICRD", // Creation Date
    "ICRP", // Cropped
    "IDIM", // Dimensions
    "IDPI", // Dots Per Inch
    "IENG", // Engineer
    "IGNR", // Genre
    "IKEY", // Keywords
    "ILGT", // Lightness
    "IMED", // Medium
    "INAM", // Name
    "IPLT", // Palette Setting
    "IPRD", // Product
    "ISBJ", // Subject
    "ISFT", // Software
    "ISHP", // Sharpness
    "ISRC", // Source
    "ISRF", // Source Form
    "ITCH", // Technician
];

pub const NB_INFO_TAGS: usize = 23;

/// Maps a fourcc to its slot in the info set, or `None` for tags outside
/// the RIFF specification.
pub fn info_tag_index(id: FourCc) -> Option<usize> {
    INFO_TAGS.iter().position(|tag| tag.as_bytes() == id)
}

/// The fourcc string for an info slot. `index` must be below
/// [`NB_INFO_TAGS`].
pub fn info_tag_name(index: usize) -> &'static str {
    INFO_TAGS[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_name_agree() {
        for (i, tag) in INFO_TAGS.iter().enumerate() {
            let mut id = [0u8; 4];
            id.copy_from_slice(tag.as_bytes());
            assert_eq!(info_tag_index(id), Some(i));
            assert_eq!(info_tag_name(i), *tag);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(info_tag_index(*b"IXXX"), None);
        assert_eq!(info_tag_index(*b"data"), None);
    }
}
