// src/pictures/types.rs

/// Dimensions reported by the last load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

/// Decoded image as the general image library hands it out: a bottom-up BGR
/// plane with rows padded to four bytes and an optional 8-bit alpha plane
/// (bottom-up, `width` bytes per row).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlanarImage {
    pub info: ImageInfo,
    pub texture: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

impl PlanarImage {
    /// Row stride of the BGR plane.
    pub fn bgr_stride(width: u32) -> usize {
        (width as usize * 3 + 3) / 4 * 4
    }
}

/// Folder thumbnails are composed from exactly four slots.
pub type FolderThumbs = [String; 4];
