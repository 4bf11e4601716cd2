// src/pictures/texture.rs
use super::types::PlanarImage;

/// Largest edge a texture may have.
pub const MAX_TEXTURE_DIMENSION: u32 = 4096;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureFormat {
    /// BC1 blocks, 8 bytes per 4x4 block.
    Dxt1,
    /// Linear 32-bit ARGB; bytes in memory are B, G, R, A.
    LinA8R8G8B8,
}

impl TextureFormat {
    /// (pitch in bytes, total bytes) of the top-level surface.
    pub fn surface_layout(self, width: u32, height: u32) -> (usize, usize) {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Dxt1 => {
                let pitch = w.div_ceil(4).max(1) * 8;
                (pitch, pitch * h.div_ceil(4).max(1))
            }
            Self::LinA8R8G8B8 => (w * 4, w * 4 * h),
        }
    }
}

/// Round up to the next multiple of four.
pub fn pad4(n: u32) -> u32 {
    n.div_ceil(4) * 4
}

/// A mapped texture surface.
pub struct LockedRect<'a> {
    pub pitch: usize,
    pub bits: &'a mut [u8],
}

/// Allocates textures and maps their top-level surface for writing.
pub trait TextureDevice {
    type Texture;

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Option<Self::Texture>;

    fn lock_rect<'t>(&mut self, texture: &'t mut Self::Texture) -> Option<LockedRect<'t>>;

    fn unlock_rect(&mut self, texture: &mut Self::Texture);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryTexture {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pitch: usize,
    pub pixels: Vec<u8>,
    locked: bool,
}

impl MemoryTexture {
    pub fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        let (pitch, len) = format.surface_layout(width, height);
        Self {
            width,
            height,
            format,
            pitch,
            pixels: vec![0; len],
            locked: false,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// BGRA bytes of pixel (x, y) of a linear texture.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if self.format != TextureFormat::LinA8R8G8B8 || x >= self.width || y >= self.height {
            return None;
        }
        let at = y as usize * self.pitch + x as usize * 4;
        self.pixels.get(at..at + 4)?.try_into().ok()
    }
}

/// CPU-side device; textures live in plain byte buffers.
#[derive(Clone, Debug)]
pub struct MemoryDevice {
    max_dimension: u32,
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self {
            max_dimension: MAX_TEXTURE_DIMENSION,
        }
    }
}

impl MemoryDevice {
    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl TextureDevice for MemoryDevice {
    type Texture = MemoryTexture;

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Option<MemoryTexture> {
        if width == 0 || height == 0 || width > self.max_dimension || height > self.max_dimension {
            return None;
        }
        Some(MemoryTexture::new(width, height, format))
    }

    fn lock_rect<'t>(&mut self, texture: &'t mut MemoryTexture) -> Option<LockedRect<'t>> {
        if texture.locked {
            return None;
        }
        texture.locked = true;
        Some(LockedRect {
            pitch: texture.pitch,
            bits: &mut texture.pixels,
        })
    }

    fn unlock_rect(&mut self, texture: &mut MemoryTexture) {
        texture.locked = false;
    }
}

/// Copy a planar image into a locked A8R8G8B8 surface.
///
/// Source rows are stored bottom-up, so row `y` of the surface comes from row
/// `height - 1 - y` of the planes. Alpha defaults to opaque without an alpha plane.
pub fn copy_planar_to_surface(image: &PlanarImage, locked: &mut LockedRect<'_>) {
    let w = image.info.width as usize;
    let h = image.info.height as usize;
    let src_pitch = PlanarImage::bgr_stride(image.info.width);

    for y in 0..h {
        let src_y = h - 1 - y;
        let Some(src) = image.texture.get(src_y * src_pitch..src_y * src_pitch + w * 3) else {
            break;
        };
        let alpha = image
            .alpha
            .as_deref()
            .and_then(|a| a.get(src_y * w..src_y * w + w));
        let Some(dst) = locked.bits.get_mut(y * locked.pitch..y * locked.pitch + w * 4) else {
            break;
        };

        for (x, (px, bgr)) in dst.chunks_exact_mut(4).zip(src.chunks_exact(3)).enumerate() {
            px[..3].copy_from_slice(bgr);
            px[3] = alpha.map_or(0xff, |a| a[x]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pictures::types::ImageInfo;

    fn planar_2x2(alpha: Option<Vec<u8>>) -> PlanarImage {
        // stride for width 2 is 8 bytes; rows are bottom-up
        let bottom = [1, 2, 3, 4, 5, 6, 0, 0];
        let top = [7, 8, 9, 10, 11, 12, 0, 0];
        PlanarImage {
            info: ImageInfo {
                width: 2,
                height: 2,
                original_width: 2,
                original_height: 2,
            },
            texture: [bottom, top].concat(),
            alpha,
        }
    }

    #[test]
    fn flips_rows_and_packs_bgra_with_opaque_alpha() {
        let image = planar_2x2(None);
        let mut device = MemoryDevice::default();
        let mut tex = device
            .create_texture(2, 2, TextureFormat::LinA8R8G8B8)
            .unwrap();
        {
            let mut lr = device.lock_rect(&mut tex).unwrap();
            copy_planar_to_surface(&image, &mut lr);
        }
        device.unlock_rect(&mut tex);

        assert_eq!(tex.pixel(0, 0), Some([7, 8, 9, 0xff]));
        assert_eq!(tex.pixel(1, 0), Some([10, 11, 12, 0xff]));
        assert_eq!(tex.pixel(0, 1), Some([1, 2, 3, 0xff]));
        assert_eq!(tex.pixel(1, 1), Some([4, 5, 6, 0xff]));
    }

    #[test]
    fn alpha_plane_is_flipped_with_the_colour_rows() {
        let image = planar_2x2(Some(vec![10, 20, 30, 40]));
        let mut surface = vec![0u8; 64];
        let mut lr = LockedRect {
            pitch: 32,
            bits: &mut surface,
        };
        copy_planar_to_surface(&image, &mut lr);

        assert_eq!(surface[3], 30);
        assert_eq!(surface[7], 40);
        assert_eq!(surface[32 + 3], 10);
        assert_eq!(surface[32 + 7], 20);
        // padding past the row is untouched
        assert!(surface[8..32].iter().all(|&b| b == 0));
    }

    #[test]
    fn surface_layouts() {
        assert_eq!(pad4(0), 0);
        assert_eq!(pad4(1), 4);
        assert_eq!(pad4(8), 8);
        assert_eq!(pad4(9), 12);
        assert_eq!(TextureFormat::LinA8R8G8B8.surface_layout(3, 2), (12, 24));
        assert_eq!(TextureFormat::Dxt1.surface_layout(8, 8), (16, 32));
        assert_eq!(TextureFormat::Dxt1.surface_layout(2, 2), (8, 8));
    }

    #[test]
    fn memory_device_refuses_oversized_and_double_locks() {
        let mut device = MemoryDevice::with_max_dimension(16);
        assert!(device
            .create_texture(32, 4, TextureFormat::LinA8R8G8B8)
            .is_none());
        assert!(device.create_texture(0, 4, TextureFormat::Dxt1).is_none());

        let mut tex = device.create_texture(16, 16, TextureFormat::Dxt1).unwrap();
        assert!(device.lock_rect(&mut tex).is_some());
        assert!(tex.is_locked());
        assert!(device.lock_rect(&mut tex).is_none());
        device.unlock_rect(&mut tex);
        assert!(!tex.is_locked());
    }
}
