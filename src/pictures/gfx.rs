// src/pictures/gfx.rs
use egui::{self as eg, ColorImage, TextureHandle};

use super::texture::{LockedRect, MemoryDevice, MemoryTexture, TextureDevice, TextureFormat};

/// Texture owned by egui. Writes go to a staging surface which is uploaded on unlock.
pub struct EguiTexture {
    name: String,
    staging: MemoryTexture,
    handle: Option<TextureHandle>,
}

impl EguiTexture {
    pub fn handle(&self) -> Option<&TextureHandle> {
        self.handle.as_ref()
    }

    pub fn size(&self) -> [usize; 2] {
        [self.staging.width as usize, self.staging.height as usize]
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Texture device backed by an egui context. (UI thread only)
pub struct EguiDevice {
    ctx: eg::Context,
    staging: MemoryDevice,
    next_id: u64,
}

impl EguiDevice {
    pub fn new(ctx: eg::Context) -> Self {
        Self {
            ctx,
            staging: MemoryDevice::default(),
            next_id: 0,
        }
    }
}

impl TextureDevice for EguiDevice {
    type Texture = EguiTexture;

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Option<EguiTexture> {
        let staging = self.staging.create_texture(width, height, format)?;
        self.next_id += 1;
        Some(EguiTexture {
            name: format!("picture-{}", self.next_id),
            staging,
            handle: None,
        })
    }

    fn lock_rect<'t>(&mut self, texture: &'t mut EguiTexture) -> Option<LockedRect<'t>> {
        self.staging.lock_rect(&mut texture.staging)
    }

    fn unlock_rect(&mut self, texture: &mut EguiTexture) {
        self.staging.unlock_rect(&mut texture.staging);
        let image = color_image(&texture.staging);
        match texture.handle.as_mut() {
            Some(handle) => handle.set(image, eg::TextureOptions::LINEAR),
            None => {
                texture.handle = Some(self.ctx.load_texture(
                    texture.name.clone(),
                    image,
                    eg::TextureOptions::LINEAR,
                ))
            }
        }
    }
}

/// Staging surface to an unmultiplied RGBA egui image.
pub fn color_image(texture: &MemoryTexture) -> ColorImage {
    let size = [texture.width as usize, texture.height as usize];
    let rgba = match texture.format {
        TextureFormat::LinA8R8G8B8 => bgra_to_rgba(texture),
        TextureFormat::Dxt1 => decode_dxt1(&texture.pixels, texture.width, texture.height),
    };
    ColorImage::from_rgba_unmultiplied(size, &rgba)
}

fn bgra_to_rgba(texture: &MemoryTexture) -> Vec<u8> {
    let row_len = texture.width as usize * 4;
    let mut rgba = Vec::with_capacity(row_len * texture.height as usize);
    for row in texture.pixels.chunks(texture.pitch).take(texture.height as usize) {
        for px in row[..row_len].chunks_exact(4) {
            rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }
    rgba
}

fn rgb565(c: u16) -> [u8; 3] {
    let r = ((c >> 11) & 0x1f) as u32;
    let g = ((c >> 5) & 0x3f) as u32;
    let b = (c & 0x1f) as u32;
    [
        ((r * 255 + 15) / 31) as u8,
        ((g * 255 + 31) / 63) as u8,
        ((b * 255 + 15) / 31) as u8,
    ]
}

/// Expand BC1 blocks to RGBA8; egui has no compressed texture formats.
pub fn decode_dxt1(blocks: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let blocks_x = w.div_ceil(4).max(1);
    let mut rgba = vec![0u8; w * h * 4];

    for (i, block) in blocks.chunks_exact(8).enumerate() {
        let (bx, by) = (i % blocks_x * 4, i / blocks_x * 4);
        if by >= h {
            break;
        }
        let c0 = u16::from_le_bytes([block[0], block[1]]);
        let c1 = u16::from_le_bytes([block[2], block[3]]);
        let (p0, p1) = (rgb565(c0), rgb565(c1));
        let mix = |a: u8, b: u8, wa: u32, wb: u32| ((a as u32 * wa + b as u32 * wb) / (wa + wb)) as u8;

        let mut palette = [[0u8; 4]; 4];
        palette[0] = [p0[0], p0[1], p0[2], 255];
        palette[1] = [p1[0], p1[1], p1[2], 255];
        if c0 > c1 {
            palette[2] = [mix(p0[0], p1[0], 2, 1), mix(p0[1], p1[1], 2, 1), mix(p0[2], p1[2], 2, 1), 255];
            palette[3] = [mix(p0[0], p1[0], 1, 2), mix(p0[1], p1[1], 1, 2), mix(p0[2], p1[2], 1, 2), 255];
        } else {
            palette[2] = [mix(p0[0], p1[0], 1, 1), mix(p0[1], p1[1], 1, 1), mix(p0[2], p1[2], 1, 1), 255];
            palette[3] = [0, 0, 0, 0];
        }

        let bits = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        for py in 0..4 {
            for px in 0..4 {
                let (x, y) = (bx + px, by + py);
                if x >= w || y >= h {
                    continue;
                }
                let idx = (bits >> (2 * (py * 4 + px))) & 0b11;
                let at = (y * w + x) * 4;
                rgba[at..at + 4].copy_from_slice(&palette[idx as usize]);
            }
        }
    }
    rgba
}
