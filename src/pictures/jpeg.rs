// src/pictures/jpeg.rs
//! Dedicated JPEG path. Decodes with DCT scaling straight into texture
//! surfaces, which is far cheaper than a full decode through the general library.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use image::RgbaImage;
use jpeg_decoder::{Decoder as JpegDecoder, Error as JpegError, PixelFormat};

use super::imagelib::{fit_rgba, save_image, save_image_as, surface_to_rgba, OutputFormat};
use super::texture::TextureFormat;

fn jpeg_err(err: JpegError) -> anyhow::Error {
    match err {
        JpegError::Unsupported(feature) => anyhow!("unsupported JPEG feature: {feature:?}"),
        other => anyhow!(other),
    }
}

fn clamp_u16(v: u32) -> u16 {
    v.clamp(1, u16::MAX as u32) as u16
}

/// An opened JPEG with its header parsed and output scale chosen.
pub struct JpegIo {
    data: Vec<u8>,
    label: String,
    org_width: u32,
    org_height: u32,
    width: u32,
    height: u32,
}

impl JpegIo {
    /// Open `path`; when both bounds are positive and the picture is larger,
    /// the decode is scaled to the smallest DCT step still covering the box.
    pub fn open(path: &Path, max_w: u32, max_h: u32) -> Result<Self> {
        let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_memory(data, path.display().to_string(), max_w, max_h)
    }

    pub fn from_memory(data: Vec<u8>, label: String, max_w: u32, max_h: u32) -> Result<Self> {
        let mut decoder = JpegDecoder::new(data.as_slice());
        decoder.read_info().map_err(jpeg_err)?;
        let info = decoder
            .info()
            .ok_or_else(|| anyhow!("missing image info while reading JPEG {label}"))?;
        let org_width = info.width as u32;
        let org_height = info.height as u32;

        let (width, height) =
            if max_w > 0 && max_h > 0 && (org_width > max_w || org_height > max_h) {
                let (w, h) = decoder
                    .scale(clamp_u16(max_w), clamp_u16(max_h))
                    .map_err(jpeg_err)?;
                (w as u32, h as u32)
            } else {
                (org_width, org_height)
            };

        Ok(Self {
            data,
            label,
            org_width,
            org_height,
            width,
            height,
        })
    }

    pub fn org_width(&self) -> u32 {
        self.org_width
    }

    pub fn org_height(&self) -> u32 {
        self.org_height
    }

    /// Output width after scaling.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn decode_rgba(&self) -> Result<RgbaImage> {
        let mut decoder = JpegDecoder::new(self.data.as_slice());
        if (self.width, self.height) != (self.org_width, self.org_height) {
            decoder
                .scale(clamp_u16(self.width), clamp_u16(self.height))
                .map_err(jpeg_err)?;
        }
        let pixels = decoder.decode().map_err(jpeg_err)?;
        let info = decoder
            .info()
            .ok_or_else(|| anyhow!("missing image info while decoding JPEG {}", self.label))?;
        let width = info.width as u32;
        let height = info.height as u32;

        let rgba = match info.pixel_format {
            PixelFormat::RGB24 => {
                let mut rgba = Vec::with_capacity(pixels.len() / 3 * 4);
                for chunk in pixels.chunks_exact(3) {
                    rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
                }
                rgba
            }
            PixelFormat::L8 => {
                let mut rgba = Vec::with_capacity(pixels.len() * 4);
                for &v in &pixels {
                    rgba.extend_from_slice(&[v, v, v, 255]);
                }
                rgba
            }
            PixelFormat::CMYK32 => {
                let mut rgba = Vec::with_capacity(pixels.len());
                for chunk in pixels.chunks_exact(4) {
                    let k = chunk[3] as f32 / 255.0;
                    let ink = |v: u8| {
                        let v = v as f32 / 255.0 * (1.0 - k) + k;
                        ((1.0 - v) * 255.0).round().clamp(0.0, 255.0) as u8
                    };
                    rgba.extend_from_slice(&[ink(chunk[0]), ink(chunk[1]), ink(chunk[2]), 255]);
                }
                rgba
            }
            PixelFormat::L16 => {
                bail!("16-bit grayscale JPEGs are not supported by the scaled decoder");
            }
        };

        RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| anyhow!("failed to construct RGBA image for {}", self.label))
    }

    /// Decode into a locked surface of `pitch` bytes per row.
    pub fn decode(&self, dest: &mut [u8], pitch: usize, format: TextureFormat) -> Result<()> {
        if format != TextureFormat::LinA8R8G8B8 {
            bail!("JPEG decode into {format:?} surfaces is not supported");
        }
        let rgba = self.decode_rgba()?;
        let row_len = rgba.width() as usize * 4;
        if pitch < row_len {
            bail!("surface pitch {pitch} cannot hold {} pixels", rgba.width());
        }
        if rgba.height() > 0 && dest.len() < pitch * (rgba.height() as usize - 1) + row_len {
            bail!("surface too small for {}x{}", rgba.width(), rgba.height());
        }

        for (src, dst) in rgba.as_raw().chunks_exact(row_len).zip(dest.chunks_mut(pitch)) {
            for (s, d) in src.chunks_exact(4).zip(dst[..row_len].chunks_exact_mut(4)) {
                d.copy_from_slice(&[s[2], s[1], s[0], s[3]]);
            }
        }
        Ok(())
    }

    fn write_thumbnail(&self, dest: &Path, width: u32, height: u32, quality: u8) -> Result<()> {
        if self.org_width == 0 || self.org_height == 0 {
            bail!("{} has no pixels", self.label);
        }
        let rgba = fit_rgba(self.decode_rgba()?, width, height)?;
        save_image(&rgba, dest, quality)
    }
}

pub fn create_thumbnail(src: &Path, dest: &Path, width: u32, height: u32, quality: u8) -> Result<()> {
    JpegIo::open(src, width, height)?.write_thumbnail(dest, width, height, quality)
}

pub fn create_thumbnail_from_memory(
    buffer: &[u8],
    dest: &Path,
    width: u32,
    height: u32,
    quality: u8,
) -> Result<()> {
    JpegIo::from_memory(buffer.to_vec(), "<memory>".into(), width, height)?
        .write_thumbnail(dest, width, height, quality)
}

/// Encode an A8R8G8B8 surface as JPEG; alpha is dropped.
pub fn create_thumbnail_from_surface(
    buffer: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    dest: &Path,
    quality: u8,
) -> Result<()> {
    let rgba = surface_to_rgba(buffer, width, height, stride)?;
    save_image_as(&rgba, dest, OutputFormat::Jpeg, quality)
}
