// src/pictures/dds.rs
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ddsfile::{D3DFormat, Dds};

/// File offsets of `reserved1[0]` and `reserved1[1]` (4 byte magic + 28 header bytes).
const ORG_WIDTH_OFFSET: usize = 32;
const ORG_HEIGHT_OFFSET: usize = 36;

fn read_u32_le(bytes: &[u8], at: usize) -> u32 {
    bytes
        .get(at..at + 4)
        .and_then(|b| b.try_into().ok())
        .map_or(0, u32::from_le_bytes)
}

/// Pre-padded DXT1 sidecar produced offline for fanart.
///
/// The texture is always power-of-two sized; the size of the picture it holds
/// is stored in the first two reserved header words by the tool that writes
/// these files. Files without that mark report the texture size.
#[derive(Clone, Debug)]
pub struct DdsImage {
    width: u32,
    height: u32,
    org_width: u32,
    org_height: u32,
    data: Vec<u8>,
}

impl DdsImage {
    pub fn read_file(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to open dds image {}", path.display()))?;
        let dds = Dds::read(&bytes[..])
            .with_context(|| format!("failed to parse dds image {}", path.display()))?;

        if !matches!(dds.get_d3d_format(), Some(D3DFormat::DXT1)) {
            bail!("{} is not a DXT1 texture", path.display());
        }
        if dds.get_num_mipmap_levels() > 1 {
            bail!("{} carries mipmaps", path.display());
        }

        let width = dds.get_width();
        let height = dds.get_height();
        if width == 0 || height == 0 {
            bail!("{} has an empty surface", path.display());
        }
        if !width.is_power_of_two() || !height.is_power_of_two() {
            bail!(
                "{} is {width}x{height}, expected power-of-two padding",
                path.display()
            );
        }

        // ddsfile keeps the reserved words private
        let org_width = match read_u32_le(&bytes, ORG_WIDTH_OFFSET) {
            w if w > 0 && w <= width => w,
            _ => width,
        };
        let org_height = match read_u32_le(&bytes, ORG_HEIGHT_OFFSET) {
            h if h > 0 && h <= height => h,
            _ => height,
        };

        Ok(Self {
            width,
            height,
            org_width,
            org_height,
            data: dds.data,
        })
    }

    /// Texture width (power of two).
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Width of the picture inside the padded texture.
    pub fn org_width(&self) -> u32 {
        self.org_width
    }

    pub fn org_height(&self) -> u32 {
        self.org_height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
