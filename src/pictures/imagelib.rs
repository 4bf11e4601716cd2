// src/pictures/imagelib.rs
//! General-purpose image library: decodes anything `image` understands and
//! writes cached thumbnails.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Cursor, Seek, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use fast_image_resize as fir;
use image::{imageops, DynamicImage, ImageFormat, ImageReader, RgbaImage};
use tracing::debug;

use super::error::PictureError;
use super::types::{ImageInfo, PlanarImage};
use super::uri;

/// Largest box that fits `max_w` x `max_h` while keeping the aspect ratio.
/// Never upscales; a zero bound means "unbounded".
pub fn fit_within(src_w: u32, src_h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (src_w, src_h);
    }
    let max_w = if max_w == 0 { src_w } else { max_w };
    let max_h = if max_h == 0 { src_h } else { max_h };
    if src_w <= max_w && src_h <= max_h {
        return (src_w, src_h);
    }
    let scale = (max_w as f64 / src_w as f64).min(max_h as f64 / src_h as f64);
    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

pub fn resize_rgba(source: &RgbaImage, target_w: u32, target_h: u32) -> Result<RgbaImage> {
    if target_w == 0 || target_h == 0 {
        bail!("resize dimensions must be positive");
    }
    if source.width() == target_w && source.height() == target_h {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for thumbnail resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("thumbnail resize failed")?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| anyhow!("failed to construct resized RGBA image"))
}

/// Shrink to fit the box; returns the input untouched when it already fits.
pub fn fit_rgba(source: RgbaImage, max_w: u32, max_h: u32) -> Result<RgbaImage> {
    let (w, h) = fit_within(source.width(), source.height(), max_w, max_h);
    if (w, h) == source.dimensions() {
        return Ok(source);
    }
    resize_rgba(&source, w, h)
}

pub fn read_orientation<R: BufRead + Seek>(reader: &mut R) -> Option<u16> {
    let exif = exif::Reader::new().read_from_container(reader).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let val = field.value.get_uint(0)?;
    Some(val as u16)
}

/// Apply an EXIF orientation tag. Unknown values leave the image as is.
pub fn apply_orientation(img: RgbaImage, orientation: u16) -> RgbaImage {
    match orientation {
        2 => imageops::flip_horizontal(&img),
        3 => imageops::rotate180(&img),
        4 => imageops::flip_vertical(&img),
        5 => imageops::flip_horizontal(&imageops::rotate90(&img)),
        6 => imageops::rotate90(&img),
        7 => imageops::flip_horizontal(&imageops::rotate270(&img)),
        8 => imageops::rotate270(&img),
        _ => img,
    }
}

pub fn decode_file(path: &Path) -> Result<DynamicImage> {
    let img = ImageReader::open(path)
        .with_context(|| format!("open image {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("guess format {}", path.display()))?
        .decode()
        .with_context(|| format!("decode {}", path.display()))?;
    Ok(img)
}

/// Decode an in-memory buffer, trusting the extension hint first.
pub fn decode_memory(buffer: &[u8], extension: &str) -> Result<DynamicImage> {
    let hinted = ImageFormat::from_extension(extension.trim_start_matches('.'));
    if let Some(format) = hinted {
        match image::load_from_memory_with_format(buffer, format) {
            Ok(img) => return Ok(img),
            Err(err) => debug!("buffer is not {format:?} ({err}); sniffing instead"),
        }
    }
    image::load_from_memory(buffer).context("decode memory buffer")
}

/// Convert a BGRA surface (`stride` bytes per row) into RGBA.
pub fn surface_to_rgba(buffer: &[u8], width: u32, height: u32, stride: usize) -> Result<RgbaImage> {
    let row_len = width as usize * 4;
    if width == 0 || height == 0 {
        bail!("empty surface");
    }
    if stride < row_len {
        bail!("stride {stride} shorter than a {width} pixel row");
    }
    let needed = stride * (height as usize - 1) + row_len;
    if buffer.len() < needed {
        bail!("surface holds {} bytes, {needed} needed", buffer.len());
    }

    let mut rgba = Vec::with_capacity(row_len * height as usize);
    for row in buffer.chunks(stride).take(height as usize) {
        for px in row[..row_len].chunks_exact(4) {
            rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }
    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow!("failed to construct RGBA image from surface"))
}

fn has_transparency(img: &RgbaImage) -> bool {
    img.pixels().any(|p| p[3] != 0xff)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

/// `.png` is always PNG, `.jpg`/`.jpeg` always JPEG; anything else (thumbs
/// are `.tbn`) is JPEG unless the picture is transparent.
pub fn output_format(dest: &Path, transparent: bool) -> OutputFormat {
    let ext = uri::get_extension(&dest.to_string_lossy());
    match ext.as_str() {
        ".png" => OutputFormat::Png,
        ".jpg" | ".jpeg" => OutputFormat::Jpeg,
        _ if transparent => OutputFormat::Png,
        _ => OutputFormat::Jpeg,
    }
}

pub fn encode(img: &RgbaImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
    let mut bytes: Vec<u8> = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
            encoder.encode_image(&rgb).context("jpeg encode")?;
        }
        OutputFormat::Png => {
            img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                .context("png encode")?;
        }
    }
    Ok(bytes)
}

/// Encode by destination and write through a `.part` file.
pub fn save_image(img: &RgbaImage, dest: &Path, quality: u8) -> Result<()> {
    save_image_as(img, dest, output_format(dest, has_transparency(img)), quality)
}

pub fn save_image_as(img: &RgbaImage, dest: &Path, format: OutputFormat, quality: u8) -> Result<()> {
    let bytes = encode(img, format, quality)?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = Path::new(&tmp);
    {
        let mut f = File::create(tmp).with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(&bytes)
            .with_context(|| format!("write {}", tmp.display()))?;
    }
    fs::rename(tmp, dest).with_context(|| format!("rename to {}", dest.display()))?;
    debug!(
        "wrote {}x{} {:?} to {}",
        img.width(),
        img.height(),
        format,
        dest.display()
    );
    Ok(())
}

/// Pack RGBA into the bottom-up planar layout handed to texture uploads.
pub fn to_planar(img: &RgbaImage, original: (u32, u32), with_alpha: bool) -> PlanarImage {
    let (w, h) = img.dimensions();
    let stride = PlanarImage::bgr_stride(w);
    let mut texture = vec![0u8; stride * h as usize];
    let mut alpha = with_alpha.then(|| vec![0u8; w as usize * h as usize]);

    for (y, row) in img.rows().enumerate() {
        let dst_y = h as usize - 1 - y;
        for (x, px) in row.enumerate() {
            let at = dst_y * stride + x * 3;
            texture[at..at + 3].copy_from_slice(&[px[2], px[1], px[0]]);
            if let Some(alpha) = alpha.as_mut() {
                alpha[dst_y * w as usize + x] = px[3];
            }
        }
    }

    PlanarImage {
        info: ImageInfo {
            width: w,
            height: h,
            original_width: original.0,
            original_height: original.1,
        },
        texture,
        alpha,
    }
}

fn rotate_right_angles(img: RgbaImage, degrees: f32) -> Result<RgbaImage, PictureError> {
    if !degrees.is_finite() {
        return Err(PictureError::UnsupportedRotation(degrees));
    }
    let normalized = degrees.rem_euclid(360.0);
    let quarter = (normalized / 90.0).round();
    if (normalized - quarter * 90.0).abs() > 0.01 {
        return Err(PictureError::UnsupportedRotation(degrees));
    }
    Ok(match quarter as u32 % 4 {
        1 => imageops::rotate90(&img),
        2 => imageops::rotate180(&img),
        3 => imageops::rotate270(&img),
        _ => img,
    })
}

/// Statically linked image library.
#[derive(Clone, Copy, Debug)]
pub struct ImageLib {
    quality: u8,
}

impl ImageLib {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// Decode `path`, shrinking it into `max_w` x `max_h` (zero = native size).
    pub fn load_image(&self, path: &Path, max_w: u32, max_h: u32) -> Result<PlanarImage, PictureError> {
        let label = path.display().to_string();
        let img = decode_file(path).map_err(|e| PictureError::decode(&label, e))?;
        let with_alpha = img.color().has_alpha();
        let rgba = img.to_rgba8();
        let original = rgba.dimensions();
        if original.0 == 0 || original.1 == 0 {
            return Err(PictureError::decode(label, anyhow!("image has no pixels")));
        }
        let fitted = fit_rgba(rgba, max_w, max_h).map_err(|e| PictureError::decode(&label, e))?;
        Ok(to_planar(&fitted, original, with_alpha))
    }

    pub fn create_thumbnail(
        &self,
        src: &Path,
        dest: &Path,
        width: u32,
        height: u32,
        rotate_exif: bool,
    ) -> Result<(), PictureError> {
        let label = src.display().to_string();
        let mut rgba = decode_file(src)
            .map_err(|e| PictureError::decode(&label, e))?
            .to_rgba8();

        if rotate_exif {
            let orientation = File::open(src)
                .ok()
                .and_then(|f| read_orientation(&mut BufReader::new(f)));
            if let Some(o) = orientation {
                debug!("exif orientation {} for {}", o, src.display());
                rgba = apply_orientation(rgba, o);
            }
        }

        self.write_fitted(rgba, dest, width, height)
    }

    pub fn create_thumbnail_from_memory(
        &self,
        buffer: &[u8],
        extension: &str,
        dest: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), PictureError> {
        let rgba = decode_memory(buffer, extension)
            .map_err(|e| PictureError::decode(format!("<memory {extension}>"), e))?
            .to_rgba8();
        self.write_fitted(rgba, dest, width, height)
    }

    /// 2x2 mosaic of up to four pictures; empty slots stay transparent.
    pub fn create_folder_thumbnail(
        &self,
        thumbs: &[Option<&Path>; 4],
        dest: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), PictureError> {
        let (cell_w, cell_h) = ((width / 2).max(1), (height / 2).max(1));
        let mut canvas = RgbaImage::new(cell_w * 2, cell_h * 2);
        let mut placed = 0usize;

        for (slot, thumb) in thumbs.iter().enumerate() {
            let Some(path) = thumb else { continue };
            let cell = match decode_file(path).and_then(|img| fit_rgba(img.to_rgba8(), cell_w, cell_h)) {
                Ok(cell) => cell,
                Err(err) => {
                    debug!("skipping folder thumb slot {slot}: {err:#}");
                    continue;
                }
            };
            let ox = (slot as u32 % 2) * cell_w + (cell_w - cell.width()) / 2;
            let oy = (slot as u32 / 2) * cell_h + (cell_h - cell.height()) / 2;
            imageops::overlay(&mut canvas, &cell, ox as i64, oy as i64);
            placed += 1;
        }

        if placed == 0 {
            return Err(PictureError::decode(
                dest.display().to_string(),
                anyhow!("none of the folder pictures could be read"),
            ));
        }
        save_image(&canvas, dest, self.quality)
            .map_err(|e| PictureError::encode(dest.display().to_string(), e))
    }

    pub fn create_thumbnail_from_surface(
        &self,
        buffer: &[u8],
        width: u32,
        height: u32,
        stride: usize,
        dest: &Path,
    ) -> Result<(), PictureError> {
        let rgba = surface_to_rgba(buffer, width, height, stride)
            .map_err(|e| PictureError::decode("<surface>", e))?;
        save_image(&rgba, dest, self.quality)
            .map_err(|e| PictureError::encode(dest.display().to_string(), e))
    }

    /// Rotate (right angles only), mirror, shrink and re-encode `src` into `dest`.
    /// A zero `quality` keeps the library default.
    #[allow(clippy::too_many_arguments)]
    pub fn convert_file(
        &self,
        src: &Path,
        dest: &Path,
        rotate_degrees: f32,
        width: u32,
        height: u32,
        quality: u32,
        mirror: bool,
    ) -> Result<(), PictureError> {
        let label = src.display().to_string();
        let mut rgba = decode_file(src)
            .map_err(|e| PictureError::decode(&label, e))?
            .to_rgba8();
        rgba = rotate_right_angles(rgba, rotate_degrees)?;
        if mirror {
            rgba = imageops::flip_horizontal(&rgba);
        }
        let rgba = fit_rgba(rgba, width, height).map_err(|e| PictureError::decode(&label, e))?;
        let quality = match quality {
            0 => self.quality,
            q => q.min(100) as u8,
        };
        save_image(&rgba, dest, quality)
            .map_err(|e| PictureError::encode(dest.display().to_string(), e))
    }

    fn write_fitted(&self, rgba: RgbaImage, dest: &Path, width: u32, height: u32) -> Result<(), PictureError> {
        let dest_label = dest.display().to_string();
        let fitted = fit_rgba(rgba, width, height).map_err(|e| PictureError::encode(&dest_label, e))?;
        save_image(&fitted, dest, self.quality).map_err(|e| PictureError::encode(dest_label, e))
    }
}
