// src/pictures/mod.rs: texture loading, thumbnail and fanart caching

// ---- Standard lib imports ----
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---- Crates ----
use reqwest::blocking::Client;
use tracing::{error, info, warn};

// ---- Local modules ----
pub mod cache;
pub mod crc;
pub mod dds;
pub mod error;
pub mod gfx;
pub mod imagelib;
pub mod jpeg;
pub mod memory;
pub mod texture;
pub mod types;
pub mod uri;

use crate::config::AppConfig;
use cache::CacheDirs;
use dds::DdsImage;
use error::PictureError;
use imagelib::ImageLib;
use jpeg::JpegIo;
use memory::{MemoryProbe, SystemMemory};
use texture::{pad4, MemoryDevice, TextureDevice, TextureFormat};
pub use types::{FolderThumbs, ImageInfo, PlanarImage};

/// Extensions routed through the dedicated JPEG decoder.
const JPEG_EXTENSIONS: &[&str] = &[".jpg", ".tbn"];

pub struct Picture {
    config: AppConfig,
    dirs: CacheDirs,
    memory: Box<dyn MemoryProbe>,
    client: OnceLock<Client>,
    info: ImageInfo,
}

impl Picture {
    pub fn new(config: AppConfig) -> Self {
        let mut dirs = CacheDirs::from_config(&config);
        dirs.ensure();
        Self {
            config,
            dirs,
            memory: Box::new(SystemMemory),
            client: OnceLock::new(),
            info: ImageInfo::default(),
        }
    }

    pub fn with_memory_probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        self.memory = Box::new(probe);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn dirs(&self) -> &CacheDirs {
        &self.dirs
    }

    /// Dimensions recorded by the last `load`.
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn image_lib(&self) -> ImageLib {
        ImageLib::new(self.config.jpeg_quality)
    }

    fn client(&self) -> Result<&Client, PictureError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = cache::http_client(&self.config)?;
        Ok(self.client.get_or_init(|| client))
    }

    /// Load `file` into a texture created on `device`, bounded by `width` x `height`
    /// (zero = native size).
    ///
    /// Order of preference: a `.dds` sidecar when enabled, the dedicated JPEG decoder
    /// for `.jpg`/`.tbn` while enough memory is free, then the general image library.
    pub fn load<D: TextureDevice>(
        &mut self,
        device: &mut D,
        file: &str,
        width: u32,
        height: u32,
    ) -> Option<D::Texture> {
        let path = self.dirs.resolve(file);

        if self.config.use_dds_fanart {
            let dds_path = self.dirs.resolve(&uri::replace_extension(file, ".dds"));
            if dds_path.exists() {
                if let Some(texture) = self.load_dds(device, &dds_path) {
                    return Some(texture);
                }
            }
        }

        if memory::has_free_memory(self.memory.as_ref(), self.config.min_free_memory_mb)
            && uri::has_extension(file, JPEG_EXTENSIONS)
        {
            match JpegIo::open(&path, width, height) {
                Ok(jpeg) => {
                    if let Some(result) = self.load_jpeg(device, &jpeg, file) {
                        return result;
                    }
                }
                Err(err) => {
                    warn!("JpegIO could not open {file} ({err:#}); trying image library");
                }
            }
        }

        self.load_generic(device, &path, file, width, height)
    }

    /// `None` falls through to the next loader.
    fn load_dds<D: TextureDevice>(&mut self, device: &mut D, dds_path: &Path) -> Option<D::Texture> {
        let img = match DdsImage::read_file(dds_path) {
            Ok(img) => img,
            Err(err) => {
                error!("load - could not read dds image {} ({err:#})", dds_path.display());
                return None;
            }
        };

        self.info = ImageInfo {
            width: img.org_width(),
            height: img.org_height(),
            original_width: img.org_width(),
            original_height: img.org_height(),
        };
        // allocated at the padded power-of-two size
        let mut texture = match create_texture(device, img.width(), img.height(), TextureFormat::Dxt1) {
            Ok(texture) => texture,
            Err(err) => {
                error!("load - {err} for dds image {}", dds_path.display());
                return None;
            }
        };
        if let Some(lr) = device.lock_rect(&mut texture) {
            let n = img.size().min(lr.bits.len());
            lr.bits[..n].copy_from_slice(&img.data()[..n]);
            device.unlock_rect(&mut texture);
        }
        Some(texture)
    }

    /// `None` falls through to the image library, `Some(None)` is a hard failure.
    fn load_jpeg<D: TextureDevice>(
        &mut self,
        device: &mut D,
        jpeg: &JpegIo,
        file: &str,
    ) -> Option<Option<D::Texture>> {
        if jpeg.org_width() == 0 || jpeg.org_height() == 0 {
            return Some(None);
        }

        self.info = ImageInfo {
            width: jpeg.width(),
            height: jpeg.height(),
            original_width: jpeg.org_width(),
            original_height: jpeg.org_height(),
        };
        let mut texture = match create_texture(
            device,
            pad4(jpeg.width()),
            pad4(jpeg.height()),
            TextureFormat::LinA8R8G8B8,
        ) {
            Ok(texture) => texture,
            Err(err) => {
                error!("load - {err} while loading image using JpegIO {file}");
                return Some(None);
            }
        };

        let decoded = {
            let lr = device.lock_rect(&mut texture)?;
            jpeg.decode(lr.bits, lr.pitch, TextureFormat::LinA8R8G8B8)
        };
        device.unlock_rect(&mut texture);
        match decoded {
            Ok(()) => Some(Some(texture)),
            Err(err) => {
                error!("load - JpegIO failed to decode {file} ({err:#})");
                Some(None)
            }
        }
    }

    fn load_generic<D: TextureDevice>(
        &mut self,
        device: &mut D,
        path: &Path,
        file: &str,
        width: u32,
        height: u32,
    ) -> Option<D::Texture> {
        self.info = ImageInfo::default();
        let image = match self.image_lib().load_image(path, width, height) {
            Ok(image) => image,
            Err(err) => {
                error!("PICTURE: Error loading image {file} ({err})");
                return None;
            }
        };
        self.info = image.info;

        let mut texture = match create_texture(
            device,
            image.info.width,
            image.info.height,
            TextureFormat::LinA8R8G8B8,
        ) {
            Ok(texture) => texture,
            Err(err) => {
                error!("load - {err} while loading image using ImageLib {file}");
                return None;
            }
        };
        if let Some(mut lr) = device.lock_rect(&mut texture) {
            texture::copy_planar_to_surface(&image, &mut lr);
            device.unlock_rect(&mut texture);
        }
        Some(texture)
    }

    /// Thumbnail `file` into `thumb_file` at the configured square size.
    /// With `check_existence` an existing thumbnail is kept.
    pub fn create_thumbnail(&self, file: &str, thumb_file: &str, check_existence: bool) -> bool {
        if check_existence && self.dirs.resolve(thumb_file).exists() {
            return true;
        }
        let size = self.config.thumb_size;
        self.cache_image(file, thumb_file, size, size)
    }

    /// Cache `source_url` (local path or internet url) into `dest_file`.
    ///
    /// With a positive size the picture is re-encoded to fit; otherwise the bytes are
    /// stored unchanged.
    pub fn cache_image(&self, source_url: &str, dest_file: &str, width: u32, height: u32) -> bool {
        match self.try_cache_image(source_url, dest_file, width, height) {
            Ok(()) => true,
            Err(err) => {
                error!("cache_image - unable to create {dest_file} from {source_url} ({err})");
                false
            }
        }
    }

    fn try_cache_image(
        &self,
        source_url: &str,
        dest_file: &str,
        width: u32,
        height: u32,
    ) -> Result<(), PictureError> {
        let dest = self.dirs.resolve(dest_file);
        let remote = uri::is_internet_stream(source_url, true);

        if width == 0 || height == 0 {
            info!("Caching image from: {source_url} to {dest_file}");
            return if remote {
                cache::download(self.client()?, source_url, &dest)
            } else {
                cache::copy_local(&self.dirs.resolve(source_url), &dest)
            };
        }

        info!(
            "Caching image from: {source_url} to {dest_file} with width {width} and height {height}"
        );

        let local = if remote {
            let temp = self.dirs.temp_path_for_url(source_url);
            cache::download(self.client()?, source_url, &temp)?;
            TempSource::Downloaded(temp)
        } else {
            TempSource::Local(self.dirs.resolve(source_url))
        };

        let result = self.thumbnail_local(source_url, local.path(), &dest, width, height);
        drop(local);
        result
    }

    fn thumbnail_local(
        &self,
        source_url: &str,
        src: &Path,
        dest: &Path,
        width: u32,
        height: u32,
    ) -> Result<(), PictureError> {
        if uri::has_extension(source_url, JPEG_EXTENSIONS) {
            match jpeg::create_thumbnail(src, dest, width, height, self.config.jpeg_quality) {
                Ok(()) => return Ok(()),
                Err(err) => warn!("JpegIO thumbnail of {source_url} failed ({err:#}); trying image library"),
            }
        }
        self.image_lib()
            .create_thumbnail(src, dest, width, height, self.config.use_exif_rotation)
    }

    pub fn cache_thumb(&self, source_url: &str, dest_file: &str) -> bool {
        let size = self.config.thumb_size;
        self.cache_image(source_url, dest_file, size, size)
    }

    /// Fanart is cached at the configured height, assuming a 16:9 picture.
    pub fn cache_fanart(&self, source_url: &str, dest_file: &str) -> bool {
        let (width, height) = self.config.fanart_size();
        self.cache_image(source_url, dest_file, width, height)
    }

    /// Thumbnail an in-memory picture (embedded album art and the like).
    /// `extension` has no leading dot.
    pub fn create_thumbnail_from_memory(&self, buffer: &[u8], extension: &str, thumb_file: &str) -> bool {
        info!("Creating album thumb from memory: {thumb_file}");
        let dest = self.dirs.resolve(thumb_file);
        let size = self.config.thumb_size;

        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        if ext == "jpg" || ext == "tbn" {
            match jpeg::create_thumbnail_from_memory(buffer, &dest, size, size, self.config.jpeg_quality) {
                Ok(()) => return true,
                Err(err) => warn!("JpegIO could not thumbnail buffer ({err:#}); trying image library"),
            }
        }

        match self
            .image_lib()
            .create_thumbnail_from_memory(buffer, &ext, &dest, size, size)
        {
            Ok(()) => true,
            Err(err) => {
                error!("create_thumbnail_from_memory: exception with fileType: {extension} ({err})");
                false
            }
        }
    }

    /// Mold up to four pictures into a single folder thumbnail. Each source is
    /// thumbnailed into its cached slot first (existing ones are reused).
    pub fn create_folder_thumb(&self, thumbs: &FolderThumbs, folder_thumb: &str) -> bool {
        let mut cached: [Option<PathBuf>; 4] = Default::default();
        for (slot, thumb) in cached.iter_mut().zip(thumbs) {
            if thumb.is_empty() {
                continue;
            }
            let cached_thumb = self.dirs.cached_picture_thumb(thumb);
            self.create_thumbnail(thumb, &cached_thumb.to_string_lossy(), true);
            *slot = Some(cached_thumb);
        }

        let slots = [
            cached[0].as_deref(),
            cached[1].as_deref(),
            cached[2].as_deref(),
            cached[3].as_deref(),
        ];
        let size = self.config.thumb_size;
        match self.image_lib().create_folder_thumbnail(
            &slots,
            &self.dirs.resolve(folder_thumb),
            size,
            size,
        ) {
            Ok(()) => true,
            Err(err) => {
                error!("create_folder_thumb failed for folder thumb {folder_thumb} ({err})");
                false
            }
        }
    }

    /// Save an A8R8G8B8 surface (`stride` bytes per row) as a thumbnail.
    pub fn create_thumbnail_from_surface(
        &self,
        buffer: &[u8],
        width: u32,
        height: u32,
        stride: usize,
        thumb_file: &str,
    ) -> bool {
        if buffer.is_empty() {
            return false;
        }
        let dest = self.dirs.resolve(thumb_file);

        if uri::get_extension(thumb_file) == ".jpg" {
            match jpeg::create_thumbnail_from_surface(
                buffer,
                width,
                height,
                stride,
                &dest,
                self.config.jpeg_quality,
            ) {
                Ok(()) => return true,
                Err(err) => warn!("JpegIO could not encode surface ({err:#}); trying image library"),
            }
        }

        match self
            .image_lib()
            .create_thumbnail_from_surface(buffer, width, height, stride, &dest)
        {
            Ok(()) => true,
            Err(err) => {
                error!("create_thumbnail_from_surface failed for {thumb_file} ({err})");
                false
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn convert_file(
        &self,
        src_file: &str,
        dest_file: &str,
        rotate_degrees: f32,
        width: u32,
        height: u32,
        quality: u32,
        mirror: bool,
    ) -> Result<(), PictureError> {
        self.image_lib()
            .convert_file(
                &self.dirs.resolve(src_file),
                &self.dirs.resolve(dest_file),
                rotate_degrees,
                width,
                height,
                quality,
                mirror,
            )
            .inspect_err(|err| {
                error!("PICTURE: Error {} converting image {src_file} ({err})", err.code());
            })
    }

    /// Cache a skin image as a thumbnail: load it at native size and save its surface.
    pub fn cache_skin_image(&mut self, src_file: &str, dest_file: &str) -> bool {
        let mut device = MemoryDevice::default();
        let Some(texture) = self.load(&mut device, src_file, 0, 0) else {
            return false;
        };
        if texture.format != TextureFormat::LinA8R8G8B8 {
            // dds sidecars are block compressed
            let width = self.info.width;
            let height = self.info.height;
            let rgba = gfx::decode_dxt1(&texture.pixels, texture.width, texture.height);
            let bgra = dxt_rgba_to_bgra(&rgba, texture.width, width, height);
            return self.create_thumbnail_from_surface(&bgra, width, height, width as usize * 4, dest_file);
        }
        let (width, height) = (self.info.width, self.info.height);
        self.create_thumbnail_from_surface(&texture.pixels, width, height, texture.pitch, dest_file)
    }

    /// Remove leftovers of interrupted downloads.
    pub fn clean_temp(&self) -> usize {
        match cache::clean_temp_dir(self.dirs.temp_dir(), cache::TEMP_RETENTION) {
            Ok(removed) => removed,
            Err(err) => {
                warn!("temp cache cleanup failed: {err}");
                0
            }
        }
    }
}

fn create_texture<D: TextureDevice>(
    device: &mut D,
    width: u32,
    height: u32,
    format: TextureFormat,
) -> Result<D::Texture, PictureError> {
    device
        .create_texture(width, height, format)
        .ok_or(PictureError::Texture { width, height })
}

/// Crop the top-left `width` x `height` of a decoded DXT texture into BGRA rows.
fn dxt_rgba_to_bgra(rgba: &[u8], tex_width: u32, width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(width as usize * height as usize * 4);
    for row in rgba.chunks(tex_width as usize * 4).take(height as usize) {
        for px in row[..width as usize * 4].chunks_exact(4) {
            out.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
        }
    }
    out
}

/// A local copy of the source; downloaded copies are deleted on drop.
enum TempSource {
    Local(PathBuf),
    Downloaded(PathBuf),
}

impl TempSource {
    fn path(&self) -> &Path {
        match self {
            Self::Local(p) | Self::Downloaded(p) => p,
        }
    }
}

impl Drop for TempSource {
    fn drop(&mut self) {
        if let Self::Downloaded(path) = self {
            if let Err(err) = fs::remove_file(&*path) {
                warn!("failed to delete temp file {}: {err}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests;
