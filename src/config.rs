use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const CONFIG_ENV_VAR: &str = "PICTURE_CACHE_CONFIG";
pub const DEFAULT_CACHE_DIR: &str = ".picture_cache";

pub const DEFAULT_THUMB_SIZE: u32 = 256;
pub const DEFAULT_FANART_HEIGHT: u32 = 720;
pub const DEFAULT_MIN_FREE_MEMORY_MB: u64 = 8;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub cache_dir: PathBuf,
    /// Backing directory of `special://temp`. Defaults to `<cache_dir>/temp`.
    pub temp_dir: Option<PathBuf>,
    /// Backing directory of `special://thumbs`. Defaults to `<cache_dir>/thumbs`.
    pub thumbs_dir: Option<PathBuf>,
    pub thumb_size: u32,
    pub fanart_height: u32,
    pub use_dds_fanart: bool,
    pub use_exif_rotation: bool,
    pub min_free_memory_mb: u64,
    pub jpeg_quality: u8,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            temp_dir: None,
            thumbs_dir: None,
            thumb_size: DEFAULT_THUMB_SIZE,
            fanart_height: DEFAULT_FANART_HEIGHT,
            use_dds_fanart: false,
            use_exif_rotation: true,
            min_free_memory_mb: DEFAULT_MIN_FREE_MEMORY_MB,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: format!("picture-cache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl AppConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("temp"))
    }

    pub fn thumbs_dir(&self) -> PathBuf {
        self.thumbs_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("thumbs"))
    }

    /// Fanart is cached at the configured height with a 16:9 width.
    pub fn fanart_size(&self) -> (u32, u32) {
        let height = self.fanart_height;
        (height * 16 / 9, height)
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    cache_dir: Option<String>,
    temp_dir: Option<String>,
    thumbs_dir: Option<String>,
    #[serde(alias = "thumbsize")]
    thumb_size: Option<u32>,
    #[serde(alias = "fanartheight")]
    fanart_height: Option<u32>,
    #[serde(alias = "useddsfanart")]
    use_dds_fanart: Option<bool>,
    use_exif_rotation: Option<bool>,
    min_free_memory_mb: Option<u64>,
    jpeg_quality: Option<u8>,
    http_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

impl RawConfig {
    fn merge_into(self, cfg: &mut AppConfig) {
        if let Some(dir) = self.cache_dir.filter(|d| !d.trim().is_empty()) {
            cfg.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = self.temp_dir.filter(|d| !d.trim().is_empty()) {
            cfg.temp_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = self.thumbs_dir.filter(|d| !d.trim().is_empty()) {
            cfg.thumbs_dir = Some(PathBuf::from(dir));
        }
        match self.thumb_size {
            Some(0) => warn!("thumb_size must be positive; keeping {}", cfg.thumb_size),
            Some(size) => cfg.thumb_size = size,
            None => {}
        }
        match self.fanart_height {
            Some(0) => warn!(
                "fanart_height must be positive; keeping {}",
                cfg.fanart_height
            ),
            Some(height) => cfg.fanart_height = height,
            None => {}
        }
        if let Some(flag) = self.use_dds_fanart {
            cfg.use_dds_fanart = flag;
        }
        if let Some(flag) = self.use_exif_rotation {
            cfg.use_exif_rotation = flag;
        }
        if let Some(mb) = self.min_free_memory_mb {
            cfg.min_free_memory_mb = mb;
        }
        match self.jpeg_quality {
            Some(q) if (1..=100).contains(&q) => cfg.jpeg_quality = q,
            Some(q) => warn!("jpeg_quality {q} out of range 1..=100; keeping {}", cfg.jpeg_quality),
            None => {}
        }
        if let Some(secs) = self.http_timeout_secs {
            cfg.http_timeout_secs = secs.max(1);
        }
        if let Some(agent) = self.user_agent.filter(|a| !a.trim().is_empty()) {
            cfg.user_agent = agent;
        }
    }
}

/// Config path: `$PICTURE_CACHE_CONFIG` when set, else `config.json` in the working dir.
pub fn config_path() -> PathBuf {
    env::var_os(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

pub fn load_config() -> AppConfig {
    load_config_from(&config_path())
}

pub fn load_config_from(cfg_path: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();

    match fs::read_to_string(cfg_path) {
        Ok(raw) => match serde_json::from_str::<RawConfig>(&raw) {
            Ok(parsed) => {
                parsed.merge_into(&mut cfg);
                info!("Loaded config from {}", cfg_path.display());
            }
            Err(err) => {
                warn!(
                    "Failed to parse {} ({}). Using defaults.",
                    cfg_path.display(),
                    err
                );
            }
        },
        Err(_) => {
            info!("No {} found; using defaults", cfg_path.display());
        }
    }

    cfg
}
