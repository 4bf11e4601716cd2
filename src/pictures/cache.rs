use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use reqwest::blocking::Client;
use tracing::{debug, warn};

use super::crc;
use super::error::PictureError;
use super::uri;
use crate::config::AppConfig;

/// Temp downloads older than this are leftovers of an interrupted run.
pub const TEMP_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// On-disk layout: cache root, `special://temp` and `special://thumbs`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheDirs {
    root: PathBuf,
    temp: PathBuf,
    thumbs: PathBuf,
}

impl CacheDirs {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            root: cfg.cache_dir.clone(),
            temp: cfg.temp_dir(),
            thumbs: cfg.thumbs_dir(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp
    }

    pub fn thumbs_dir(&self) -> &Path {
        &self.thumbs
    }

    /// Create every directory; a directory that cannot be created falls back to the root.
    pub fn ensure(&mut self) {
        if let Err(e) = fs::create_dir_all(&self.root) {
            warn!("failed to create cache dir {}: {e}", self.root.display());
        }
        for dir in [&mut self.temp, &mut self.thumbs] {
            if let Err(e) = fs::create_dir_all(&*dir) {
                warn!("failed to create cache dir {}: {e}", dir.display());
                *dir = self.root.clone();
            }
        }
    }

    /// Local path for `special://` names; other paths pass through.
    pub fn resolve(&self, path: &str) -> PathBuf {
        uri::translate_special(path, &self.temp, &self.thumbs)
    }

    /// `<temp>/<crc32 of the lower-cased url><ext>`
    pub fn temp_path_for_url(&self, url: &str) -> PathBuf {
        let crc = crc::compute_from_lower_case(url);
        self.temp
            .join(format!("{}{}", crc::hex(crc), uri::get_extension(url)))
    }

    /// `<thumbs>/<first hex digit>/<crc32 of the lower-cased path>.tbn`
    pub fn cached_picture_thumb(&self, path: &str) -> PathBuf {
        let hex = crc::hex(crc::compute_from_lower_case(path));
        self.thumbs.join(&hex[..1]).join(format!("{hex}.tbn"))
    }
}

pub fn http_client(cfg: &AppConfig) -> Result<Client, PictureError> {
    Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .user_agent(cfg.user_agent.clone())
        .build()
        .map_err(|e| PictureError::Download {
            url: String::new(),
            reason: format!("http client: {e}"),
        })
}

fn write_through_part(dest: &Path, bytes: &[u8]) -> Result<(), PictureError> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
    }
    fs::rename(&tmp, dest)?;
    Ok(())
}

/// Fetch `url` into `dest`. Only http(s) can be fetched.
pub fn download(client: &Client, url: &str, dest: &Path) -> Result<(), PictureError> {
    match uri::protocol(url).as_deref() {
        Some("http") | Some("https") => {}
        _ => return Err(PictureError::UnsupportedProtocol(url.to_string())),
    }

    let bytes = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(|e| PictureError::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    if bytes.is_empty() {
        return Err(PictureError::Download {
            url: url.to_string(),
            reason: "empty body".into(),
        });
    }

    write_through_part(dest, &bytes)?;
    debug!("downloaded {} bytes from {url} to {}", bytes.len(), dest.display());
    Ok(())
}

/// Copy a local file into the cache unchanged.
pub fn copy_local(src: &Path, dest: &Path) -> Result<(), PictureError> {
    let bytes = fs::read(src)?;
    write_through_part(dest, &bytes)
}

/// Remove `.part` leftovers and temp downloads older than `max_age`.
pub fn clean_temp_dir(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0usize;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let metadata = entry.metadata()?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let partial = path.extension().and_then(|e| e.to_str()) == Some("part");

        if partial || metadata.len() == 0 || modified < cutoff {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}
