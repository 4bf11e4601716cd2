// src/pictures/uri.rs
use std::path::{Path, PathBuf};

/// Protocols that always denote a remote stream.
const STREAM_PROTOCOLS: &[&str] = &[
    "http", "https", "tcp", "udp", "rtp", "sdp", "mms", "mmst", "mmsh", "rtsp", "rtmp",
];

/// Extra protocols counted as remote only under a strict check.
const STRICT_PROTOCOLS: &[&str] = &["ftp", "ftps", "dav", "davs", "rss"];

pub const SPECIAL_TEMP: &str = "special://temp/";
pub const SPECIAL_THUMBS: &str = "special://thumbs/";

/// Lower-cased protocol of a `scheme://...` url, if any.
pub fn protocol(url: &str) -> Option<String> {
    let (scheme, _) = url.split_once("://")?;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

pub fn is_url(path: &str) -> bool {
    protocol(path).is_some()
}

pub fn is_internet_stream(url: &str, strict: bool) -> bool {
    let Some(proto) = protocol(url) else {
        return false;
    };
    STREAM_PROTOCOLS.contains(&proto.as_str())
        || (strict && STRICT_PROTOCOLS.contains(&proto.as_str()))
}

/// Strip `?query` and `#fragment` from urls; plain paths are left alone.
fn without_options(path: &str) -> &str {
    if !is_url(path) {
        return path;
    }
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

fn file_name_start(path: &str) -> usize {
    path.rfind(['/', '\\']).map_or(0, |i| i + 1)
}

/// Extension of the last path segment including the dot, lower-cased.
/// Empty when the segment has none.
pub fn get_extension(path: &str) -> String {
    let path = without_options(path);
    let name = &path[file_name_start(path)..];
    match name.rfind('.') {
        Some(dot) => name[dot..].to_ascii_lowercase(),
        None => String::new(),
    }
}

/// `extension` carries its leading dot, e.g. `".dds"`.
pub fn replace_extension(path: &str, extension: &str) -> String {
    let base = without_options(path);
    let options = &path[base.len()..];
    let start = file_name_start(base);
    let stem_end = base[start..].rfind('.').map_or(base.len(), |dot| start + dot);
    format!("{}{}{}", &base[..stem_end], extension, options)
}

pub fn has_extension(path: &str, extensions: &[&str]) -> bool {
    let ext = get_extension(path);
    extensions.iter().any(|e| ext == *e)
}

/// Map `special://temp/` and `special://thumbs/` onto their backing directories.
pub fn translate_special(path: &str, temp_dir: &Path, thumbs_dir: &Path) -> PathBuf {
    if let Some(rest) = strip_prefix_ignore_case(path, SPECIAL_TEMP) {
        return temp_dir.join(rest);
    }
    if let Some(rest) = strip_prefix_ignore_case(path, SPECIAL_THUMBS) {
        return thumbs_dir.join(rest);
    }
    PathBuf::from(path)
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}
