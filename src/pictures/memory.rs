use std::fs;

use tracing::debug;

/// Reports how much physical memory is currently available.
pub trait MemoryProbe: Send + Sync {
    /// Available megabytes, or `None` when the platform does not say.
    fn available_mb(&self) -> Option<u64>;
}

/// Reads `MemAvailable` from `/proc/meminfo`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemMemory;

impl MemoryProbe for SystemMemory {
    fn available_mb(&self) -> Option<u64> {
        let text = match fs::read_to_string("/proc/meminfo") {
            Ok(text) => text,
            Err(err) => {
                debug!("no /proc/meminfo ({err}); treating free memory as unknown");
                return None;
            }
        };
        parse_mem_available_mb(&text)
    }
}

/// Always reports the same figure.
#[derive(Clone, Copy, Debug)]
pub struct FixedMemory(pub Option<u64>);

impl MemoryProbe for FixedMemory {
    fn available_mb(&self) -> Option<u64> {
        self.0
    }
}

pub fn parse_mem_available_mb(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        let mut parts = rest.split_whitespace();
        let value: u64 = parts.next()?.parse().ok()?;
        let mb = match parts.next().map(|u| u.to_ascii_lowercase()) {
            Some(unit) if unit == "kb" => value / 1024,
            Some(unit) if unit == "mb" => value,
            None => value / (1024 * 1024),
            Some(_) => return None,
        };
        Some(mb)
    })
}

/// Unknown availability counts as enough.
pub fn has_free_memory(probe: &dyn MemoryProbe, min_mb: u64) -> bool {
    probe.available_mb().map_or(true, |mb| mb >= min_mb)
}
