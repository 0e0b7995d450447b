//! System Metadata Collection
//!
//! Collects the environment a run happened in, so reports from different
//! machines or commits are never compared by accident.
//!
//! Linux-specific data (CPU model, memory) degrades to "Unknown" or 0 on
//! other platforms.

use chrono::Utc;
use versus_core::PipelineConfig;
use versus_report::{ReportMeta, SCHEMA_VERSION, SystemInfo};

/// Build report metadata including system info, git details and the config in effect
pub fn build_report_meta(config: &PipelineConfig) -> ReportMeta {
    ReportMeta {
        schema_version: SCHEMA_VERSION,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        git_commit: git(&["rev-parse", "HEAD"]),
        git_branch: git(&["rev-parse", "--abbrev-ref", "HEAD"]),
        system: SystemInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu: cpu_model().unwrap_or_else(|| "Unknown".to_string()),
            cpu_cores: cpu_cores(),
            memory_gb: memory_gb().unwrap_or_default(),
        },
        config: config.clone(),
    }
}

fn git(args: &[&str]) -> Option<String> {
    std::process::Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First value of a `key: value` line in a /proc file (Linux only)
#[cfg(target_os = "linux")]
fn proc_field(path: &str, key: &str) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    text.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        (name.trim() == key).then(|| value.trim().to_string())
    })
}

#[cfg(not(target_os = "linux"))]
fn proc_field(_path: &str, _key: &str) -> Option<String> {
    None
}

fn cpu_model() -> Option<String> {
    proc_field("/proc/cpuinfo", "model name")
}

fn cpu_cores() -> u32 {
    std::thread::available_parallelism().map_or(1, |n| n.get() as u32)
}

/// `MemTotal` is reported in KiB
fn memory_gb() -> Option<f64> {
    let total = proc_field("/proc/meminfo", "MemTotal")?;
    let kib: u64 = total.split_whitespace().next()?.parse().ok()?;
    Some(kib as f64 / (1024.0 * 1024.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_carries_config_and_schema() {
        let mut config = PipelineConfig::default();
        config.statistics.significance_alpha = 0.01;
        let meta = build_report_meta(&config);
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert_eq!(meta.config.statistics.significance_alpha, 0.01);
        assert!(meta.system.cpu_cores >= 1);
        assert!(!meta.system.os.is_empty());
    }
}
