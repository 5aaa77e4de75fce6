//! Runtime settings.
//!
//! Process-wide tuning lives in the catalog's settings table and is re-read
//! every scheduler and supervisor tick, so edits from the console apply
//! without a restart.

use std::collections::HashMap;
use std::time::Duration;

/// Settings keys recognized by the core.
pub mod keys {
    pub const CONFIG_PATH: &str = "rclone_config_path";
    pub const LOG_DIR: &str = "log_dir";
    pub const LOG_RETENTION_DAYS: &str = "log_retention_days";
    pub const RC_PORT_START: &str = "rc_port_start";
    pub const RC_PORT_END: &str = "rc_port_end";
    pub const GLOBAL_MAX_JOBS: &str = "global_max_jobs";
    pub const TRANSFERS: &str = "rclone_transfers";
    pub const CHECKERS: &str = "rclone_checkers";
    pub const BUFFER_SIZE: &str = "rclone_buffer_size";
    pub const DRIVE_CHUNK_SIZE: &str = "rclone_drive_chunk_size";
    pub const BWLIMIT: &str = "rclone_bwlimit";
    pub const METRICS_INTERVAL_MS: &str = "metrics_interval_ms";
    pub const SCHEDULER_TICK_MS: &str = "scheduler_tick_ms";
}

/// Materialized view over the settings table.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeSettings {
    pub config_path: String,
    pub log_dir: String,
    pub log_retention_days: u32,
    pub rc_port_start: u16,
    pub rc_port_end: u16,
    pub global_max_jobs: usize,
    pub transfers: u32,
    pub checkers: u32,
    pub buffer_size: String,
    pub drive_chunk_size: String,
    pub bwlimit: String,
    pub metrics_interval: Duration,
    pub scheduler_tick: Duration,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_map(&HashMap::new())
    }
}

impl RuntimeSettings {
    /// Parses the settings KV map, substituting defaults for missing or
    /// malformed values.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            config_path: get_str(map, keys::CONFIG_PATH),
            log_dir: get_str(map, keys::LOG_DIR),
            log_retention_days: get_num(map, keys::LOG_RETENTION_DAYS, 0),
            rc_port_start: get_num(map, keys::RC_PORT_START, 55720),
            rc_port_end: get_num(map, keys::RC_PORT_END, 55800),
            global_max_jobs: get_num(map, keys::GLOBAL_MAX_JOBS, 0),
            transfers: get_num(map, keys::TRANSFERS, 4),
            checkers: get_num(map, keys::CHECKERS, 8),
            buffer_size: get_str_or(map, keys::BUFFER_SIZE, "64M"),
            drive_chunk_size: get_str_or(map, keys::DRIVE_CHUNK_SIZE, "64M"),
            bwlimit: get_str(map, keys::BWLIMIT),
            metrics_interval: Duration::from_millis(get_num(map, keys::METRICS_INTERVAL_MS, 2000)),
            scheduler_tick: Duration::from_millis(get_num(map, keys::SCHEDULER_TICK_MS, 2000)),
        }
    }
}

fn get_str(map: &HashMap<String, String>, key: &str) -> String {
    map.get(key).map(|s| s.trim().to_string()).unwrap_or_default()
}

fn get_str_or(map: &HashMap<String, String>, key: &str, default: &str) -> String {
    let v = get_str(map, key);
    if v.is_empty() {
        default.to_string()
    } else {
        v
    }
}

fn get_num<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = RuntimeSettings::default();
        assert_eq!(s.rc_port_start, 55720);
        assert_eq!(s.rc_port_end, 55800);
        assert_eq!(s.global_max_jobs, 0);
        assert_eq!(s.transfers, 4);
        assert_eq!(s.checkers, 8);
        assert_eq!(s.buffer_size, "64M");
        assert_eq!(s.drive_chunk_size, "64M");
        assert_eq!(s.metrics_interval, Duration::from_millis(2000));
        assert_eq!(s.scheduler_tick, Duration::from_millis(2000));
        assert_eq!(s.log_retention_days, 0);
    }

    #[test]
    fn test_overrides() {
        let mut map = HashMap::new();
        map.insert(keys::GLOBAL_MAX_JOBS.to_string(), "7".to_string());
        map.insert(keys::METRICS_INTERVAL_MS.to_string(), "500".to_string());
        map.insert(keys::BUFFER_SIZE.to_string(), "16M".to_string());
        let s = RuntimeSettings::from_map(&map);
        assert_eq!(s.global_max_jobs, 7);
        assert_eq!(s.metrics_interval, Duration::from_millis(500));
        assert_eq!(s.buffer_size, "16M");
    }

    #[test]
    fn test_malformed_values_fall_back() {
        let mut map = HashMap::new();
        map.insert(keys::RC_PORT_START.to_string(), "garbage".to_string());
        let s = RuntimeSettings::from_map(&map);
        assert_eq!(s.rc_port_start, 55720);
    }
}
