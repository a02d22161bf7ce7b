use std::path::PathBuf;

/// Runtime settings, read from `TIMETABLE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub wal_file: String,
    pub metrics_port: Option<u16>,
    /// WAL appends between compactions. 0 disables compaction.
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_file: "timetable.wal".into(),
            metrics_port: None,
            compact_threshold: 1000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("TIMETABLE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            wal_file: lookup("TIMETABLE_WAL_FILE")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.wal_file),
            metrics_port: lookup("TIMETABLE_METRICS_PORT").and_then(|s| s.parse().ok()),
            compact_threshold: lookup("TIMETABLE_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.wal_path(), PathBuf::from("./data/timetable.wal"));
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("TIMETABLE_DATA_DIR", "/var/lib/timetable"),
            ("TIMETABLE_WAL_FILE", "school.wal"),
            ("TIMETABLE_METRICS_PORT", "9100"),
            ("TIMETABLE_COMPACT_THRESHOLD", "50"),
        ]));
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/timetable/school.wal"));
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.compact_threshold, 50);
    }

    #[test]
    fn garbage_falls_back() {
        let config = Config::from_lookup(lookup(&[
            ("TIMETABLE_METRICS_PORT", "http"),
            ("TIMETABLE_COMPACT_THRESHOLD", "-1"),
        ]));
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.compact_threshold, 1000);
    }
}
