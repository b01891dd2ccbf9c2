use std::time::Duration;

use derive_with::With;

#[derive(Debug, Clone, With)]
pub struct LogReaderConfig {
    /// Reads slower than this are reported to the health sink.
    pub slow_read_threshold: Duration,
    pub sequential_access_read_size: usize,
    /// Forward progress after which a windowed store is told to advance the retained range.
    pub retention_advance_bytes: u64,
}

impl Default for LogReaderConfig {
    fn default() -> Self {
        LogReaderConfig {
            slow_read_threshold: Duration::from_millis(500),
            sequential_access_read_size: 64 * 1024,
            retention_advance_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, With)]
pub struct ProgressVectorConfig {
    /// 0 disables trimming.
    pub max_entries: usize,
    pub max_string_size_kb: usize,
}

impl Default for ProgressVectorConfig {
    fn default() -> Self {
        ProgressVectorConfig {
            max_entries: 0,
            max_string_size_kb: 60,
        }
    }
}

#[derive(Debug, Clone, Default, With)]
pub struct TxnLogConfig {
    pub reader: LogReaderConfig,
    pub progress_vector: ProgressVectorConfig,
}
