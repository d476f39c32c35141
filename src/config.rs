use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_MAX_RESERVATIONS_PER_WEEK: u32 = 3;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;

/// Knobs consumed by the admission gateway. Passed explicitly; never global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    max_reservations_per_week: NonZeroU32,
    /// Bounded wait for an admission scope.
    pub lock_timeout: Duration,
}

impl AdmissionConfig {
    pub fn new(max_reservations_per_week: NonZeroU32, lock_timeout: Duration) -> Self {
        Self {
            max_reservations_per_week,
            lock_timeout,
        }
    }

    pub fn max_reservations_per_week(&self) -> u32 {
        self.max_reservations_per_week.get()
    }

    pub fn with_max_reservations_per_week(mut self, limit: NonZeroU32) -> Self {
        self.max_reservations_per_week = limit;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_reservations_per_week: NonZeroU32::new(DEFAULT_MAX_RESERVATIONS_PER_WEEK)
                .unwrap_or(NonZeroU32::MIN),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Process configuration, read from `SPACEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// WAL appends after which `WalStore::maybe_compact` rewrites the log.
    pub compact_threshold: u64,
    pub admission: AdmissionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            admission: AdmissionConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; absent or unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let data_dir = lookup("SPACEBOOK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let compact_threshold = parse_or(&lookup, "SPACEBOOK_COMPACT_THRESHOLD", defaults.compact_threshold);
        let max_per_week = parse_or(
            &lookup,
            "SPACEBOOK_MAX_RESERVATIONS_PER_WEEK",
            defaults.admission.max_reservations_per_week,
        );
        let lock_timeout_ms = parse_or(
            &lookup,
            "SPACEBOOK_LOCK_TIMEOUT_MS",
            defaults.admission.lock_timeout.as_millis() as u64,
        );

        Self {
            data_dir,
            compact_threshold,
            admission: AdmissionConfig::new(max_per_week, Duration::from_millis(lock_timeout_ms)),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("spacebook.wal")
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!("ignoring invalid {key}={raw:?}, using default");
                default
            }
        },
    }
}
