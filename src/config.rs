//! Configuration types for bulk-archive

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for the archive service
///
/// Fields are organized into logical sub-configs:
/// - [`persistence`](PersistenceConfig) - database location
/// - [`worker`](WorkerConfig) - concurrency, rate, batching, timeouts
/// - [`retry`](RetryConfig) - attempt cap and backoff curve
/// - [`retention`](RetentionConfig) - terminal-job eviction thresholds
/// - [`cache`](CacheConfig) - dedup cache TTL
/// - [`archive`](ArchiveConfig) - archive naming, upload namespace, URL TTL
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data storage settings
    pub persistence: PersistenceConfig,

    /// Worker concurrency and rate limits
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Retry policy attached to jobs at enqueue time
    #[serde(default)]
    pub retry: RetryConfig,

    /// Retention policy for terminal jobs
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Content-hash cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Archive assembly and upload settings
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Data storage and state management
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./bulk-archive.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Worker concurrency, rate limiting, and batching configuration
///
/// Two combined limits bound the worker: `max_concurrent_jobs` caps peak
/// resource usage per process, `max_starts_per_window` over `start_window`
/// caps sustained throughput against downstream storage and bandwidth.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum jobs executing concurrently per process (default: 2)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Maximum job starts per rolling window (default: 5)
    #[serde(default = "default_max_starts_per_window")]
    pub max_starts_per_window: usize,

    /// Length of the rolling start window (default: 60 seconds)
    #[serde(default = "default_start_window", with = "duration_serde")]
    pub start_window: Duration,

    /// Files fetched concurrently per batch within one job (default: 10)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Per-file fetch timeout; the underlying transfer is aborted on expiry
    /// (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Interval between queue polls when no job is due (default: 100ms)
    #[serde(default = "default_poll_interval", with = "duration_serde_millis")]
    pub poll_interval: Duration,

    /// How long `stop()` waits for in-flight jobs to drain (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// Interval between retention/cache pruning sweeps (default: 60 seconds)
    #[serde(default = "default_prune_interval", with = "duration_serde")]
    pub prune_interval: Duration,

    /// Requeue ACTIVE jobs with no progress for this long at startup
    /// (crash recovery; default: 10 minutes)
    #[serde(default = "default_stall_threshold", with = "duration_serde")]
    pub stall_threshold: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_starts_per_window: default_max_starts_per_window(),
            start_window: default_start_window(),
            batch_size: default_batch_size(),
            fetch_timeout: default_fetch_timeout(),
            poll_interval: default_poll_interval(),
            shutdown_timeout: default_shutdown_timeout(),
            prune_interval: default_prune_interval(),
            stall_threshold: default_stall_threshold(),
        }
    }
}

/// Retry configuration for failed job attempts
///
/// Attached to each job as declarative policy data at enqueue time and
/// interpreted uniformly by the queue - never branched on in pipeline code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts before a job is terminally failed (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 5 seconds)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Maximum delay between retries (default: 5 minutes)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay: default_max_delay(),
            jitter: true,
        }
    }
}

/// Retention policy for terminal jobs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Keep at most this many completed jobs (default: 100)
    #[serde(default = "default_completed_max_entries")]
    pub completed_max_entries: u64,

    /// Delete completed jobs older than this (default: 1 hour)
    #[serde(default = "default_completed_max_age", with = "duration_serde")]
    pub completed_max_age: Duration,

    /// Delete failed jobs older than this (default: 24 hours)
    #[serde(default = "default_failed_max_age", with = "duration_serde")]
    pub failed_max_age: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            completed_max_entries: default_completed_max_entries(),
            completed_max_age: default_completed_max_age(),
            failed_max_age: default_failed_max_age(),
        }
    }
}

/// Content-hash cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache entry TTL (default: 23 hours - one hour less than the signed URL
    /// lifetime, so a cache hit never outlives its own download link)
    #[serde(default = "default_cache_ttl", with = "duration_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
        }
    }
}

/// Archive assembly and upload configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Signed download URL lifetime (default: 24 hours)
    #[serde(default = "default_signed_url_ttl", with = "duration_serde")]
    pub signed_url_ttl: Duration,

    /// Object-storage namespace for produced archives (default: "downloads")
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Archive filename used when the request does not supply one
    /// (default: "assets.zip")
    #[serde(default = "default_zip_filename")]
    pub default_zip_filename: String,

    /// Maximum asset ids accepted per submission (default: 1000)
    #[serde(default = "default_max_assets")]
    pub max_assets_per_request: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            signed_url_ttl: default_signed_url_ttl(),
            namespace: default_namespace(),
            default_zip_filename: default_zip_filename(),
            max_assets_per_request: default_max_assets(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./bulk-archive.db")
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_max_starts_per_window() -> usize {
    5
}

fn default_start_window() -> Duration {
    Duration::from_secs(60)
}

fn default_batch_size() -> usize {
    10
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_prune_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_stall_threshold() -> Duration {
    Duration::from_secs(600)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

fn default_completed_max_entries() -> u64 {
    100
}

fn default_completed_max_age() -> Duration {
    Duration::from_secs(3600)
}

fn default_failed_max_age() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(23 * 3600)
}

fn default_signed_url_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_namespace() -> String {
    "downloads".to_string()
}

fn default_zip_filename() -> String {
    "assets.zip".to_string()
}

fn default_max_assets() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

/// Serialize durations as whole seconds for readable config files
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Millisecond variant for sub-second intervals (poll cadence)
mod duration_serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
