use std::env;
use std::path::PathBuf;

/// Application configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    /// Extra wait granted to a killed child before giving up on reaping it
    pub process_grace_ms: u64,
    /// Hard ceiling on setup + check + teardown
    pub max_evaluation_ms: u64,
    /// Per-stream capture limit for child output
    pub max_output_bytes: usize,
    /// Parent of every per-evaluation working directory
    pub work_root: PathBuf,
    pub result_ttl_secs: u64,
    pub max_parallel_evaluations: usize,
    pub toolchain: Toolchain,
}

/// Compiler and interpreter programs invoked by the evaluators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub javac: String,
    pub java: String,
    pub gcc: String,
    pub gxx: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            javac: "javac".to_string(),
            java: "java".to_string(),
            gcc: "gcc".to_string(),
            gxx: "g++".to_string(),
        }
    }
}

impl Toolchain {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            javac: env::var("JAVAC_BIN").unwrap_or(defaults.javac),
            java: env::var("JAVA_BIN").unwrap_or(defaults.java),
            gcc: env::var("GCC_BIN").unwrap_or(defaults.gcc),
            gxx: env::var("GXX_BIN").unwrap_or(defaults.gxx),
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            default_timeout_ms: parsed("DEFAULT_TIMEOUT_MS", 5000),
            max_timeout_ms: parsed("MAX_TIMEOUT_MS", 30000),
            process_grace_ms: parsed("PROCESS_GRACE_MS", 2000),
            max_evaluation_ms: parsed("MAX_EVALUATION_MS", 120_000),
            max_output_bytes: parsed("MAX_OUTPUT_BYTES", 64 * 1024),
            work_root: env::var("WORK_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir().join("codegrade")),
            result_ttl_secs: parsed("RESULT_TTL_SECS", 3600),
            max_parallel_evaluations: parsed("MAX_PARALLEL_EVALUATIONS", 4),
            toolchain: Toolchain::from_env(),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }

    /// Clamp a requested per-process timeout into `1..=max_timeout_ms`
    pub fn clamp_timeout_ms(&self, requested_ms: u64) -> u64 {
        let requested = if requested_ms == 0 {
            self.default_timeout_ms
        } else {
            requested_ms
        };
        requested.min(self.max_timeout_ms).max(1)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
