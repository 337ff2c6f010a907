use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
    #[error("{name} must be greater than 1 (got {value})")]
    FactorOutOfRange { name: &'static str, value: f64 },
    #[error("BLOCK_PAUSE_LOWER_LIMIT ({lower}ms) exceeds BLOCK_PAUSE_UPPER_LIMIT ({upper}ms)")]
    PauseBoundsInverted { lower: u64, upper: u64 },
}

/// Tuning knobs for the per-chain monitors, read once at startup from the
/// environment. Every knob has a default; secrets never live here.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Multiplicative pacing step. Must be > 1.
    pub block_pause_factor: f64,
    /// Pacing ceiling.
    pub block_pause_upper_limit: Duration,
    /// Pacing floor.
    pub block_pause_lower_limit: Duration,
    /// Per-RPC-call timeout hint.
    pub provider_timeout: Duration,
    /// Delay between bytecode-retrieval retries.
    pub get_bytecode_retry_pause: Duration,
    /// Initial polling interval.
    pub get_block_pause: Duration,
    /// Bytecode-retrieval attempts per address.
    pub initial_get_bytecode_tries: u32,
}

fn default_block_pause_factor() -> f64 {
    1.1
}
fn default_block_pause_upper_limit_ms() -> u64 {
    30_000
}
fn default_block_pause_lower_limit_ms() -> u64 {
    500
}
fn default_provider_timeout_ms() -> u64 {
    3_000
}
fn default_get_bytecode_retry_pause_ms() -> u64 {
    5_000
}
fn default_get_block_pause_ms() -> u64 {
    10_000
}
fn default_initial_get_bytecode_tries() -> u32 {
    3
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            block_pause_factor: default_block_pause_factor(),
            block_pause_upper_limit: Duration::from_millis(default_block_pause_upper_limit_ms()),
            block_pause_lower_limit: Duration::from_millis(default_block_pause_lower_limit_ms()),
            provider_timeout: Duration::from_millis(default_provider_timeout_ms()),
            get_bytecode_retry_pause: Duration::from_millis(default_get_bytecode_retry_pause_ms()),
            get_block_pause: Duration::from_millis(default_get_block_pause_ms()),
            initial_get_bytecode_tries: default_initial_get_bytecode_tries(),
        }
    }
}

impl MonitorConfig {
    /// Read tuning from the process environment, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an injectable variable
    /// source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let block_pause_factor =
            parse_or(&lookup, "BLOCK_PAUSE_FACTOR", default_block_pause_factor())?;
        if block_pause_factor <= 1.0 {
            return Err(ConfigError::FactorOutOfRange {
                name: "BLOCK_PAUSE_FACTOR",
                value: block_pause_factor,
            });
        }

        let upper_ms = parse_or(
            &lookup,
            "BLOCK_PAUSE_UPPER_LIMIT",
            default_block_pause_upper_limit_ms(),
        )?;
        let lower_ms = parse_or(
            &lookup,
            "BLOCK_PAUSE_LOWER_LIMIT",
            default_block_pause_lower_limit_ms(),
        )?;
        if lower_ms > upper_ms {
            return Err(ConfigError::PauseBoundsInverted {
                lower: lower_ms,
                upper: upper_ms,
            });
        }

        let initial_get_bytecode_tries: u32 = parse_or(
            &lookup,
            "INITIAL_GET_BYTECODE_TRIES",
            default_initial_get_bytecode_tries(),
        )?;

        Ok(Self {
            block_pause_factor,
            block_pause_upper_limit: Duration::from_millis(upper_ms),
            block_pause_lower_limit: Duration::from_millis(lower_ms),
            provider_timeout: Duration::from_millis(parse_or(
                &lookup,
                "PROVIDER_TIMEOUT",
                default_provider_timeout_ms(),
            )?),
            get_bytecode_retry_pause: Duration::from_millis(parse_or(
                &lookup,
                "GET_BYTECODE_RETRY_PAUSE",
                default_get_bytecode_retry_pause_ms(),
            )?),
            get_block_pause: Duration::from_millis(parse_or(
                &lookup,
                "GET_BLOCK_PAUSE",
                default_get_block_pause_ms(),
            )?),
            initial_get_bytecode_tries: initial_get_bytecode_tries.max(1),
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}

/// Explicit start block for a chain, from `MONITOR_START_<chainId>`.
/// Unset or unparsable means "probe the head at startup".
pub fn start_block_override(chain_id: u64) -> Option<u64> {
    start_block_override_from(chain_id, |name| std::env::var(name).ok())
}

pub fn start_block_override_from<F>(chain_id: u64, lookup: F) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(&format!("MONITOR_START_{chain_id}"))?;
    match raw.trim().parse() {
        Ok(block) => Some(block),
        Err(_) => {
            tracing::warn!(
                chain_id = chain_id,
                value = %raw,
                "ignoring unparsable MONITOR_START override"
            );
            None
        }
    }
}
