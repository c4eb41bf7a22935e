use std::str::FromStr;

use crate::error::{GemmError, Result};
use crate::tier::Tier;

/// Tunable dispatch policy.
///
/// The column thresholds are performance heuristics, not correctness
/// requirements: any value yields correct results, only the chosen path differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Widest tier the dispatcher may select. `None` means the best available.
    pub max_tier: Option<Tier>,
    /// Whether the portable engines may be used when no vector tier applies.
    pub portable: bool,
    /// Largest `n` for which half/brain-float A against f32 B is multiplied
    /// directly; wider requests ask for B to be converted first.
    pub promote_max_cols: usize,
    /// Smallest `n` for which half×half (or bf16×bf16) is worth running here.
    pub half_min_cols: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_tier: None,
            portable: true,
            promote_max_cols: 1,
            half_min_cols: 2,
        }
    }
}

impl DispatchConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Recognised variables:
    /// - `TINYBLAS_MAX_TIER` -> max_tier (`portable`, `neon`, `avx2`, `avx512`)
    /// - `TINYBLAS_PORTABLE` -> portable (`0`/`1`/`true`/`false`)
    /// - `TINYBLAS_PROMOTE_MAX_COLS` -> promote_max_cols
    /// - `TINYBLAS_HALF_MIN_COLS` -> half_min_cols
    pub fn from_env() -> Result<DispatchConfig> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup; unset keys keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<DispatchConfig> {
        let mut config = DispatchConfig::default();

        if let Some(v) = lookup("TINYBLAS_MAX_TIER") {
            config.max_tier = Some(Tier::from_str(&v).map_err(|_| GemmError::Config {
                key: "TINYBLAS_MAX_TIER",
                value: v.clone(),
            })?);
        }
        if let Some(v) = lookup("TINYBLAS_PORTABLE") {
            config.portable = parse_bool("TINYBLAS_PORTABLE", &v)?;
        }
        if let Some(v) = lookup("TINYBLAS_PROMOTE_MAX_COLS") {
            config.promote_max_cols = parse_usize("TINYBLAS_PROMOTE_MAX_COLS", &v)?;
        }
        if let Some(v) = lookup("TINYBLAS_HALF_MIN_COLS") {
            config.half_min_cols = parse_usize("TINYBLAS_HALF_MIN_COLS", &v)?;
        }

        Ok(config)
    }
}

fn parse_bool(key: &'static str, v: &str) -> Result<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(GemmError::Config {
            key,
            value: v.to_string(),
        }),
    }
}

fn parse_usize(key: &'static str, v: &str) -> Result<usize> {
    v.trim().parse().map_err(|_| GemmError::Config {
        key,
        value: v.to_string(),
    })
}
