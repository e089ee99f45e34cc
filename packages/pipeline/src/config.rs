//! Loading and validating [`PipelineConfig`].
//!
//! Sources are layered lowest to highest: built-in defaults, an optional
//! TOML file, then `PRE_EVENT_*` environment variables. [`load`] validates
//! the result. Binaries with flags of their own call [`load_unvalidated`],
//! apply the flags, and only then call [`validate`], so a flag can repair a
//! value the lower layers got wrong.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use pre_event_inventory_models::PipelineConfig;

pub const ENV_SNAP_TOLERANCE: &str = "PRE_EVENT_SNAP_TOLERANCE_M";
pub const ENV_PARALLEL_MERGE_TOLERANCE: &str = "PRE_EVENT_PARALLEL_MERGE_TOLERANCE_M";
pub const ENV_SIMPLIFY_TOLERANCE: &str = "PRE_EVENT_SIMPLIFY_TOLERANCE_M";
pub const ENV_MIN_ACCEPTABLE_IOU: &str = "PRE_EVENT_MIN_ACCEPTABLE_IOU";
pub const ENV_BATCH_SIZE: &str = "PRE_EVENT_BATCH_SIZE";
pub const ENV_NUM_THREADS: &str = "PRE_EVENT_NUM_THREADS";
pub const ENV_ENABLE_REGULARIZATION: &str = "PRE_EVENT_ENABLE_REGULARIZATION";
pub const ENV_ENABLE_DEDUPLICATION: &str = "PRE_EVENT_ENABLE_DEDUPLICATION";
pub const ENV_ALLOW_45_DEGREE: &str = "PRE_EVENT_ALLOW_45_DEGREE";

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`PipelineConfig`].
    #[error("Invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment variable could not be parsed.
    #[error("Invalid value {value:?} for {var}: {message}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        message: String,
    },

    /// A field holds a value outside its allowed range.
    #[error("Invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Parses a TOML document. Missing fields take their defaults.
///
/// # Errors
///
/// * If the document is not valid TOML or a field has the wrong type
pub fn from_toml_str(toml_str: &str) -> Result<PipelineConfig, ConfigError> {
    Ok(toml::from_str(toml_str)?)
}

/// Reads and parses a TOML config file.
///
/// # Errors
///
/// * If the file cannot be read
/// * If its contents are not a valid config
pub fn from_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    from_toml_str(&contents)
}

/// Defaults, then `path` if given, then the process environment, then
/// [`validate`].
///
/// # Errors
///
/// * If the file cannot be read or parsed
/// * If an environment variable is malformed
/// * If the resulting config fails [`validate`]
pub fn load(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let config = load_unvalidated(path)?;
    validate(&config)?;
    Ok(config)
}

/// [`load`] without the final [`validate`].
///
/// # Errors
///
/// * If the file cannot be read or parsed
/// * If an environment variable is malformed
pub fn load_unvalidated(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    load_layers(path, |name| std::env::var(name).ok())
}

/// Defaults, then `path` if given, then variables resolved through
/// `lookup`. Ranges are not checked.
///
/// # Errors
///
/// * If the file cannot be read or parsed
/// * If a variable `lookup` returns cannot be parsed
pub fn load_layers(
    path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<PipelineConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            log::debug!("Loading config from {}", path.display());
            from_file(path)?
        }
        None => PipelineConfig::default(),
    };
    apply_overrides(&mut config, lookup)?;
    Ok(config)
}

/// Overrides fields from variables resolved through `lookup`.
///
/// # Errors
///
/// * If a variable `lookup` returns cannot be parsed
pub fn apply_overrides(
    config: &mut PipelineConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let reg = &mut config.regularization;
    if let Some(v) = parse_var(&lookup, ENV_SNAP_TOLERANCE)? {
        reg.snap_tolerance_m = v;
    }
    if let Some(v) = parse_var(&lookup, ENV_PARALLEL_MERGE_TOLERANCE)? {
        reg.parallel_merge_tolerance_m = v;
    }
    if let Some(v) = parse_var(&lookup, ENV_SIMPLIFY_TOLERANCE)? {
        reg.simplify_tolerance_m = v;
    }
    if let Some(v) = parse_var(&lookup, ENV_MIN_ACCEPTABLE_IOU)? {
        reg.min_acceptable_iou = v;
    }
    if let Some(v) = parse_bool_var(&lookup, ENV_ALLOW_45_DEGREE)? {
        reg.allow_45_degree = v;
    }
    if let Some(v) = parse_var(&lookup, ENV_BATCH_SIZE)? {
        config.batch_size = v;
    }
    if let Some(v) = parse_var(&lookup, ENV_NUM_THREADS)? {
        config.num_threads = v;
    }
    if let Some(v) = parse_bool_var(&lookup, ENV_ENABLE_REGULARIZATION)? {
        config.enable_regularization = v;
    }
    if let Some(v) = parse_bool_var(&lookup, ENV_ENABLE_DEDUPLICATION)? {
        config.enable_deduplication = v;
    }
    Ok(())
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidEnv {
            var,
            message: e.to_string(),
            value,
        })
}

fn parse_bool_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<bool>, ConfigError> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidEnv {
            var,
            value,
            message: "expected true/false".to_string(),
        }),
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            message: format!("{value} must be a finite, non-negative distance"),
        })
    }
}

/// Checks every field is in range.
///
/// # Errors
///
/// * [`ConfigError::Invalid`] naming the first offending field
pub fn validate(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.batch_size == 0 {
        return Err(ConfigError::Invalid {
            field: "batch_size",
            message: "must be at least 1".to_string(),
        });
    }

    let reg = &config.regularization;
    non_negative("snap_tolerance_m", reg.snap_tolerance_m)?;
    non_negative("parallel_merge_tolerance_m", reg.parallel_merge_tolerance_m)?;
    non_negative("simplify_tolerance_m", reg.simplify_tolerance_m)?;

    if !(reg.min_acceptable_iou > 0.0 && reg.min_acceptable_iou <= 1.0) {
        return Err(ConfigError::Invalid {
            field: "min_acceptable_iou",
            message: format!("{} is outside (0, 1]", reg.min_acceptable_iou),
        });
    }

    if !(0.0..45.0).contains(&reg.diagonal_threshold_reduction_deg) {
        return Err(ConfigError::Invalid {
            field: "diagonal_threshold_reduction_deg",
            message: format!("{} is outside [0, 45)", reg.diagonal_threshold_reduction_deg),
        });
    }

    Ok(())
}
