//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::{DEFAULT_CATALOGUE_PATH, DEFAULT_POOL_SIZE};
use crate::{MatchError, MatchResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which record receives the substances found by the enrichment fallback lookup.
///
/// When none of a record's codes appear in the batched detail mapping, enrichment resolves the
/// record's raw codes directly. Existing deployments attribute everything found that way to the
/// first record of the batch, whichever record actually carried the code.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallbackAttribution {
    /// Attribute every fallback substance to the first record of the batch.
    #[default]
    FirstRecord,
    /// Attribute each fallback substance to the record(s) whose own codes resolved to it.
    PerRecord,
}

impl FromStr for FallbackAttribution {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-record" => Ok(Self::FirstRecord),
            "per-record" => Ok(Self::PerRecord),
            other => Err(MatchError::InvalidInput(format!(
                "unknown fallback attribution '{other}' (expected 'first-record' or 'per-record')"
            ))),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct MatchConfig {
    catalogue_path: PathBuf,
    pool_size: usize,
    fallback_attribution: FallbackAttribution,
}

impl MatchConfig {
    /// Create a new `MatchConfig`.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::InvalidInput` if `pool_size` is zero.
    pub fn new(
        catalogue_path: PathBuf,
        pool_size: usize,
        fallback_attribution: FallbackAttribution,
    ) -> MatchResult<Self> {
        if pool_size == 0 {
            return Err(MatchError::InvalidInput(
                "repository pool size must be at least 1".into(),
            ));
        }

        Ok(Self {
            catalogue_path,
            pool_size,
            fallback_attribution,
        })
    }

    pub fn catalogue_path(&self) -> &Path {
        &self.catalogue_path
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn fallback_attribution(&self) -> FallbackAttribution {
        self.fallback_attribution
    }
}

/// Resolve the catalogue file without reading environment variables.
///
/// If `override_path` is provided, it must be an existing file. Otherwise this searches for
/// `data/catalogue.yaml` relative to the current working directory and then walks up from
/// `CARGO_MANIFEST_DIR`.
pub fn resolve_catalogue_path(override_path: Option<PathBuf>) -> MatchResult<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Ok(path);
        }
        return Err(MatchError::InvalidInput(format!(
            "RXMATCH_CATALOGUE_PATH override is not a file: {}",
            path.display()
        )));
    }

    let cwd_relative = PathBuf::from(DEFAULT_CATALOGUE_PATH);
    if cwd_relative.is_file() {
        return Ok(cwd_relative);
    }

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    for ancestor in manifest_dir.ancestors() {
        let candidate = ancestor.join(DEFAULT_CATALOGUE_PATH);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(MatchError::InvalidInput(format!(
        "could not locate {DEFAULT_CATALOGUE_PATH}"
    )))
}

/// Parse the repository pool size from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default pool size.
pub fn pool_size_from_env_value(value: Option<String>) -> MatchResult<usize> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match value {
        None => Ok(DEFAULT_POOL_SIZE),
        Some(v) => match v.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(MatchError::InvalidInput(format!(
                "RXMATCH_POOL_SIZE must be a positive integer, got '{v}'"
            ))),
        },
    }
}

/// Parse the fallback attribution mode from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`FallbackAttribution::FirstRecord`].
pub fn fallback_attribution_from_env_value(
    value: Option<String>,
) -> MatchResult<FallbackAttribution> {
    let value = value
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty());
    let parsed = value.map(|v| v.parse::<FallbackAttribution>()).transpose()?;

    Ok(parsed.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_rejects_zero_pool_size() {
        let err = MatchConfig::new(PathBuf::from("x.yaml"), 0, FallbackAttribution::default())
            .expect_err("zero pool size should be rejected");
        assert!(matches!(err, MatchError::InvalidInput(_)));
    }

    #[test]
    fn test_pool_size_defaults_and_parses() {
        assert_eq!(pool_size_from_env_value(None).unwrap(), DEFAULT_POOL_SIZE);
        assert_eq!(
            pool_size_from_env_value(Some("  ".into())).unwrap(),
            DEFAULT_POOL_SIZE
        );
        assert_eq!(pool_size_from_env_value(Some("4".into())).unwrap(), 4);
        assert!(pool_size_from_env_value(Some("0".into())).is_err());
        assert!(pool_size_from_env_value(Some("many".into())).is_err());
    }

    #[test]
    fn test_fallback_attribution_parsing() {
        assert_eq!(
            fallback_attribution_from_env_value(None).unwrap(),
            FallbackAttribution::FirstRecord
        );
        assert_eq!(
            fallback_attribution_from_env_value(Some("Per-Record".into())).unwrap(),
            FallbackAttribution::PerRecord
        );
        let err = fallback_attribution_from_env_value(Some("nearest".into()))
            .expect_err("unknown mode should be rejected");
        assert!(matches!(err, MatchError::InvalidInput(_)));
    }

    #[test]
    fn test_resolve_catalogue_path_accepts_existing_override() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("catalogue.yaml");
        std::fs::write(&path, "drugs: []\n").expect("should write catalogue");

        let resolved = resolve_catalogue_path(Some(path.clone())).expect("override should resolve");
        assert_eq!(resolved, path);
    }

    #[test]
    fn test_resolve_catalogue_path_rejects_missing_override() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let err = resolve_catalogue_path(Some(temp_dir.path().join("missing.yaml")))
            .expect_err("missing override should be rejected");
        assert!(matches!(err, MatchError::InvalidInput(_)));

        // A directory is not a catalogue either.
        assert!(resolve_catalogue_path(Some(temp_dir.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_resolve_catalogue_path_finds_bundled_catalogue() {
        let resolved = resolve_catalogue_path(None).expect("bundled catalogue should be found");
        assert!(resolved.ends_with(DEFAULT_CATALOGUE_PATH));
    }
}
