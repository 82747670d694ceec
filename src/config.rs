//! Store configuration
//!
//! Read from the environment, with the CLI able to override the database path.

use crate::error::{Result, StoreError};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "structure_store.db";
pub const DEFAULT_POOL_SIZE: u32 = 5;

pub const DB_PATH_VAR: &str = "STRUCTURE_STORE_DB";
pub const POOL_SIZE_VAR: &str = "STRUCTURE_STORE_POOL_SIZE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub pool_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl Config {
    /// Load from `STRUCTURE_STORE_DB` and `STRUCTURE_STORE_POOL_SIZE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], with the variable source injected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(DB_PATH_VAR).filter(|p| !p.trim().is_empty()) {
            config.db_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(POOL_SIZE_VAR) {
            let size: u32 = raw.trim().parse().map_err(|_| {
                StoreError::Config(format!("{} must be a positive integer, got '{}'", POOL_SIZE_VAR, raw))
            })?;
            if size == 0 {
                return Err(StoreError::Config(format!("{} must be at least 1", POOL_SIZE_VAR)));
            }
            config.pool_size = size;
        }

        Ok(config)
    }

    pub fn with_db_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.db_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.db_path, PathBuf::from("structure_store.db"));
        assert_eq!(config.pool_size, 5);
    }

    #[test]
    fn test_reads_both_variables() {
        let config = Config::from_lookup(lookup_from(&[
            (DB_PATH_VAR, "/tmp/structures.db"),
            (POOL_SIZE_VAR, "2"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/structures.db"));
        assert_eq!(config.pool_size, 2);
    }

    #[test]
    fn test_blank_path_keeps_default() {
        let config = Config::from_lookup(lookup_from(&[(DB_PATH_VAR, "  ")])).unwrap();
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
    }

    #[test]
    fn test_rejects_bad_pool_size() {
        let err = Config::from_lookup(lookup_from(&[(POOL_SIZE_VAR, "lots")])).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));

        let err = Config::from_lookup(lookup_from(&[(POOL_SIZE_VAR, "0")])).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_db_path_override() {
        let config = Config::default().with_db_path("other.db");
        assert_eq!(config.db_path, PathBuf::from("other.db"));
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
    }
}
