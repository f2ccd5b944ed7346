//! This module contains various utility modules and helper functions.

pub mod graph_utils;
pub mod log;
pub mod symbol_utils;

use crate::prelude::*;
use anyhow::Context;

/// The default configuration bundled into the library.
const DEFAULT_CONFIG: &str = include_str!("../../config.json");

/// Get the contents of the configuration file at the given path.
/// If no path is given, the bundled default configuration is returned.
pub fn read_config_file(filename: Option<&str>) -> Result<serde_json::Value, Error> {
    let config_file = match filename {
        Some(path) => {
            std::fs::read_to_string(path).context("Could not read configuration file")?
        }
        None => DEFAULT_CONFIG.to_string(),
    };
    Ok(serde_json::from_str(&config_file)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_json() {
        let config = read_config_file(None).unwrap();
        assert!(config.get("CWE252").is_some());
        assert!(config.get("CWE476").is_some());
        assert!(config.get("CWE772").is_some());
        assert!(config.get("error_contracts").is_some());
    }
}
