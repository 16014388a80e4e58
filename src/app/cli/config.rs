//! TOML configuration file loading
//!
//! A config file is a partial `NodeConfig` with camelCase keys, overlaid on
//! the defaults before CLI flags are applied. A file the user named must
//! exist and parse; a missing default is simply skipped.

use crate::core::config::ConfigPatch;
use std::path::PathBuf;

/// Load and parse a config file into a patch.
///
/// An explicitly given path that is missing or malformed is a hard error:
/// the process exits rather than running with half a configuration.
pub async fn load_config_file(config_file: Option<PathBuf>) -> Option<ConfigPatch> {
    let path = match config_file {
        Some(path) => {
            if !path.exists() {
                eprintln!(
                    "Error: The specified configuration file does not exist: {}",
                    path.display()
                );
                std::process::exit(1);
            }
            path
        }
        None => return None,
    };

    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => match toml::from_str::<ConfigPatch>(&contents) {
            Ok(patch) => Some(patch),
            Err(e) => {
                eprintln!("Error parsing configuration file {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error reading configuration file {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
