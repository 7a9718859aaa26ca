// src/config.rs

//! Configuration loading utilities.
//!
//! This module provides convenience functions for loading the configuration
//! file and the source list it points at.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{Config, SourceDescriptor, load_sources, validate_sources};

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file is missing or unreadable; the result is
/// always validated.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path);
    config
        .validate()
        .map_err(|e| AppError::config(format!("Invalid configuration {path:?}: {e}")))?;
    Ok(config)
}

/// Load the source list named by the configuration.
pub fn load_source_list(config: &Config) -> Result<Vec<SourceDescriptor>> {
    let path = &config.paths.sources_file;
    let sources = load_sources(path).map_err(|e| {
        AppError::config(format!("Failed to load source list {path:?}: {e}"))
    })?;
    validate_sources(&sources)?;
    log::info!("Loaded {} sources from {:?}", sources.len(), path);
    Ok(sources)
}

/// Load and validate both the configuration and the source list.
pub fn load_all(config_path: &Path) -> Result<(Config, Vec<SourceDescriptor>)> {
    let config = load_config(config_path)?;
    let sources = load_source_list(&config)?;
    Ok((config, sources))
}
