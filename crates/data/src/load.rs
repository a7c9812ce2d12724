use anyhow::Context;
use plib_core::{LibraryConfig, ResolvedConfig};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "config.json";
pub const LIBRARY_FILE: &str = "library.json";
pub const STATUS_FILE: &str = "status.json";

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(value)
}

pub fn load_library_config(dir: &Path) -> anyhow::Result<LibraryConfig> {
    load_json(dir.join(CONFIG_FILE))
}

/// Loads and resolves `config.json`, so every picker and expression is
/// checked before anything is drawn.
pub fn load_resolved_config(dir: &Path) -> anyhow::Result<ResolvedConfig> {
    let config = load_library_config(dir)?;
    let resolved = config
        .resolve()
        .with_context(|| format!("resolve {}", dir.join(CONFIG_FILE).display()))?;
    Ok(resolved)
}
