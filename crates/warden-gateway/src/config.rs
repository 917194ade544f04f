use anyhow::{Context, Result};
use std::path::PathBuf;

use warden_types::config::WardenConfig;

/// Returns the Warden home directory (~/.warden/)
pub fn warden_home() -> PathBuf {
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".warden")
}

/// Returns the path to the config file (~/.warden/config.toml)
pub fn config_path() -> PathBuf {
    warden_home().join("config.toml")
}

/// Returns the conversation database path (~/.warden/warden.db)
pub fn db_path() -> PathBuf {
    warden_home().join("warden.db")
}

/// Returns the run history path (~/.warden/agent-runs.json)
pub fn runs_path() -> PathBuf {
    warden_home().join("agent-runs.json")
}

/// Load config from disk, creating the default if it doesn't exist.
pub fn load_config() -> Result<WardenConfig> {
    let path = config_path();

    if !path.exists() {
        let home = warden_home();
        std::fs::create_dir_all(&home)
            .with_context(|| format!("Failed to create {}", home.display()))?;

        let default = WardenConfig::default();
        let toml_str = toml::to_string_pretty(&default)
            .context("Failed to serialize default config")?;
        std::fs::write(&path, &toml_str)
            .with_context(|| format!("Failed to write default config to {}", path.display()))?;

        return Ok(default);
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config: WardenConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config at {}", path.display()))?;
    Ok(config)
}

/// Save config to disk, overwriting the existing file.
pub fn save_config(config: &WardenConfig) -> Result<()> {
    let path = config_path();
    let toml_str = toml::to_string_pretty(config)
        .context("Failed to serialize config")?;
    std::fs::write(&path, toml_str)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warden_home_is_under_dotdir() {
        let home = warden_home();
        assert!(home.to_string_lossy().contains(".warden"));
    }

    #[test]
    fn default_config_roundtrips() {
        let config = WardenConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: WardenConfig = toml::from_str(&toml_str).unwrap();
        assert!(parsed.chat.enforce_allowlist);
        assert_eq!(parsed.runner.max_runs, 200);
    }
}
