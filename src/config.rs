use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

fn default_base_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            base_url: default_base_url(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 800,
            height: 900,
            min_width: 480,
            min_height: 480,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("Error parsing {}: {}. Using defaults.", config_path.display(), e),
                },
                Err(e) => tracing::warn!("Error reading {}: {}. Using defaults.", config_path.display(), e),
            }
        }

        Config::default()
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/vision-chat")
        } else {
            PathBuf::from(".")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.backend.base_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.min_height, 480);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [backend]
            base_url = "http://10.0.0.2:5000"

            [window]
            width = 1024
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.base_url, "http://10.0.0.2:5000");
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 900);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::parse("[backend\nbase_url = ").is_err());
    }

    #[test]
    fn test_config_path_file_name() {
        assert!(Config::get_config_path().ends_with("config.toml"));
    }
}
