use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

const CONFIG_PREFIX: &str = "GEOSCRUB";
const CONFIG_FILE_PATH: &str = "./defaults.toml";
const CONFIG_FILE_ENV_PATH_KEY: &str = "GEOSCRUB_CONFIG_FILE";
const HOME_ENV_KEY: &str = "GEOSCRUB_HOME";

/// Directory holding the built index: `GEOSCRUB_HOME` or `~/.geoscrub`.
pub fn geoscrub_home() -> PathBuf {
    if let Ok(home) = std::env::var(HOME_ENV_KEY) {
        return PathBuf::from(home);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_owned());
    PathBuf::from(home).join(".geoscrub")
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub host: String,
    pub port: usize,
    pub index_file: String,
    pub url_path_prefix: String,
    pub static_dir: Option<String>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", defaults.port as u64)?
            .set_default("index_file", defaults.index_file)?
            .set_default("url_path_prefix", defaults.url_path_prefix)?
            .add_source(File::with_name(CONFIG_FILE_PATH).required(false));

        if let Ok(config_path) = std::env::var(CONFIG_FILE_ENV_PATH_KEY) {
            builder = builder.add_source(File::with_name(&config_path));
        }

        builder
            .add_source(Environment::with_prefix(CONFIG_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "localhost".to_owned(),
            port: 8080,
            index_file: geoscrub_home()
                .join("index.bin")
                .into_os_string()
                .into_string()
                .unwrap_or_else(|_| "index.bin".to_owned()),
            url_path_prefix: "/".to_owned(),
            static_dir: None,
        }
    }
}
