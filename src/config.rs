use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

const TEMPLATE: &str = r#"# addr_harvest configuration
server = "imap.example.com"
port = 993
username = "you@example.com"
password = "app-password"
# mailbox = "INBOX"
"#;

#[derive(Deserialize, Clone)]
pub struct Config {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mailbox", &self.mailbox)
            .finish()
    }
}

impl Config {
    pub fn parse(path: &Path, s: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(s).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("server", &self.server),
            ("username", &self.username),
            ("password", &self.password),
            ("mailbox", &self.mailbox),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        if self.port == 0 {
            return Err(ConfigError::Missing("port"));
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::NoConfigDir)?
        .join("addr_harvest")
        .join("config.toml"))
}

/// Loads `path`, or the default location when `None`.
///
/// A missing file is replaced by a template and reported as an error so the
/// user can fill it in before anything touches the network.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    let io_err = |source| ConfigError::Read {
        path: path.clone(),
        source,
    };

    if !path.exists() {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        fs::write(&path, TEMPLATE).map_err(io_err)?;
        return Err(ConfigError::TemplateCreated(path));
    }

    let s = fs::read_to_string(&path).map_err(io_err)?;
    Config::parse(&path, &s)
}
