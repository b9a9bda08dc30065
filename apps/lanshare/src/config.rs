//! Front-end configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/lanshare/config.toml`
//! - Windows: `%APPDATA%/lanshare/config.toml`

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use lanshare_transfer::{ClientConfig, ServerConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name shown to peers. Empty means the hostname.
    #[serde(default)]
    pub name: String,

    /// Transfer port, both listened on and advertised.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Where `serve` saves files when `--dir` is not given.
    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    #[serde(default)]
    pub auto_accept: bool,

    /// Encrypt every send, not only those with `--encrypt`.
    #[serde(default)]
    pub encrypt: bool,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default = "default_pool_slots")]
    pub pool_slots: usize,
}

fn default_port() -> u16 {
    lanshare_transfer::DEFAULT_TRANSFER_PORT
}

fn default_download_dir() -> String {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".into());
    PathBuf::from(home)
        .join("Downloads")
        .join("LanShare")
        .to_string_lossy()
        .into_owned()
}

fn default_buffer_size() -> usize {
    ServerConfig::default().buffer_size
}

fn default_pool_slots() -> usize {
    ServerConfig::default().pool_slots
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::new(),
            port: default_port(),
            download_dir: default_download_dir(),
            auto_accept: false,
            encrypt: false,
            buffer_size: default_buffer_size(),
            pool_slots: default_pool_slots(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Saves the current configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.port,
            buffer_size: self.buffer_size,
            pool_slots: self.pool_slots,
            ..ServerConfig::default()
        }
    }

    pub fn client_config(&self, encrypt: bool) -> ClientConfig {
        ClientConfig {
            port: self.port,
            buffer_size: self.buffer_size,
            pool_slots: self.pool_slots,
            encrypt: encrypt || self.encrypt,
            ..ClientConfig::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("lanshare").join("config.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("lanshare")
            .join("config.toml"))
    }
}
