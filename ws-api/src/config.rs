use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// YAML file with the system config and the managed namespaces
    #[serde(default = "default_namespaces_path")]
    pub namespaces_path: PathBuf,
}

fn default_bind_addr() -> String {
    std::env::var("WS_API_BIND").unwrap_or_else(|_| "0.0.0.0:8887".to_string())
}

fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("WS_API_DB_PATH") {
        return PathBuf::from(path);
    }

    data_dir().join("ws.db")
}

fn default_namespaces_path() -> PathBuf {
    if let Ok(path) = std::env::var("WS_NAMESPACES_CONFIG") {
        return PathBuf::from(path);
    }

    data_dir().join("namespaces.yaml")
}

fn data_dir() -> PathBuf {
    if cfg!(windows) {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join("ws-orchestrator")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".ws-orchestrator")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            namespaces_path: default_namespaces_path(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }
}
