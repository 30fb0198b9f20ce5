use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5001;
const ESPEAK_PROGRAM: &str = "espeak-ng";

/// Standard eSpeak NG install folders, searched when no program is configured.
#[cfg(windows)]
const ESPEAK_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\eSpeak NG",
    r"C:\Program Files (x86)\eSpeak NG",
];
#[cfg(not(windows))]
const ESPEAK_INSTALL_DIRS: &[&str] = &[];

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be a port number, got '{value}'")]
    InvalidPort { var: &'static str, value: String },

    #[error("Invalid listen address '{0}'")]
    InvalidAddress(String),
}

/// Server settings, read once from the environment at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub model_dir: PathBuf,
    pub espeak_program: PathBuf,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        // KOKORO_PORT wins over the generic PORT
        let port = match ["KOKORO_PORT", "PORT"]
            .into_iter()
            .find_map(|var| lookup(var).map(|value| (var, value)))
        {
            Some((var, value)) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort { var, value })?,
            None => DEFAULT_PORT,
        };

        let model_dir = lookup("KOKORO_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let espeak_program = lookup("PHONEMIZER_ESPEAK_PATH")
            .map(PathBuf::from)
            .or_else(|| find_installed_espeak(ESPEAK_INSTALL_DIRS, Path::is_file))
            .unwrap_or_else(|| PathBuf::from(ESPEAK_PROGRAM));

        Ok(Self {
            host,
            port,
            model_dir,
            espeak_program,
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

/// First `espeak-ng.exe` found in `dirs`.
fn find_installed_espeak<F>(dirs: &[&str], exists: F) -> Option<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    dirs.iter()
        .map(|dir| Path::new(dir).join("espeak-ng.exe"))
        .find(|program| exists(program))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5001);
        assert_eq!(config.model_dir, PathBuf::from("."));
        assert_eq!(config.espeak_program, PathBuf::from("espeak-ng"));
    }

    #[test]
    fn test_kokoro_port_overrides_port() {
        let config = config_from(&[("PORT", "8080"), ("KOKORO_PORT", "6000")]).unwrap();
        assert_eq!(config.port, 6000);

        let config = config_from(&[("PORT", "8080")]).unwrap();
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_invalid_port() {
        let err = config_from(&[("KOKORO_PORT", "abc")]).unwrap_err();
        assert!(err.to_string().contains("KOKORO_PORT"));
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_find_installed_espeak() {
        let missing = tempfile::tempdir().unwrap();
        let installed = tempfile::tempdir().unwrap();
        std::fs::write(installed.path().join("espeak-ng.exe"), b"").unwrap();

        let dirs = [
            missing.path().to_str().unwrap(),
            installed.path().to_str().unwrap(),
        ];
        assert_eq!(
            find_installed_espeak(&dirs, Path::is_file),
            Some(installed.path().join("espeak-ng.exe"))
        );
        assert_eq!(find_installed_espeak(&dirs[..1], Path::is_file), None);
    }

    #[test]
    fn test_espeak_path_from_env_wins() {
        let config = config_from(&[("PHONEMIZER_ESPEAK_PATH", "/opt/espeak-ng")]).unwrap();
        assert_eq!(config.espeak_program, PathBuf::from("/opt/espeak-ng"));
    }

    #[test]
    fn test_listen_addr() {
        let config = config_from(&[("HOST", "127.0.0.1"), ("KOKORO_PORT", "5002")]).unwrap();
        assert_eq!(config.listen_addr().unwrap().to_string(), "127.0.0.1:5002");

        let config = config_from(&[("HOST", "not a host")]).unwrap();
        assert!(config.listen_addr().is_err());
    }
}
