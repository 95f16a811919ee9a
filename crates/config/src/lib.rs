//! Layered configuration for the `shutter` binary.
//!
//! Values are resolved in order, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`]).
//! 2. A configuration file: the one passed with `--config`, or
//!    `config.toml` in the platform configuration directory if it exists.
//!    TOML, YAML and JSON are accepted, picked by file extension.
//! 3. Environment variables prefixed with `SHUTTER_` (`SHUTTER_LISTEN`,
//!    `SHUTTER_RELOAD_CONCURRENCY`, ...).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::Level;

pub const ENV_PREFIX: &str = "SHUTTER_";
const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "shutter")
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub listen: SocketAddr,
    /// Root of the photo storage: one folder per photo identity.
    pub photography_directory: PathBuf,
    /// SQLite database holding the photo collections and the log tables.
    pub database: PathBuf,
    /// JSON document with the API token and the Basic auth credentials.
    /// Re-read on every authorization check.
    pub secrets: PathBuf,
    /// Public URL of the site, prefixed to request paths in the access log.
    pub site_url: String,
    /// `tracing-subscriber` filter directive for console output.
    pub log_level: String,
    /// Minimum level of events copied into the log table.
    pub journal_level: String,
    /// Sidecars processed at once during a reload.
    pub reload_concurrency: usize,
    /// Upper bound on an upload request body.
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = project_dirs().map(|dirs| dirs.data_dir().to_path_buf()).unwrap_or_default();
        let config_dir = project_dirs().map(|dirs| dirs.config_dir().to_path_buf()).unwrap_or_default();
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 3000)),
            photography_directory: data_dir.join("photography"),
            database: data_dir.join("shutter.sqlite"),
            secrets: config_dir.join("secrets.json"),
            site_url: "https://cjremmett.com".to_string(),
            log_level: "info".to_string(),
            journal_level: "info".to_string(),
            reload_concurrency: 8,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Config {
    /// Where a configuration file is looked for when none is given.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Resolve every layer and validate the result.
    ///
    /// An explicit `path` must exist; the default location is skipped
    /// silently when it doesn't.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::extract(&Self::figment(path)?)
    }

    /// The layered provider, without extracting it.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match path {
            Some(path) if !path.is_file() => {
                exn::bail!(ErrorKind::Invalid(format!("configuration file {} does not exist", path.display())))
            },
            Some(path) => merge_file(figment, path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => merge_file(figment, &path)?,
                _ => figment,
            },
        };
        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Extract and validate a configuration from any figment.
    pub fn extract(figment: &Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .or_raise(|| ErrorKind::Invalid("could not read configuration values".to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reload_concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("reload_concurrency must be at least 1".to_string()));
        }
        if self.max_upload_bytes == 0 {
            exn::bail!(ErrorKind::Invalid("max_upload_bytes must be at least 1".to_string()));
        }
        if self.journal_level.parse::<Level>().is_err() {
            exn::bail!(ErrorKind::Invalid(format!("unknown journal_level `{}`", self.journal_level)));
        }
        if self.log_level.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("log_level must not be empty".to_string()));
        }
        let host = self.site_url.strip_prefix("https://").or_else(|| self.site_url.strip_prefix("http://"));
        if host.is_none_or(|host| host.trim_end_matches('/').is_empty()) {
            exn::bail!(ErrorKind::Invalid(format!("site_url `{}` is not an http(s) URL", self.site_url)));
        }
        Ok(())
    }

    /// [`journal_level`](Self::journal_level) as a [`Level`].
    pub fn journal_threshold(&self) -> Level {
        self.journal_level.parse().unwrap_or(Level::INFO)
    }

    /// `site_url` without a trailing slash, ready for a path to be appended.
    pub fn site_base(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    tracing::debug!(path = %path.display(), "Reading configuration file");
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::Invalid(format!("unsupported configuration format: {}", path.display()))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;
    use std::fs;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.reload_concurrency, 8);
        assert_eq!(config.journal_threshold(), Level::INFO);
        assert_eq!(config.site_base(), "https://cjremmett.com");
    }

    #[rstest]
    #[case("config.toml", "reload_concurrency = 3\nsite_url = \"https://example.org/\"\n")]
    #[case("config.yaml", "reload_concurrency: 3\nsite_url: https://example.org/\n")]
    #[case("config.YML", "reload_concurrency: 3\nsite_url: https://example.org/\n")]
    #[case("config.json", r#"{"reload_concurrency": 3, "site_url": "https://example.org/"}"#)]
    fn test_file_formats(#[case] name: &str, #[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();

        let config = Config::extract(&Config::figment(Some(path.as_path())).unwrap()).unwrap();
        assert_eq!(config.reload_concurrency, 3);
        assert_eq!(config.site_base(), "https://example.org");
        // Untouched values keep their defaults.
        assert_eq!(config.listen, Config::default().listen);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::figment(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        fs::write(&path, "listen = 127.0.0.1:1").unwrap();
        let err = Config::figment(Some(path.as_path())).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }

    #[test]
    fn test_environment_wins() {
        Jail::expect_with(|jail| {
            jail.create_file("shutter.toml", "reload_concurrency = 3\njournal_level = \"debug\"")?;
            jail.set_env("SHUTTER_RELOAD_CONCURRENCY", "5");
            jail.set_env("SHUTTER_LISTEN", "127.0.0.1:8080");
            let config = Config::load(Some(Path::new("shutter.toml"))).unwrap();
            assert_eq!(config.reload_concurrency, 5);
            assert_eq!(config.listen, "127.0.0.1:8080".parse().unwrap());
            assert_eq!(config.journal_threshold(), Level::DEBUG);
            Ok(())
        });
    }

    #[rstest]
    #[case("reload_concurrency = 0")]
    #[case("max_upload_bytes = 0")]
    #[case("journal_level = \"loud\"")]
    #[case("log_level = \" \"")]
    #[case("site_url = \"ftp://example.org\"")]
    #[case("site_url = \"https://\"")]
    #[case("listen = \"not an address\"")]
    fn test_rejects_invalid_values(#[case] contents: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).unwrap();
        let err = Config::extract(&Config::figment(Some(path.as_path())).unwrap()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }
}
