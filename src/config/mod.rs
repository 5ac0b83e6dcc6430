//! Client configuration: API key, base URL and the model registry.
//!
//! Values come from `~/.banana/config.json` and can be overridden with
//! environment variables:
//!
//! - `BANANA_APIKEY` - API key
//! - `BANANA_URL` - base URL (`local` means `http://localhost/`)
//! - `BANANA_MODEL` - name of the current model
//! - `BANANA_MODEL_KEY` - model key used when no registered model matches
//! - `BANANA_SERVER` - route `run` straight to a self-hosted server
//!   (`local` means `http://localhost:8000/`)

mod registry;

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

pub use registry::BananaModel;

pub const DEFAULT_BASE_URL: &str = "https://api.banana.dev";
pub const LOCAL_BASE_URL: &str = "http://localhost/";
pub const LOCAL_DIRECT_SERVER: &str = "http://localhost:8000/";

pub const CONFIG_DIR: &str = ".banana";
pub const CONFIG_FILE: &str = "config.json";

/// Read-only view of the configuration the client needs for a call.
pub trait ConfigProvider: Send + Sync {
    fn api_key(&self) -> Option<String>;
    fn base_url(&self) -> String;
    /// Key for `name`, or for the current model when `name` is `None`.
    fn resolve_model_key(&self, name: Option<&str>) -> Option<String>;
    /// Self-hosted server that bypasses the start/check protocol.
    fn direct_server(&self) -> Option<String>;
}

/// Configuration passed explicitly to every client.
///
/// Only `api_key`, `base_url`, `current_model` and `models` are persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct BananaConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub current_model: Option<String>,
    pub models: BTreeMap<String, String>,
    /// Fallback when no registered model matches (`BANANA_MODEL_KEY`)
    pub model_key: Option<String>,
    pub direct_server: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for BananaConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            current_model: None,
            models: BTreeMap::new(),
            model_key: None,
            direct_server: None,
        }
    }
}

/// Fields present in a config file. Missing fields keep their current value.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    apikey: Option<String>,
    url: Option<String>,
    current_model: Option<String>,
    models: Option<BTreeMap<String, String>>,
}

#[derive(Serialize)]
struct ConfigFileRef<'a> {
    apikey: &'a Option<String>,
    url: &'a str,
    current_model: &'a Option<String>,
    models: &'a BTreeMap<String, String>,
}

impl BananaConfig {
    /// `~/.banana/config.json`
    pub fn default_path<R: Runtime>(runtime: &R) -> Result<PathBuf> {
        let home = runtime
            .home_dir()
            .context("Could not determine home directory")?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Defaults, then the default config file if it exists, then environment.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R) -> Result<Self> {
        let path = Self::default_path(runtime)?;
        let mut config = Self::read(runtime, &path)?;
        config.apply_env(runtime);
        config.select_current_model();
        Ok(config)
    }

    /// Only what is persisted at `path`, without environment overrides.
    /// A missing file yields the defaults.
    pub fn read<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let mut config = Self::default();
        if runtime.exists(path) {
            debug!("Loading config from {:?}", path);
            config.merge_file(&read_config_file(runtime, path)?);
        }
        Ok(config)
    }

    /// Load an explicit config file. Values in the file take precedence over
    /// the environment.
    #[tracing::instrument(skip(runtime))]
    pub fn load_from<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        if !runtime.exists(path) {
            bail!("Config file: {} does not exist", path.display());
        }
        info!("Loading config from: {}", path.display());

        let mut config = Self::default();
        config.apply_env(runtime);
        config.merge_file(&read_config_file(runtime, path)?);
        config.select_current_model();
        Ok(config)
    }

    /// Write the persistent fields, defaulting to `~/.banana/config.json`.
    /// Returns the path written.
    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path(runtime)?,
        };
        if let Some(parent) = path.parent() {
            runtime.create_dir_all(parent)?;
        }

        let file = ConfigFileRef {
            apikey: &self.api_key,
            url: &self.base_url,
            current_model: &self.current_model,
            models: &self.models,
        };
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        file.serialize(&mut ser)
            .context("Failed to serialize config")?;

        runtime.write(&path, &buf)?;
        info!("Saved config to: {}", path.display());
        Ok(path)
    }

    /// Apply `BANANA_*` environment overrides.
    pub fn apply_env<R: Runtime>(&mut self, runtime: &R) {
        if let Ok(key) = runtime.env_var("BANANA_APIKEY") {
            self.api_key = Some(key);
        }
        if let Ok(url) = runtime.env_var("BANANA_URL") {
            self.base_url = if url == "local" {
                LOCAL_BASE_URL.to_string()
            } else {
                url
            };
            debug!("Using base URL {}", self.base_url);
        }
        if let Ok(model) = runtime.env_var("BANANA_MODEL") {
            self.current_model = Some(model);
        }
        if let Ok(key) = runtime.env_var("BANANA_MODEL_KEY") {
            self.model_key = Some(key);
        }
        if let Ok(server) = runtime.env_var("BANANA_SERVER") {
            let server = if server == "local" {
                LOCAL_DIRECT_SERVER.to_string()
            } else {
                server
            };
            info!("Routing calls directly to server hosted at {}", server);
            self.direct_server = Some(server);
        }
    }

    fn merge_file(&mut self, file: &ConfigFile) {
        if let Some(key) = &file.apikey {
            self.api_key = Some(key.clone());
        }
        if let Some(url) = &file.url {
            self.base_url = url.clone();
        }
        if let Some(model) = &file.current_model {
            self.current_model = Some(model.clone());
        }
        if let Some(models) = &file.models {
            self.models = models.clone();
        }
    }

    /// Fall back to the first registered model when none is current.
    fn select_current_model(&mut self) {
        if self.current_model.is_none() {
            if let Some(first) = self.models.keys().next() {
                info!("Setting current model to: {}", first);
                self.current_model = Some(first.clone());
            }
        }
    }
}

fn read_config_file<R: Runtime>(runtime: &R, path: &Path) -> Result<ConfigFile> {
    let content = runtime.read_to_string(path)?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

impl ConfigProvider for BananaConfig {
    fn api_key(&self) -> Option<String> {
        self.api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    fn base_url(&self) -> String {
        self.base_url.clone()
    }

    fn resolve_model_key(&self, name: Option<&str>) -> Option<String> {
        self.model_key(name)
    }

    fn direct_server(&self) -> Option<String> {
        self.direct_server.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use crate::test_utils::{configure_mock_runtime_basics, test_home};
    use mockall::predicate::eq;
    use std::env::VarError;

    fn env_runtime(vars: &'static [(&'static str, &'static str)]) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime.expect_home_dir().returning(|| Some(test_home()));
        runtime.expect_env_var().returning(move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .ok_or(VarError::NotPresent)
        });
        runtime
    }

    #[test]
    fn test_load_defaults_without_file_or_env() {
        let mut runtime = MockRuntime::new();
        configure_mock_runtime_basics(&mut runtime);
        runtime.expect_exists().returning(|_| false);

        let config = BananaConfig::load(&runtime).unwrap();

        assert_eq!(config, BananaConfig::default());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_load_reads_default_file_then_env_overrides() {
        let mut runtime = env_runtime(&[("BANANA_APIKEY", "env-key")]);
        let path = test_home().join(".banana/config.json");
        runtime
            .expect_exists()
            .with(eq(path.clone()))
            .returning(|_| true);
        runtime
            .expect_read_to_string()
            .with(eq(path))
            .returning(|_| {
                Ok(r#"{
                    "apikey": "file-key",
                    "url": "https://example.com",
                    "models": {"sd": "sd-key", "gpt": "gpt-key"}
                }"#
                .to_string())
            });

        let config = BananaConfig::load(&runtime).unwrap();

        assert_eq!(config.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.base_url, "https://example.com");
        // no current model in file or env: first by name
        assert_eq!(config.current_model.as_deref(), Some("gpt"));
        assert_eq!(config.model_key(None).as_deref(), Some("gpt-key"));
    }

    #[test]
    fn test_apply_env_local_shortcuts() {
        let runtime = env_runtime(&[
            ("BANANA_URL", "local"),
            ("BANANA_SERVER", "local"),
            ("BANANA_MODEL", "sd"),
            ("BANANA_MODEL_KEY", "explicit-key"),
        ]);

        let mut config = BananaConfig::default();
        config.apply_env(&runtime);

        assert_eq!(config.base_url, LOCAL_BASE_URL);
        assert_eq!(config.direct_server.as_deref(), Some(LOCAL_DIRECT_SERVER));
        assert_eq!(config.current_model.as_deref(), Some("sd"));
        assert_eq!(config.model_key.as_deref(), Some("explicit-key"));
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let mut runtime = env_runtime(&[]);
        runtime.expect_exists().returning(|_| false);

        let err = BananaConfig::load_from(&runtime, Path::new("/nope/config.json")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_load_from_file_wins_over_env() {
        let mut runtime = env_runtime(&[("BANANA_APIKEY", "env-key"), ("BANANA_MODEL", "gpt")]);
        runtime.expect_exists().returning(|_| true);
        runtime.expect_read_to_string().returning(|_| {
            Ok(r#"{"apikey": "file-key", "current_model": "sd", "models": {"sd": "sd-key"}}"#
                .to_string())
        });

        let config = BananaConfig::load_from(&runtime, Path::new("/custom.json")).unwrap();

        assert_eq!(config.api_key.as_deref(), Some("file-key"));
        assert_eq!(config.current_model.as_deref(), Some("sd"));
        assert_eq!(config.model_key(None).as_deref(), Some("sd-key"));
    }

    #[test]
    fn test_load_from_invalid_json_fails() {
        let mut runtime = env_runtime(&[]);
        runtime.expect_exists().returning(|_| true);
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("{not json".to_string()));

        let err = BananaConfig::load_from(&runtime, Path::new("/broken.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_save_writes_file_shape_with_four_space_indent() {
        let mut runtime = MockRuntime::new();
        runtime.expect_home_dir().returning(|| Some(test_home()));
        runtime
            .expect_create_dir_all()
            .with(eq(test_home().join(".banana")))
            .times(1)
            .returning(|_| Ok(()));
        runtime
            .expect_write()
            .withf(|path, contents| {
                let text = std::str::from_utf8(contents).unwrap();
                path.ends_with(".banana/config.json")
                    && text.contains("\n    \"apikey\": \"key\"")
                    && text.contains("\"current_model\": \"sd\"")
                    && !text.contains("direct_server")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut config = BananaConfig {
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        config.add_model("sd", "sd-key");
        config.use_model("sd").unwrap();

        let path = config.save(&runtime, None).unwrap();
        assert_eq!(path, test_home().join(".banana/config.json"));
    }

    #[test]
    fn test_save_and_load_from_disk() {
        let runtime = RealRuntime;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");

        let mut config = BananaConfig {
            api_key: Some("disk-key".to_string()),
            base_url: "https://example.com".to_string(),
            ..Default::default()
        };
        config.add_model("sd", "sd-key");

        config.save(&runtime, Some(&path)).unwrap();
        let loaded = BananaConfig::load_from(&runtime, &path).unwrap();

        assert_eq!(loaded.models, config.models);
        assert_eq!(loaded.current_model.as_deref(), Some("sd"));
        assert_eq!(loaded.model_key(None).as_deref(), Some("sd-key"));
    }

    #[test]
    fn test_provider_trims_api_key() {
        let config = BananaConfig {
            api_key: Some("  key \n".to_string()),
            ..Default::default()
        };
        assert_eq!(ConfigProvider::api_key(&config).as_deref(), Some("key"));

        let blank = BananaConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(ConfigProvider::api_key(&blank), None);
    }
}
