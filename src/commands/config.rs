use anyhow::Result;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

use crate::config::BananaConfig;
use crate::runtime::Runtime;

/// Edits to the persisted config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    Show,
    SetKey(String),
    SetUrl(String),
    AddModel { name: String, key: String },
    RemoveModel(String),
    UseModel(String),
}

/// Apply `action` to the config file at `path` (default `~/.banana/config.json`).
///
/// Environment overrides are ignored so they never leak into the saved file.
#[tracing::instrument(skip(runtime))]
pub fn config<R: Runtime>(runtime: &R, path: Option<&Path>, action: ConfigAction) -> Result<Value> {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => BananaConfig::default_path(runtime)?,
    };
    let mut config = BananaConfig::read(runtime, &path)?;

    match action {
        ConfigAction::Show => return Ok(describe(&config, &path)),
        ConfigAction::SetKey(key) => config.api_key = Some(key),
        ConfigAction::SetUrl(url) => config.base_url = url,
        ConfigAction::AddModel { name, key } => {
            if config.current_model.is_none() {
                config.current_model = Some(name.clone());
            }
            config.add_model(name, key);
        }
        ConfigAction::RemoveModel(name) => {
            if config.remove_model(&name).is_none() {
                anyhow::bail!("Model '{}' is not registered", name);
            }
        }
        ConfigAction::UseModel(name) => config.use_model(&name)?,
    }

    config.save(runtime, Some(&path))?;
    Ok(describe(&config, &path))
}

fn describe(config: &BananaConfig, path: &Path) -> Value {
    json!({
        "path": path.display().to_string(),
        "apikey": config.api_key.as_deref().map(mask),
        "url": config.base_url,
        "current_model": config.current_model,
        "models": config.models.keys().collect::<Vec<_>>(),
    })
}

/// Keep the first 8 and last 4 characters of a secret.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}
