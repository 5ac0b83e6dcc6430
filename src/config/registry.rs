//! Model name to model key bookkeeping.

use anyhow::{Result, bail};
use log::info;
use serde::{Deserialize, Serialize};

use super::BananaConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BananaModel {
    pub name: String,
    pub key: String,
}

impl BananaConfig {
    /// Register or replace a model.
    pub fn add_model(&mut self, name: impl Into<String>, key: impl Into<String>) {
        let name = name.into();
        info!("Registering model {}", name);
        self.models.insert(name, key.into());
    }

    /// Remove a model. Returns its key if it was registered.
    ///
    /// Removing the current model also clears it as current. An explicit
    /// `model_key` stays as the fallback.
    pub fn remove_model(&mut self, name: &str) -> Option<String> {
        let removed = self.models.remove(name);
        if removed.is_some() && self.current_model.as_deref() == Some(name) {
            self.current_model = None;
        }
        removed
    }

    /// Make a registered model the current one.
    pub fn use_model(&mut self, name: &str) -> Result<()> {
        if !self.models.contains_key(name) {
            bail!("Model '{}' is not registered", name);
        }
        self.current_model = Some(name.to_string());
        Ok(())
    }

    /// Registered models ordered by name.
    pub fn models(&self) -> Vec<BananaModel> {
        self.models
            .iter()
            .map(|(name, key)| BananaModel {
                name: name.clone(),
                key: key.clone(),
            })
            .collect()
    }

    /// Key for `name`, or for the current model when `name` is `None`.
    /// Falls back to the explicit model key.
    pub fn model_key(&self, name: Option<&str>) -> Option<String> {
        name.or(self.current_model.as_deref())
            .and_then(|n| self.models.get(n))
            .or(self.model_key.as_ref())
            .cloned()
    }
}
