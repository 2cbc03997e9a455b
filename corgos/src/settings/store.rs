use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::utils::fs;
use crate::{Error, Result};

/// In-memory representation of the settings file.
pub type SettingsMap = serde_json::Map<String, Value>;

/// A JSON settings file held in memory.
///
/// Every read and write goes through one async lock. `set` and `apply`
/// persist the whole mapping before releasing it, so a value visible in
/// memory is always already on disk. Instances are obtained from a
/// [`SettingsRegistry`](super::SettingsRegistry).
#[derive(Debug)]
pub struct Settings {
    path: PathBuf,
    data: Mutex<SettingsMap>,
}

impl Settings {
    pub(super) fn new(path: PathBuf) -> Self {
        Self {
            path,
            data: Mutex::new(SettingsMap::new()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// (Re)load the mapping from disk, replacing the in-memory copy.
    pub async fn load(&self) -> Result<()> {
        debug!(path = %self.path.display(), "Loading settings");
        let mut data = self.data.lock().await;

        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| fs::io_error("reading", &self.path, e))?;
        let Value::Object(map) = serde_json::from_slice::<Value>(&raw)? else {
            return Err(Error::config(format!(
                "settings file {} must contain a JSON object",
                self.path.display()
            )));
        };

        *data = map;
        debug!(keys = data.len(), "Settings loaded");
        Ok(())
    }

    /// Write the in-memory mapping back to disk.
    pub async fn save(&self) -> Result<()> {
        let data = self.data.lock().await;
        Self::persist(&self.path, &data).await?;
        debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    /// Fail with [`Error::KeyNotFound`] for the first missing key.
    pub async fn validate(&self, required_keys: &[&str]) -> Result<()> {
        let data = self.data.lock().await;
        if let Some(missing) = required_keys.iter().find(|k| !data.contains_key(**k)) {
            error!(key = %missing, "Required key not found in settings");
            return Err(Error::key_not_found(*missing));
        }
        Ok(())
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.data.lock().await.contains_key(key)
    }

    /// Copy of the whole mapping.
    pub async fn snapshot(&self) -> SettingsMap {
        self.data.lock().await.clone()
    }

    /// Read `key`, deserializing it into `T`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_with(key, |value| {
            serde_json::from_value(value.clone())
                .map_err(|e| Error::invalid_setting(key, e.to_string()))
        })
        .await
    }

    /// Read `key` through a custom deserializer.
    pub async fn get_with<T, F>(&self, key: &str, deserializer: F) -> Result<T>
    where
        F: FnOnce(&Value) -> Result<T>,
    {
        let data = self.data.lock().await;
        let value = data.get(key).ok_or_else(|| Error::key_not_found(key))?;
        deserializer(value)
    }

    /// Read an optional key, falling back to `default` when it is absent.
    pub async fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key).await {
            Err(Error::KeyNotFound { .. }) => Ok(default),
            other => other,
        }
    }

    /// Replace the value of an existing key and persist.
    pub async fn set<T: Serialize>(&self, key: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.update(key, |_| Ok(value)).await.map(|_| ())
    }

    /// Replace the value of an existing key through a custom serializer and persist.
    pub async fn set_with<T, F>(&self, key: &str, value: T, serializer: F) -> Result<()>
    where
        F: FnOnce(T) -> Value,
    {
        self.update(key, |_| Ok(serializer(value))).await.map(|_| ())
    }

    /// Transform the raw value of an existing key, persist, and return the new value.
    pub async fn apply<F>(&self, key: &str, func: F) -> Result<Value>
    where
        F: FnOnce(Value) -> Value,
    {
        self.update(key, |current| Ok(func(current.clone()))).await
    }

    /// Typed variant of [`apply`](Self::apply).
    pub async fn apply_as<T, F>(&self, key: &str, func: F) -> Result<T>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce(T) -> T,
    {
        let updated = self
            .update(key, |current| {
                let typed: T = serde_json::from_value(current.clone())
                    .map_err(|e| Error::invalid_setting(key, e.to_string()))?;
                Ok(serde_json::to_value(func(typed))?)
            })
            .await?;
        Ok(serde_json::from_value(updated)?)
    }

    /// Compute a new value for `key` under the lock and persist it.
    ///
    /// The previous value is restored if writing the file fails.
    async fn update<F>(&self, key: &str, func: F) -> Result<Value>
    where
        F: FnOnce(&Value) -> Result<Value>,
    {
        debug!(key = %key, "Updating setting");
        let mut data = self.data.lock().await;

        let previous = data.get(key).cloned().ok_or_else(|| {
            error!(key = %key, "Key not found in settings");
            Error::key_not_found(key)
        })?;
        let updated = func(&previous)?;
        data.insert(key.to_string(), updated.clone());

        if let Err(e) = Self::persist(&self.path, &data).await {
            data.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(updated)
    }

    async fn persist(path: &Path, data: &SettingsMap) -> Result<()> {
        let content = serde_json::to_vec_pretty(data)?;
        fs::write_atomic(path, &content).await
    }
}
