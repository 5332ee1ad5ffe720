//! Per-module configuration: an ordered string map with typed accessors.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use super::ModuleError;

/// Key/value configuration handed to [`Module::configure`](super::Module::configure).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleConfig {
    entries: BTreeMap<String, String>,
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace an entry, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse `key` as `T`. `Ok(None)` if the key is absent.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, ModuleError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ModuleError::InvalidConfig {
                    key: key.to_string(),
                    value: raw.to_string(),
                    reason: e.to_string(),
                }),
        }
    }

    /// Parse `key` as `T`, falling back to `default` when absent.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ModuleError>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    /// Parse `key` as a boolean flag (`true`/`1`/`yes`/`on` and
    /// `false`/`0`/`no`/`off`). Unrecognised values are an error.
    pub fn flag(&self, key: &str) -> Result<Option<bool>, ModuleError> {
        let Some(raw) = self.get(key) else {
            return Ok(None);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ModuleError::InvalidConfig {
                key: key.to_string(),
                value: raw.to_string(),
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ModuleConfig
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<BTreeMap<String, String>> for ModuleConfig {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}
