//! Static key-value configuration of the metadata server.
//!
//! Keys use a dotted namespace (`public-keys.<name>`). The configuration file is YAML;
//! nested mappings are flattened into dotted keys, so the two files below are equivalent:
//!
//! ```yaml
//! public-keys:
//!   default: ssh-ed25519 AAAA...
//! ```
//!
//! ```yaml
//! public-keys.default: ssh-ed25519 AAAA...
//! ```

use arc_swap::ArcSwap;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::errors::Error;

pub const MD_BASE: &str = "md-base";
pub const PASSWORD: &str = "password";
pub const HOSTNAME_PREFIX: &str = "hostname-prefix";
pub const LISTEN: &str = "listen";
pub const PUBLIC_KEYS_PREFIX: &str = "public-keys.";
pub const DEFAULT_PUBLIC_KEY: &str = "public-keys.default";

/// Value of `public-keys.default` when no key has been configured
pub const NOT_CONFIGURED: &str = "__NOT_CONFIGURED__";

const DEFAULTS: [(&str, &str); 5] = [
    (MD_BASE, "/2009-04-04"),
    (PASSWORD, "password"),
    (HOSTNAME_PREFIX, "vm"),
    (DEFAULT_PUBLIC_KEY, NOT_CONFIGURED),
    (LISTEN, "169.254.169.254:80"),
];

/// An immutable configuration snapshot. Iteration order is sorted by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    values: BTreeMap<String, String>,
}

impl Default for Configuration {
    fn default() -> Self {
        DEFAULTS.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Configuration {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Configuration {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl Configuration {
    /// Build the configuration from the defaults, overridden by the given file if it exists.
    /// A path that exists but cannot be read or parsed is an error.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Configuration, Error> {
        let mut config = Configuration::default();
        let Some(path) = path else {
            debug!("No configuration file given, using defaults");
            return Ok(config);
        };
        let exists = path.try_exists().map_err(|source| Error::ConfigFileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        if !exists {
            info!("Configuration file {:?} does not exist, using defaults", path);
            return Ok(config);
        }

        let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigFileUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        config.merge_yaml(path, &content)?;
        info!("Configuration loaded from {:?}", path);
        Ok(config)
    }

    fn merge_yaml(&mut self, path: &Path, content: &str) -> Result<(), Error> {
        let malformed = |reason: String| Error::ConfigMalformed {
            path: path.to_path_buf(),
            reason,
        };
        let document: Value = serde_yaml::from_str(content).map_err(|e| malformed(e.to_string()))?;
        match &document {
            Value::Null => Ok(()),
            Value::Mapping(_) => flatten("", &document, &mut self.values).map_err(malformed),
            _ => Err(malformed(String::from("top level is not a mapping"))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn require(&self, key: &str) -> Result<&str, Error> {
        self.get(key)
            .ok_or_else(|| Error::ConfigKeyMissing(key.to_string()))
    }

    /// All keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Whether the default public key is still the unconfigured placeholder
    pub fn default_key_unset(&self) -> bool {
        self.get(DEFAULT_PUBLIC_KEY)
            .is_none_or(|key| key == NOT_CONFIGURED)
    }

    pub fn listen_address(&self) -> Result<SocketAddr, Error> {
        let listen = self.require(LISTEN)?;
        listen
            .parse()
            .map_err(|_| Error::InvalidListenAddress(listen.to_string()))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn flatten(
    prefix: &str,
    value: &Value,
    values: &mut BTreeMap<String, String>,
) -> Result<(), String> {
    match value {
        Value::Mapping(mapping) => {
            for (key, value) in mapping {
                let key = scalar_to_string(key)
                    .ok_or_else(|| format!("unsupported key {key:?} under '{prefix}'"))?;
                let key = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&key, value, values)?;
            }
            Ok(())
        }
        // Leave the default in place
        Value::Null => Ok(()),
        Value::Tagged(tagged) => flatten(prefix, &tagged.value, values),
        Value::Sequence(_) => Err(format!("'{prefix}' is a list, expected a single value")),
        scalar => {
            let scalar = scalar_to_string(scalar)
                .ok_or_else(|| format!("unsupported value for '{prefix}'"))?;
            values.insert(prefix.to_string(), scalar);
            Ok(())
        }
    }
}

/// Process-wide holder of the current configuration snapshot.
///
/// Readers take a snapshot per request and never observe a partially updated configuration;
/// a reload replaces the whole snapshot atomically.
pub struct ConfigStore {
    current: ArcSwap<Configuration>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn load(path: Option<PathBuf>) -> Result<ConfigStore, Error> {
        let config = Configuration::load(path.as_deref())?;
        Ok(ConfigStore {
            current: ArcSwap::from_pointee(config),
            path,
        })
    }

    /// A store serving a fixed configuration, with nothing to reload from
    #[cfg(test)]
    pub fn fixed(config: Configuration) -> ConfigStore {
        ConfigStore {
            current: ArcSwap::from_pointee(config),
            path: None,
        }
    }

    pub fn snapshot(&self) -> Arc<Configuration> {
        self.current.load_full()
    }

    /// Re-read the configuration file and swap it in. On failure the previous snapshot stays.
    pub fn reload(&self) -> Result<Arc<Configuration>, Error> {
        let config = Arc::new(Configuration::load(self.path.as_deref())?);
        self.current.store(config.clone());
        Ok(config)
    }
}
