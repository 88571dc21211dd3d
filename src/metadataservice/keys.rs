use crate::config::{Configuration, PUBLIC_KEYS_PREFIX};
use crate::errors::Error;

pub const DEFAULT_KEY_NAME: &str = "default";
pub const OPENSSH_KEY: &str = "openssh-key";

/// Names of all configured public keys, sorted, followed by a single empty terminator.
/// Computed afresh from the configuration on every call.
pub fn list_key_names(config: &Configuration) -> Vec<String> {
    let mut names: Vec<String> = known_key_names(config).map(str::to_string).collect();
    names.push(String::new());
    names
}

fn known_key_names(config: &Configuration) -> impl Iterator<Item = &str> {
    config
        .keys()
        .filter_map(|key| key.strip_prefix(PUBLIC_KEYS_PREFIX))
        .filter(|name| !name.is_empty())
}

fn is_known_key(name: &str, config: &Configuration) -> bool {
    known_key_names(config).any(|known| known == name)
}

/// `openssh-key` if a key with the given name is configured, empty otherwise
pub fn resolve_key_directory(name: &str, config: &Configuration) -> String {
    if is_known_key(name, config) {
        String::from(OPENSSH_KEY)
    } else {
        String::new()
    }
}

/// The public key configured under the given name, falling back to the default key
pub fn resolve_key_material(name: &str, config: &Configuration) -> Result<String, Error> {
    let name = if is_known_key(name, config) {
        name
    } else {
        DEFAULT_KEY_NAME
    };
    config
        .require(&format!("{PUBLIC_KEYS_PREFIX}{name}"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Configuration {
        [
            ("hostname-prefix", "vm"),
            ("public-keys.default", "ssh-rsa AAA"),
            ("public-keys.admin", "ssh-ed25519 BBB"),
            ("public-keys-extra", "not a key"),
            ("password", "pw"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn names_are_sorted_and_terminated() {
        assert_eq!(list_key_names(&config()), vec!["admin", "default", ""]);
    }

    #[test]
    fn names_without_keys_is_only_terminator() {
        let config: Configuration = [("password", "pw")].into_iter().collect();
        assert_eq!(list_key_names(&config), vec![""]);
    }

    #[test]
    fn listing_is_recomputed_per_call() {
        let config = config();
        assert_eq!(list_key_names(&config), list_key_names(&config));
        resolve_key_directory("admin", &config);
        assert_eq!(list_key_names(&config).len(), 3);
    }

    #[test]
    fn directory_for_known_and_unknown_keys() {
        let config = config();
        assert_eq!(resolve_key_directory("admin", &config), "openssh-key");
        assert_eq!(resolve_key_directory("default", &config), "openssh-key");
        assert_eq!(resolve_key_directory("nobody", &config), "");
        // The terminator is not a key
        assert_eq!(resolve_key_directory("", &config), "");
    }

    #[test]
    fn material_for_known_key() {
        assert_eq!(
            resolve_key_material("admin", &config()).unwrap(),
            "ssh-ed25519 BBB"
        );
    }

    #[test]
    fn unknown_key_falls_back_to_default() {
        let config = config();
        let fallback = resolve_key_material("nobody", &config).unwrap();
        assert_eq!(fallback, "ssh-rsa AAA");
        assert_eq!(fallback, resolve_key_material(DEFAULT_KEY_NAME, &config).unwrap());
    }

    #[test]
    fn missing_default_key_is_an_error() {
        let config: Configuration = [("public-keys.admin", "ssh-ed25519 BBB")]
            .into_iter()
            .collect();
        assert!(matches!(
            resolve_key_material("nobody", &config),
            Err(Error::ConfigKeyMissing(key)) if key == "public-keys.default"
        ));
        assert_eq!(resolve_key_material("admin", &config).unwrap(), "ssh-ed25519 BBB");
    }
}
