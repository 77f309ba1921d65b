//! Layered configuration: built-in defaults, then a TOML file, then the
//! environment.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    isbn::{BOOKLAND_PREFIXES, PrefixRule},
    stabilizer::{DEFAULT_COOLDOWN, DEFAULT_THRESHOLD, StabilizerConfig},
};

/// Config file looked for in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "book-scanner.toml";

/// Environment variable selecting the reader
pub const ENV_USER: &str = "BOOK_SCANNER_USER";
/// Environment variable overriding the stability threshold
pub const ENV_THRESHOLD: &str = "BOOK_SCANNER_THRESHOLD";
/// Environment variable overriding the cooldown in milliseconds
pub const ENV_COOLDOWN_MS: &str = "BOOK_SCANNER_COOLDOWN_MS";
/// Environment variable overriding the library directory
pub const ENV_LIBRARY_DIR: &str = "BOOK_SCANNER_LIBRARY_DIR";

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Readers sharing the library, lower case
    pub users: Vec<String>,
    /// Reader used when none is requested
    pub default_user: Option<String>,
    /// Directory holding the library blob
    pub library_dir: PathBuf,
    /// Scan stabilization settings
    pub stabilizer: ScannerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            users: vec!["reader".to_string()],
            default_user: None,
            library_dir: PathBuf::from(".book-scanner"),
            stabilizer: ScannerSettings::default(),
        }
    }
}

/// `[stabilizer]` table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// Identical reads needed for acceptance
    pub threshold: u32,
    /// Minimum gap between acceptances; 0 disables it
    pub cooldown_ms: u64,
    /// Allowed 13-digit prefixes; empty allows every prefix
    pub prefixes: Vec<String>,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            cooldown_ms: u64::try_from(DEFAULT_COOLDOWN.as_millis()).unwrap_or(u64::MAX),
            prefixes: BOOKLAND_PREFIXES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ScannerSettings {
    /// The stabilizer tunables these settings describe
    #[must_use]
    pub fn to_stabilizer_config(&self) -> StabilizerConfig {
        let prefix_rule = if self.prefixes.is_empty() {
            PrefixRule::Any
        } else {
            PrefixRule::Prefixes(self.prefixes.clone())
        };
        StabilizerConfig {
            threshold: self.threshold,
            cooldown: Duration::from_millis(self.cooldown_ms),
            prefix_rule,
        }
    }
}

impl Config {
    /// Pick the active reader.
    ///
    /// A known `requested` reader wins, then a known `default_user`, then the
    /// first configured reader. Names compare lower-cased and trimmed.
    #[must_use]
    pub fn resolve_user(&self, requested: Option<&str>) -> String {
        let known = |name: &str| {
            let name = name.trim().to_lowercase();
            self.users.contains(&name).then_some(name)
        };
        requested
            .and_then(known)
            .or_else(|| self.default_user.as_deref().and_then(known))
            .or_else(|| self.users.first().cloned())
            .unwrap_or_default()
    }

    /// Check the merged settings
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when there are no readers or the
    /// threshold is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users.is_empty() {
            return Err(ConfigError::Invalid("at least one user is required".to_string()));
        }
        if self.stabilizer.threshold == 0 {
            return Err(ConfigError::Invalid("stabilizer.threshold must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Lower-case and trim reader names, dropping blanks and duplicates
    fn normalise_users(&mut self) {
        let mut users: Vec<String> = Vec::with_capacity(self.users.len());
        for user in &self.users {
            let user = user.trim().to_lowercase();
            if !user.is_empty() && !users.contains(&user) {
                users.push(user);
            }
        }
        self.users = users;
    }
}

/// Read a config file
///
/// # Errors
///
/// Returns `ConfigError::Read` or `ConfigError::Parse` when the file cannot be
/// read or is not valid TOML.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    toml::from_str(&contents)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

/// Load defaults, the config file and environment overrides.
///
/// An explicit `path` must exist; without one, [`DEFAULT_CONFIG_FILE`] is used
/// only if present.
///
/// # Errors
///
/// Returns a `ConfigError` if the file is unreadable or the result is invalid.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => load_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() { load_file(default_path)? } else { Config::default() }
        }
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.normalise_users();
    config.validate()?;
    Ok(config)
}

/// Apply `BOOK_SCANNER_*` overrides read through `lookup`; bad values are ignored
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(user) = value(ENV_USER) {
        config.default_user = Some(user);
    }

    if let Some(raw) = value(ENV_THRESHOLD) {
        match raw.parse::<u32>() {
            Ok(threshold) if threshold > 0 => config.stabilizer.threshold = threshold,
            Ok(_) => tracing::warn!("{ENV_THRESHOLD} must be at least 1, ignoring"),
            Err(err) => tracing::warn!("invalid {ENV_THRESHOLD}, ignoring: {err}"),
        }
    }

    if let Some(raw) = value(ENV_COOLDOWN_MS) {
        match raw.parse::<u64>() {
            Ok(cooldown_ms) => config.stabilizer.cooldown_ms = cooldown_ms,
            Err(err) => tracing::warn!("invalid {ENV_COOLDOWN_MS}, ignoring: {err}"),
        }
    }

    if let Some(dir) = value(ENV_LIBRARY_DIR) {
        config.library_dir = PathBuf::from(dir);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_mature_scanner() {
        let config = Config::default().stabilizer.to_stabilizer_config();
        assert_eq!(config, StabilizerConfig::default());
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.toml");
        fs::write(
            &path,
            r#"
users = ["Sohini", "som", "rehan", "som"]
default_user = "som"

[stabilizer]
threshold = 8
prefixes = []
"#,
        )
        .unwrap();

        let config = load(Some(path.as_path())).unwrap();
        assert_eq!(config.users, vec!["sohini", "som", "rehan"]);
        assert_eq!(config.stabilizer.threshold, 8);
        assert_eq!(config.stabilizer.cooldown_ms, 1200);
        assert_eq!(config.stabilizer.to_stabilizer_config().prefix_rule, PrefixRule::Any);
        assert_eq!(config.resolve_user(None), "som");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(dir.path().join("nope.toml").as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn bad_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "users = 3").unwrap();
        assert!(matches!(load_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[
                (ENV_THRESHOLD, "12"),
                (ENV_COOLDOWN_MS, "soon"),
                (ENV_LIBRARY_DIR, "/tmp/books"),
                (ENV_USER, "  "),
            ]),
        );
        assert_eq!(config.stabilizer.threshold, 12);
        assert_eq!(config.stabilizer.cooldown_ms, 1200);
        assert_eq!(config.library_dir, PathBuf::from("/tmp/books"));
        assert_eq!(config.default_user, None);

        apply_env_overrides(&mut config, env(&[(ENV_THRESHOLD, "0")]));
        assert_eq!(config.stabilizer.threshold, 12);
    }

    #[test]
    fn user_resolution_falls_back() {
        let config = Config {
            users: vec!["sohini".to_string(), "som".to_string()],
            default_user: Some("nobody".to_string()),
            ..Config::default()
        };
        assert_eq!(config.resolve_user(Some(" SOM ")), "som");
        assert_eq!(config.resolve_user(Some("mallory")), "sohini");
        assert_eq!(config.resolve_user(None), "sohini");
    }

    #[test]
    fn validation_rejects_empty_users_and_zero_threshold() {
        let mut config = Config { users: Vec::new(), ..Config::default() };
        assert!(config.validate().is_err());
        config.users = vec!["a".to_string()];
        config.stabilizer.threshold = 0;
        assert!(config.validate().is_err());
    }
}
