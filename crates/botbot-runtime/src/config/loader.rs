//! Layered loading of [`BotbotConfig`].
//!
//! Sources, later ones winning:
//!
//! | source                                   | example                               |
//! |------------------------------------------|---------------------------------------|
//! | built-in defaults                        | `runner.queue_key = "q"`              |
//! | [`ConfigLoader::merge`]                  | a config assembled in code            |
//! | `botbot.<profile>.toml`                  | `botbot.production.toml`              |
//! | `botbot.toml` or `config.toml`           | the channel and plugin tables         |
//! | `BOTBOT_*` environment, `__` for nesting | `BOTBOT_RUNNER__EXECUTION=task`       |
//! | [`ConfigLoader::set`]                    | `run_plugins --with-tasks`            |
//!
//! YAML files (`botbot.yaml`, `botbot.yml`, ...) are searched too when the
//! `yaml-config` feature is on; TOML needs `toml-config`, the default.
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .with_current_dir()
//!     .set("runner.command_prefix", ".")
//!     .load_validated()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::BotbotConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "BOTBOT_";

/// Selects the `botbot.<profile>.*` overlay file. Read from `BOTBOT_PROFILE`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name, accepting `prod`/`dev` shorthands.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `BOTBOT_PROFILE`, defaulting to Development.
    pub fn from_env() -> Self {
        std::env::var("BOTBOT_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builds a [`BotbotConfig`] from defaults, files, environment and
/// overrides.
pub struct ConfigLoader {
    /// Merged beneath files and environment.
    figment: Figment,
    /// Merged above every other source.
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Replaces the search when set.
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Overrides the profile taken from `BOTBOT_PROFILE`.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a directory to look for `botbot.toml` in. The first directory
    /// holding a file wins.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the current directory to the search paths.
    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    /// Adds `<user config dir>/botbot` to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join("botbot")),
            None => self,
        }
    }

    /// Loads exactly this file; a missing file is an error rather than a
    /// fallback to defaults.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Reads `BOTBOT_*` variables (on by default).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a full configuration over the built-in defaults, beneath
    /// files and environment.
    pub fn merge(mut self, config: BotbotConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Merges a single `key.path = value` override on top of every other
    /// source.
    pub fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Extracts the merged configuration without validating it.
    pub fn load(self) -> ConfigResult<BotbotConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: BotbotConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Invalid runner configuration: {e}"))
        })?;

        debug!(
            profile = %profile,
            logging_level = %config.logging.level,
            networks = config.networks.len(),
            "Runner configuration loaded"
        );

        Ok(config)
    }

    /// Loads the configuration and validates it.
    pub fn load_validated(self) -> ConfigResult<BotbotConfig> {
        let config = self.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(BotbotConfig::default()));
        figment = figment.merge(std::mem::take(&mut self.figment));

        if let Some(path) = self.config_file.take() {
            if path.exists() {
                info!(path = %path.display(), "Reading runner config");
                figment = Self::merge_config_file(figment, &path)?;
            } else {
                return Err(ConfigError::FileNotFound(path));
            }
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    /// Merges a single config file, dispatching on its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "Cannot read .{ext} config files with the enabled features"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }

        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("botbot"));
        }
        paths
    }

    /// Tries `search_paths × base_names`; a profile-specific variant is
    /// merged before its base file. Stops at the first base file found.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let Some((stem, ext)) = base_name.rsplit_once('.') else {
                    continue;
                };

                let profile_path =
                    search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                if profile_path.exists() {
                    debug!(path = %profile_path.display(), profile = %self.profile, "Merging profile overlay");
                    figment = merge_fn(figment, &profile_path);
                }

                let base_path = search_path.join(base_name);
                if base_path.exists() {
                    info!(path = %base_path.display(), "Reading runner config");
                    figment = merge_fn(figment, &base_path);
                    return (figment, true);
                }
            }
        }
        (figment, false)
    }

    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["botbot.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["botbot.yaml", "botbot.yml", "config.yaml", "config.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!(paths = ?search_paths, "No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads and validates the configuration from the default locations.
pub fn load_config() -> ConfigResult<BotbotConfig> {
    ConfigLoader::new().load_validated()
}

/// Loads and validates the configuration from `path`, with environment
/// overrides.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<BotbotConfig> {
    ConfigLoader::new().file(path).load_validated()
}

#[cfg(test)]
mod tests {
    use super::*;
    use botbot_framework::ExecutionMode;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();

            assert_eq!(config.logging.level.as_str(), "info");
            assert_eq!(config.runner.command_prefix, "!");
            assert!(config.networks.is_empty());
            Ok(())
        });
    }

    #[test]
    #[cfg(feature = "toml-config")]
    fn test_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "botbot.toml",
                r##"
                [runner]
                command_prefix = "."
                execution = "task"

                [[networks]]
                id = 1
                nick = "botbot"

                [[networks.channels]]
                name = "#rust"
                plugins = { motivate = {}, vote = { username_separator = ";" } }
                "##,
            )?;
            jail.set_env("BOTBOT_RUNNER__POP_TIMEOUT_MS", "250");
            jail.set_env("BOTBOT_LOGGING__LEVEL", "debug");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load_validated()
                .unwrap();

            assert_eq!(config.runner.command_prefix, ".");
            assert_eq!(config.runner.execution, ExecutionMode::Task);
            assert_eq!(config.runner.pop_timeout_ms, 250);
            assert_eq!(config.logging.level.as_str(), "debug");

            let channel = &config.networks[0].channels[0];
            assert_eq!(channel.name, "#rust");
            assert_eq!(channel.plugins["vote"]["username_separator"], ";");
            Ok(())
        });
    }

    #[test]
    #[cfg(feature = "toml-config")]
    fn test_profile_file_is_merged() {
        Jail::expect_with(|jail| {
            jail.create_file("botbot.production.toml", "[runner]\nqueue_key = \"prod-q\"")?;
            jail.create_file("botbot.toml", "[runner]\ncommand_prefix = \"@\"")?;

            let config = ConfigLoader::new()
                .profile("prod")
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();

            assert_eq!(config.runner.queue_key, "prod-q");
            assert_eq!(config.runner.command_prefix, "@");
            Ok(())
        });
    }

    #[test]
    fn test_programmatic_override_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("BOTBOT_RUNNER__COMMAND_PREFIX", ".");
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .set("runner.command_prefix", "?")
                .load()
                .unwrap();
            assert_eq!(config.runner.command_prefix, "?");
            Ok(())
        });
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("botbot.ini", "command_prefix = !")?;
            let err = ConfigLoader::new()
                .file(jail.directory().join("botbot.ini"))
                .without_env()
                .load()
                .unwrap_err();
            assert!(
                matches!(&err, ConfigError::ParseError(msg) if msg.contains(".ini")),
                "{err}"
            );
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = ConfigLoader::new()
            .file("/nonexistent/botbot.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_profile_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("BOTBOT_PROFILE", "production");
            assert_eq!(Profile::from_env(), Profile::Production);
            jail.set_env("BOTBOT_PROFILE", "staging");
            assert_eq!(Profile::from_env(), Profile::Custom("staging".into()));
            Ok(())
        });
    }
}
