//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotbotConfig, LogOutput, LoggingConfig, NetworkConfig, RunnerConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BotbotConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_runner_config(&config.runner)?;
    validate_networks_config(&config.networks)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_runner_config(runner: &RunnerConfig) -> ConfigResult<()> {
    if runner.command_prefix.is_empty() {
        return Err(ConfigError::missing_field("runner.command_prefix"));
    }

    if runner.command_prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(
            "Command prefix cannot contain whitespace",
        ));
    }

    if runner.queue_key.is_empty() {
        return Err(ConfigError::missing_field("runner.queue_key"));
    }

    if runner.pop_timeout_ms == 0 {
        return Err(ConfigError::validation("Pop timeout must be greater than 0"));
    }

    if runner.identity_cache_ttl_secs == 0 {
        return Err(ConfigError::validation(
            "Identity cache TTL must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_networks_config(networks: &[NetworkConfig]) -> ConfigResult<()> {
    let mut seen_ids = HashSet::new();

    for network in networks {
        if !seen_ids.insert(network.id) {
            return Err(ConfigError::DuplicateNetworkId(network.id));
        }

        if network.nick.trim().is_empty() {
            return Err(ConfigError::missing_field("networks.nick"));
        }

        let mut seen_channels = HashSet::new();
        for channel in &network.channels {
            if channel.name.trim().is_empty() {
                return Err(ConfigError::missing_field("networks.channels.name"));
            }
            if !seen_channels.insert(channel.name.as_str()) {
                return Err(ConfigError::DuplicateChannel {
                    network: network.id,
                    channel: channel.name.clone(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ChannelConfig;

    fn network(id: i64, channels: &[&str]) -> NetworkConfig {
        NetworkConfig {
            id,
            nick: "botbot".to_string(),
            server: None,
            channels: channels
                .iter()
                .map(|name| ChannelConfig {
                    name: name.to_string(),
                    plugins: Default::default(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&BotbotConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_command_prefix() {
        let mut config = BotbotConfig::default();
        config.runner.command_prefix = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.runner.command_prefix = "! ".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_zero_durations() {
        let mut config = BotbotConfig::default();
        config.runner.pop_timeout_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = BotbotConfig::default();
        config.runner.identity_cache_ttl_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_network_id() {
        let config = BotbotConfig {
            networks: vec![network(1, &[]), network(1, &[])],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::DuplicateNetworkId(1))
        ));
    }

    #[test]
    fn test_validate_duplicate_channel() {
        let config = BotbotConfig {
            networks: vec![network(1, &["#a", "#b", "#a"]), network(2, &["#a"])],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::DuplicateChannel { network: 1, .. })
        ));
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = BotbotConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());
    }
}
