/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Environment Configuration
//!
//! Recognized environment variables with their defaults:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `INVENTORY_SERVICE_ADDR` | `localhost:50053` |
//! | `TASK_SERVICE_ADDR` | `localhost:50054` |
//! | `SERVICE_MAX_RETRIES` | `3` |
//! | `EVENT_TTL_SECS` | `86400` (24h; cleanup cadence is TTL/4) |
//!
//! The binary loads `.env` files through `dotenvy` before reading these.

use std::time::Duration;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was present but unparsable
    #[error("invalid value for {variable}: {value}")]
    InvalidValue {
        /// The offending variable
        variable: &'static str,
        /// The raw value
        value: String,
    },
}

/// Core service configuration read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshConfig {
    /// Address of the inventory service
    pub inventory_service_addr: String,
    /// Address of the task service
    pub task_service_addr: String,
    /// Retry attempt budget for collaborator calls
    pub max_retries: u32,
    /// TTL for relay-stored events
    pub event_ttl: Duration,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            inventory_service_addr: "localhost:50053".to_string(),
            task_service_addr: "localhost:50054".to_string(),
            max_retries: 3,
            event_ttl: Duration::from_secs(86_400),
        }
    }
}

impl MeshConfig {
    /// Reads the configuration from the process environment, falling back
    /// to the defaults above.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            inventory_service_addr: std::env::var("INVENTORY_SERVICE_ADDR")
                .unwrap_or(defaults.inventory_service_addr),
            task_service_addr: std::env::var("TASK_SERVICE_ADDR")
                .unwrap_or(defaults.task_service_addr),
            max_retries: parse_var("SERVICE_MAX_RETRIES", defaults.max_retries)?,
            event_ttl: Duration::from_secs(parse_var(
                "EVENT_TTL_SECS",
                defaults.event_ttl.as_secs(),
            )?),
        })
    }

    /// Relay sweeper cadence: TTL/4.
    pub fn cleanup_interval(&self) -> Duration {
        self.event_ttl / 4
    }
}

fn parse_var<T: std::str::FromStr>(
    variable: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(variable) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                variable,
                value: raw,
            }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for var in [
            "INVENTORY_SERVICE_ADDR",
            "TASK_SERVICE_ADDR",
            "SERVICE_MAX_RETRIES",
            "EVENT_TTL_SECS",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults_apply_without_environment() {
        clear_env();
        let config = MeshConfig::from_env().unwrap();
        assert_eq!(config.inventory_service_addr, "localhost:50053");
        assert_eq!(config.task_service_addr, "localhost:50054");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.event_ttl, Duration::from_secs(86_400));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(21_600));
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        clear_env();
        std::env::set_var("INVENTORY_SERVICE_ADDR", "inv:9000");
        std::env::set_var("SERVICE_MAX_RETRIES", "5");
        std::env::set_var("EVENT_TTL_SECS", "3600");

        let config = MeshConfig::from_env().unwrap();
        assert_eq!(config.inventory_service_addr, "inv:9000");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.event_ttl, Duration::from_secs(3600));
        clear_env();
    }

    #[test]
    #[serial]
    fn unparsable_values_are_rejected() {
        clear_env();
        std::env::set_var("SERVICE_MAX_RETRIES", "many");
        assert!(matches!(
            MeshConfig::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));
        clear_env();
    }
}
