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

//! Server configuration: a TOML file with environment overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Relay server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for the HTTP surface
    pub listen_addr: String,
    /// Endpoint of the user service's validate_token operation
    pub user_service_url: String,
    /// TTL in seconds for relay-stored events
    pub event_ttl_secs: u64,
    /// Drain window in seconds applied at shutdown
    pub shutdown_drain_secs: u64,
    /// Emit logs as JSON instead of human-readable text
    pub json_logs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:50052".to_string(),
            user_service_url: "http://localhost:50055/api/v1/validate_token".to_string(),
            event_ttl_secs: 86_400,
            shutdown_drain_secs: 10,
            json_logs: false,
        }
    }
}

impl ServerConfig {
    /// Loads the configuration: the TOML file when present, then
    /// environment overrides (`TASKMESH_LISTEN_ADDR`,
    /// `TASKMESH_USER_SERVICE_URL`, `EVENT_TTL_SECS`).
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(addr) = std::env::var("TASKMESH_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(url) = std::env::var("TASKMESH_USER_SERVICE_URL") {
            config.user_service_url = url;
        }
        if let Ok(ttl) = std::env::var("EVENT_TTL_SECS") {
            config.event_ttl_secs = ttl
                .parse()
                .with_context(|| format!("parsing EVENT_TTL_SECS '{ttl}'"))?;
        }
        Ok(config)
    }

    /// Event TTL as a duration.
    pub fn event_ttl(&self) -> Duration {
        Duration::from_secs(self.event_ttl_secs)
    }

    /// Shutdown drain window as a duration.
    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_without_file_or_env() {
        std::env::remove_var("TASKMESH_LISTEN_ADDR");
        std::env::remove_var("TASKMESH_USER_SERVICE_URL");
        std::env::remove_var("EVENT_TTL_SECS");

        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:50052");
        assert_eq!(config.event_ttl(), Duration::from_secs(86_400));
    }

    #[test]
    #[serial]
    fn environment_overrides_file_values() {
        std::env::set_var("TASKMESH_LISTEN_ADDR", "0.0.0.0:9999");
        std::env::set_var("EVENT_TTL_SECS", "120");

        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9999");
        assert_eq!(config.event_ttl(), Duration::from_secs(120));

        std::env::remove_var("TASKMESH_LISTEN_ADDR");
        std::env::remove_var("EVENT_TTL_SECS");
    }

    #[test]
    #[serial]
    fn partial_toml_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "listen_addr = \"127.0.0.1:1234\"\n").unwrap();

        std::env::remove_var("TASKMESH_LISTEN_ADDR");
        std::env::remove_var("EVENT_TTL_SECS");
        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:1234");
        assert_eq!(config.event_ttl_secs, 86_400);
    }
}
