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

//! Relay server binary: loads configuration, initializes tracing and the
//! Prometheus exporter, and serves the relay HTTP surface until ctrl-c.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskmesh::auth::{Authenticator, HttpTokenValidator};
use taskmesh::relay::EventRelay;

use taskmesh_server::api::{router, AppState};
use taskmesh_server::config::ServerConfig;

#[derive(Debug, Parser)]
#[command(name = "taskmesh-server", about = "Event relay server for the taskmesh federation")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen address override
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    init_tracing(config.json_logs);
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    let relay = Arc::new(EventRelay::new(config.event_ttl()));
    let validator = Arc::new(HttpTokenValidator::new(
        config.user_service_url.clone(),
        Duration::from_secs(5),
    ));
    let authenticator = Arc::new(Authenticator::new(
        validator,
        HashSet::from(["/healthz".to_string(), "/metrics".to_string()]),
    ));

    let app = router(AppState {
        relay: relay.clone(),
        authenticator,
        metrics: Some(metrics),
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(listen_addr = %config.listen_addr, ttl_secs = config.event_ttl_secs, "relay server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    info!("draining relay");
    relay.shutdown().await;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
