//! Command implementations.
//!
//! `serve` is the composition root: the only place where the upstream
//! adapter, the gateway, and the control-surface subscription are wired
//! together.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use lmgate_core::ServerConfig;
use lmgate_gateway::Gateway;
use lmgate_upstream::{UpstreamConfig, UpstreamProvider};

use crate::parser::{ServeArgs, StatusArgs};

/// Run the gateway until ctrl-c.
pub async fn serve(args: ServeArgs) -> Result<()> {
    let provider = Arc::new(UpstreamProvider::new(UpstreamConfig {
        base_url: args.upstream_url.clone(),
        api_key: args.api_key.clone(),
        ..UpstreamConfig::default()
    })?);

    let gateway = Arc::new(Gateway::new(provider));

    // Log status transitions the way a UI shell would consume them.
    let _subscription = gateway.on_status_change({
        let gateway = Arc::clone(&gateway);
        move || {
            let status = gateway.status();
            debug!(
                running = status.running,
                active = status.active_requests,
                total = status.stats.total_requests,
                "gateway status changed"
            );
        }
    });

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        max_concurrent_requests: args.max_concurrent,
        request_timeout_ms: args.request_timeout_ms,
        ..ServerConfig::default()
    };

    let addr = gateway.start(config).await?;
    info!("gateway listening on http://{addr}/v1 (upstream: {})", args.upstream_url);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    gateway.stop().await?;

    Ok(())
}

/// Query the health endpoint of a running gateway.
pub async fn status(args: StatusArgs) -> Result<()> {
    let url = format!("http://{}:{}/health", args.host, args.port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            let body: serde_json::Value = response.json().await?;
            println!(
                "gateway is running: {} active, {} total requests",
                body["activeRequests"], body["totalRequests"]
            );
        }
        Ok(response) => {
            println!("gateway responded with status {}", response.status());
        }
        Err(_) => {
            println!("no gateway reachable at {url}");
        }
    }

    Ok(())
}
