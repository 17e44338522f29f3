use anyhow::{bail, Context, Result};
use cluster_client::{ClusterClient, WatchEvent, WatchEventType, WatchOptions};
use cluster_config::ConfigResolver;
use futures::StreamExt;
use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::init as tracing_init;

const USAGE: &str = "usage: resource-watch <apiVersion> <kind> [namespace]";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (api_version, kind) = match (args.first(), args.get(1)) {
        (Some(api_version), Some(kind)) => (api_version.as_str(), kind.as_str()),
        _ => bail!(USAGE),
    };

    info!("Starting resource-watch for {} {}...", api_version, kind);

    let config = ConfigResolver::from_process_env()
        .load_default()
        .await
        .context("failed to resolve cluster configuration")?;

    // Explicit argument, then the context namespace, then all namespaces
    let namespace = args.get(2).cloned().or_else(|| config.namespace.clone());
    info!(
        "Connecting to {} (namespace: {})",
        config.cluster.server,
        namespace.as_deref().unwrap_or("<all>")
    );

    let client = ClusterClient::new(config)?;
    let mut events =
        client.watch_resource::<Value>(api_version, kind, namespace.as_deref(), &WatchOptions::default());

    let mut count = 0usize;
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                count += 1;
                log_event(&event);
            }
            Err(e) => {
                error!("Watch ended with error: {}", e);
                return Err(e.into());
            }
        }
    }

    info!("Watch closed by server after {} event(s)", count);
    Ok(())
}

fn log_event(event: &WatchEvent<Value>) {
    let metadata = &event.object["metadata"];
    let name = metadata["name"].as_str().unwrap_or("unknown");
    let namespace = metadata["namespace"].as_str().unwrap_or("-");

    match event.event_type {
        WatchEventType::Error => warn!("ERROR event: {}", event.object),
        WatchEventType::Bookmark => info!(
            "BOOKMARK at resourceVersion {}",
            metadata["resourceVersion"].as_str().unwrap_or("?")
        ),
        other => info!("{:?} {}/{}", other, namespace, name),
    }
}
